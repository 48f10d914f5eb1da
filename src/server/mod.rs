//! 对外的 HTTP 服务。

pub mod error;
mod params;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::handler::Handler;
use axum::http::{Method, StatusCode, header};
use axum::response::Response;
use axum::routing::{MethodRouter, get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use self::error::error_response;
use crate::qrc::LyricDecryptor;
use crate::service::EdgeCore;

/// 各处理函数共享的状态。
#[derive(Clone)]
pub struct AppState {
    pub core: EdgeCore,
    pub decryptor: Arc<dyn LyricDecryptor>,
    pub expose_credential: bool,
}

/// 允许任意来源的 GET/POST/OPTIONS 请求。
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// 只接受 GET 的接口；OPTIONS 直接应答，其余方法返回 405。
fn endpoint<H, T>(handler: H) -> MethodRouter<AppState>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    get(handler).options(preflight).fallback(method_not_allowed)
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/credential", endpoint(routes::credential))
        .route("/api/search", endpoint(routes::search))
        .route("/api/song/detail", endpoint(routes::song_detail))
        .route("/api/song/url", endpoint(routes::song_url))
        .route("/api/album", endpoint(routes::album))
        .route("/api/singer", endpoint(routes::singer))
        .route("/api/playlist", endpoint(routes::playlist))
        .route("/api/top", endpoint(routes::top))
        .route("/api/lyric", endpoint(routes::lyric))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

/// 监听 `addr` 并处理请求，直到收到 Ctrl-C。
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "开始监听");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "无法监听退出信号");
        std::future::pending::<()>().await;
    }
    info!("收到退出信号，正在关闭");
}
