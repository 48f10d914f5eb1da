//! 错误到 HTTP 响应的转换。

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};

use crate::error::EdgeError;

impl EdgeError {
    /// 错误对应的 HTTP 状态码。
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Protocol(_) | Self::Upstream { .. } | Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) | Self::Json(_) | Self::Decryption(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for EdgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, reason = self.reason(), "请求处理失败");
        } else {
            warn!(error = %self, reason = self.reason(), "请求参数无效");
        }

        let mut body = json!({
            "error": self.to_string(),
            "code": status.as_u16(),
            "reason": self.reason(),
        });
        if let Some(code) = self.upstream_code() {
            body["upstream_code"] = json!(code);
        }

        (status, Json(body)).into_response()
    }
}

/// 构造与 [`EdgeError`] 相同格式的简单错误响应。
pub fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({"error": message, "code": status.as_u16()})),
    )
        .into_response()
}
