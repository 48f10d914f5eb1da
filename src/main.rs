//! qqmusic-edge
//!
//! QQ 音乐接口的边缘代理。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use qqmusic_edge::config::EdgeConfig;
use qqmusic_edge::credential::SqliteCredentialStore;
use qqmusic_edge::dispatch::Dispatcher;
use qqmusic_edge::http::reqwest_client::ReqwestClient;
use qqmusic_edge::logging::init_tracing;
use qqmusic_edge::qrc::QrcCodec;
use qqmusic_edge::server::{self, AppState};
use qqmusic_edge::service::EdgeCore;
use qqmusic_edge::sign::sign;

/// QQ 音乐接口的边缘代理。
#[derive(Parser, Debug)]
#[command(name = "qqmusic-edge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// 配置文件路径
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// 覆盖监听地址
    #[arg(long, global = true, value_name = "ADDR")]
    pub bind: Option<String>,

    /// 覆盖凭据数据库路径
    #[arg(long, global = true, value_name = "FILE")]
    pub database: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 启动 HTTP 服务（默认）
    Serve,

    /// 计算一段 JSON 请求体的签名
    Sign {
        /// 请求体 JSON，会先压缩为紧凑格式
        json: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.clone().unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(cli).await,
        Commands::Sign { json } => {
            let value: serde_json::Value =
                serde_json::from_str(&json).context("请求体不是有效的 JSON")?;
            let compact = serde_json::to_vec(&value)?;
            println!("{}", sign(&compact));
            Ok(())
        }
    }
}

async fn run_server(cli: Cli) -> anyhow::Result<()> {
    let mut config = EdgeConfig::resolve(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(database) = cli.database {
        config.storage.database_path = database;
    }
    config.validate()?;

    let filter = if cli.verbose { "debug" } else { config.log.filter.as_str() };
    init_tracing(filter);

    match EdgeConfig::source_path(cli.config.as_deref()) {
        Some(path) => tracing::info!(path = %path.display(), "已加载配置文件"),
        None => tracing::info!("未找到配置文件，使用默认配置"),
    }

    let addr = config.bind_addr()?;
    let endpoint = config.endpoint()?;

    let store = SqliteCredentialStore::open(&config.storage.database_path).with_context(|| {
        format!(
            "无法打开凭据数据库 {}",
            config.storage.database_path.display()
        )
    })?;
    let http_client = ReqwestClient::new(Duration::from_secs(config.upstream.timeout_secs))?;
    let dispatcher = Dispatcher::new(Arc::new(http_client), endpoint);
    let core = EdgeCore::new(Arc::new(store), config.credential.seed.clone(), dispatcher);

    let state = AppState {
        core,
        decryptor: Arc::new(QrcCodec),
        expose_credential: config.server.expose_credential,
    };

    tracing::info!(
        database = %config.storage.database_path.display(),
        expose_credential = config.server.expose_credential,
        "代理启动"
    );
    server::serve(addr, state).await?;
    Ok(())
}
