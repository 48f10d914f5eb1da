//! 日志初始化。

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// 初始化全局 `tracing` 订阅者。
///
/// 设置了 `RUST_LOG` 时以其为准，否则使用 `default_filter`。重复调用不会报错。
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("全局日志订阅者已存在，跳过初始化");
    }
}

/// 测试中使用的日志初始化，输出交给测试框架捕获。
#[cfg(test)]
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("qqmusic_edge=debug"));
    let _ = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
