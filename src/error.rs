use thiserror::Error;

use crate::credential::store::StorageError;

/// 代理核心在处理一次请求时可能发生的各种错误。
#[derive(Error, Debug)]
pub enum EdgeError {
    /// 凭据存储读写失败，请求无法继续。
    #[error("凭据存储错误: {0}")]
    Storage(#[from] StorageError),
    /// 上游响应不是预期的结构，例如缺少请求键或不是 JSON。
    #[error("上游响应格式异常: {0}")]
    Protocol(String),
    /// 上游对某个调用返回了非零业务码。
    #[error("上游业务错误 ({key}): code = {code}")]
    Upstream {
        /// 出错调用的 `module.method` 键
        key: String,
        /// 上游返回的业务码
        code: i64,
    },
    /// 网络请求失败。
    #[error("网络请求失败: {0}")]
    Http(String),
    /// 请求信封序列化失败。
    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),
    /// 调用方传入了无效参数。
    #[error("无效的请求参数: {0}")]
    InvalidInput(String),
    /// 歌词密文无法解密。
    #[error("歌词解密失败: {0}")]
    Decryption(String),
    /// 内部逻辑错误或未明确分类的错误。
    #[error("错误: {0}")]
    Internal(String),
}

impl EdgeError {
    /// 稳定的错误类别名，用于对外的错误响应体。
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage_error",
            Self::Protocol(_) => "protocol_error",
            Self::Upstream { .. } => "upstream_error",
            Self::Http(_) => "http_error",
            Self::Json(_) => "serialization_error",
            Self::InvalidInput(_) => "invalid_input",
            Self::Decryption(_) => "decryption_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// 若为上游业务错误，返回其业务码。
    #[must_use]
    pub const fn upstream_code(&self) -> Option<i64> {
        match self {
            Self::Upstream { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EdgeError>;
