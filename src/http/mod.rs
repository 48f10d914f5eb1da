//! HTTP客户端抽象层，分发器只依赖这里的接口，便于在测试中替换。

use std::fmt::Debug;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::{EdgeError, Result};

pub mod reqwest_client;

#[cfg(test)]
pub mod mock;

pub use self::reqwest_client::ReqwestClient;

/// 统一的HTTP响应数据结构
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP状态码
    pub status: u16,
    /// 响应体
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// 将响应体解析为JSON对象
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| EdgeError::Protocol(format!("响应不是有效的 JSON: {e}")))
    }
}

/// 统一的HTTP客户端接口
#[async_trait]
pub trait HttpClient: Send + Sync + Debug {
    /// 发送带自定义headers的POST请求，请求体为已序列化的字节
    async fn post_bytes(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse>;
}
