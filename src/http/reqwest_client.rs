//! `reqwest` 客户端的默认实现。

use std::time::Duration;

use async_trait::async_trait;

use crate::{
    error::{EdgeError, Result},
    http::{HttpClient, HttpResponse},
};

/// 包装了 `reqwest::Client` 的 `HttpClient` 实现。
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// 创建一个新的 `ReqwestClient` 实例。
    ///
    /// # 参数
    /// * `timeout` - 单次请求的总超时时间。
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EdgeError::Http(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn post_bytes(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse> {
        let mut request_builder = self.client.post(url);

        for (key, value) in headers {
            request_builder = request_builder.header(*key, *value);
        }

        request_builder = request_builder.body(body.to_vec());

        let response = request_builder
            .send()
            .await
            .map_err(|e| EdgeError::Http(e.to_string()))?;

        convert_response(response).await
    }
}

/// 将 `reqwest::Response` 转换为自定义的 `HttpResponse`。
async fn convert_response(response: reqwest::Response) -> Result<HttpResponse> {
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|e| EdgeError::Http(e.to_string()))?
        .to_vec();

    Ok(HttpResponse { status, body })
}
