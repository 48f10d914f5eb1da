//! 签名并发送请求信封，校验并拆解上游响应。

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, trace, warn};
use url::Url;

use crate::credential::Credential;
use crate::envelope::{Envelope, ModuleCall, cookie_header};
use crate::error::{EdgeError, Result};
use crate::http::HttpClient;
use crate::sign::sign;

pub const DEFAULT_ENDPOINT: &str = "https://u.y.qq.com/cgi-bin/musicu.fcg";

const REFERER: &str = "https://y.qq.com/";
const ORIGIN: &str = "https://y.qq.com";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// 一次分发的结果。
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamResult {
    /// 单个调用，已拆解为该调用的数据。
    Single(Value),
    /// 多个调用，原样返回整个响应。
    Batch(Value),
}

impl UpstreamResult {
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Single(value) | Self::Batch(value) => value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    http_client: Arc<dyn HttpClient>,
    endpoint: Url,
}

impl Dispatcher {
    #[must_use]
    pub fn new(http_client: Arc<dyn HttpClient>, endpoint: Url) -> Self {
        Self {
            http_client,
            endpoint,
        }
    }

    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// 序列化、签名并发送信封，返回解析后的完整响应。
    ///
    /// 信封只序列化一次，签名与请求体使用同一份字节。
    #[instrument(skip_all, fields(calls = envelope.len()))]
    pub async fn send(&self, envelope: &Envelope, credential: Option<&Credential>) -> Result<Value> {
        let body = serde_json::to_vec(envelope)?;
        let token = sign(&body);

        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("sign", &token);

        let cookie = cookie_header(credential);
        let mut headers: Vec<(&str, &str)> = vec![
            ("Content-Type", "application/json"),
            ("Referer", REFERER),
            ("Origin", ORIGIN),
            ("User-Agent", USER_AGENT),
        ];
        if !cookie.is_empty() {
            headers.push(("Cookie", cookie.as_str()));
        }

        debug!(sign = %token, authenticated = !cookie.is_empty(), "发送请求");

        let response = self
            .http_client
            .post_bytes(url.as_str(), &headers, &body)
            .await?;

        if response.status >= 400 {
            warn!(status = response.status, "上游返回了非成功的 HTTP 状态码");
        }

        trace!(response.body = %String::from_utf8_lossy(&response.body), "收到原始 JSON 响应");

        response.json()
    }

    /// 发送信封。只有一个调用时拆解该调用的结果，否则原样返回整个响应。
    pub async fn dispatch(
        &self,
        envelope: &Envelope,
        credential: Option<&Credential>,
    ) -> Result<UpstreamResult> {
        let response = self.send(envelope, credential).await?;

        let mut keys = envelope.keys();
        match (keys.next(), keys.next()) {
            (Some(key), None) => unwrap_call(response, key).map(UpstreamResult::Single),
            _ => Ok(UpstreamResult::Batch(response)),
        }
    }

    /// 发送单个调用，返回其数据。
    pub async fn call(
        &self,
        call: ModuleCall,
        credential: Option<&Credential>,
    ) -> Result<Value> {
        let key = call.key();
        let envelope = Envelope::build(credential, vec![call]);
        let response = self.send(&envelope, credential).await?;
        unwrap_call(response, &key)
    }

    /// 在一个信封中发送多个调用，原样返回整个响应，不检查各调用的业务码。
    pub async fn batch_call(
        &self,
        calls: Vec<ModuleCall>,
        credential: Option<&Credential>,
    ) -> Result<Value> {
        let envelope = Envelope::build(credential, calls);
        self.send(&envelope, credential).await
    }
}

/// 从响应中取出 `key` 对应的调用结果并校验业务码。
///
/// 业务码为 0 时返回 `data`，没有 `data` 时返回整个调用结果。
pub fn unwrap_call(mut response: Value, key: &str) -> Result<Value> {
    let Some(mut entry) = response.get_mut(key).map(Value::take) else {
        return Err(EdgeError::Protocol(format!("响应中未找到键: '{key}'")));
    };

    let code = entry.get("code").and_then(Value::as_i64).unwrap_or(-1);
    if code != 0 {
        warn!(request_key = %key, code, "上游返回业务错误");
        return Err(EdgeError::Upstream {
            key: key.to_string(),
            code,
        });
    }

    match entry.get_mut("data").map(Value::take) {
        Some(data) if !data.is_null() => Ok(data),
        _ => Ok(entry),
    }
}
