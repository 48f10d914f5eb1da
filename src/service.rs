//! 对路由层暴露的核心接口：取得凭据，构造信封并分发。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::{info, instrument};

use crate::credential::{Credential, CredentialStore};
use crate::dispatch::{Dispatcher, UpstreamResult};
use crate::envelope::{Envelope, ModuleCall};
use crate::error::{EdgeError, Result};

/// 代理核心，持有凭据存储与分发器，可在多个请求间共享。
#[derive(Clone)]
pub struct EdgeCore {
    store: Arc<dyn CredentialStore>,
    seed: Option<String>,
    dispatcher: Dispatcher,
    anonymous: Arc<AtomicBool>,
}

impl std::fmt::Debug for EdgeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeCore")
            .field("has_seed", &self.seed.is_some())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl EdgeCore {
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        seed: Option<String>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            store,
            seed: seed.filter(|s| !s.trim().is_empty()),
            dispatcher,
            anonymous: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 读取凭据，存储为空时使用种子初始化。
    ///
    /// 没有凭据时返回 `None`，此后的请求按匿名方式发送。
    #[instrument(skip(self))]
    pub async fn credential(&self) -> Result<Option<Credential>> {
        let store = Arc::clone(&self.store);
        let seed = self.seed.clone();
        let credential = tokio::task::spawn_blocking(move || store.bootstrap(seed.as_deref()))
            .await
            .map_err(|e| EdgeError::Internal(format!("存储任务失败: {e}")))??;

        self.note_anonymous(credential.as_ref().is_none_or(|c| !c.is_valid()));
        Ok(credential)
    }

    /// 记录匿名状态，只在进入匿名状态时输出一次日志。返回本次是否输出了日志。
    fn note_anonymous(&self, anonymous: bool) -> bool {
        let was_anonymous = self.anonymous.swap(anonymous, Ordering::Relaxed);
        match (was_anonymous, anonymous) {
            (false, true) => {
                info!("没有可用凭据，将以匿名方式请求上游");
                true
            }
            (true, false) => {
                info!("已取得有效凭据");
                false
            }
            _ => false,
        }
    }

    /// 发送单个调用，返回其数据。
    pub async fn call(
        &self,
        module: &str,
        method: &str,
        param: Value,
        credential: Option<&Credential>,
    ) -> Result<Value> {
        self.dispatcher
            .call(ModuleCall::new(module, method, param), credential)
            .await
    }

    /// 在一个信封中发送多个调用，返回原始响应。
    pub async fn batch_call(
        &self,
        calls: Vec<ModuleCall>,
        credential: Option<&Credential>,
    ) -> Result<Value> {
        self.dispatcher.batch_call(calls, credential).await
    }

    /// 发送调用方自行构造的信封，用于需要特殊公共参数的场景。
    pub async fn dispatch(
        &self,
        envelope: &Envelope,
        credential: Option<&Credential>,
    ) -> Result<UpstreamResult> {
        self.dispatcher.dispatch(envelope, credential).await
    }

    /// 计算信封的签名。
    pub fn sign(envelope: &Envelope) -> Result<String> {
        crate::sign::sign_envelope(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::SqliteCredentialStore;
    use crate::credential::mock::UnavailableStore;
    use crate::dispatch::DEFAULT_ENDPOINT;
    use crate::http::mock::MockHttpClient;
    use serde_json::json;
    use url::Url;

    fn core(seed: Option<&str>, responses: &[Value]) -> (EdgeCore, Arc<MockHttpClient>) {
        let store = Arc::new(SqliteCredentialStore::open_in_memory().unwrap());
        let mock = Arc::new(MockHttpClient::with_responses(
            responses.iter().map(Value::to_string),
        ));
        let dispatcher = Dispatcher::new(mock.clone(), Url::parse(DEFAULT_ENDPOINT).unwrap());
        (
            EdgeCore::new(store, seed.map(str::to_string), dispatcher),
            mock,
        )
    }

    #[tokio::test]
    async fn test_credential_bootstraps_from_seed() {
        let (core, _) = core(Some(r#"{"musicid":"123","musickey":"ABC"}"#), &[]);

        let first = core.credential().await.unwrap().unwrap();
        let second = core.credential().await.unwrap().unwrap();
        assert_eq!(first.musicid, "123");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_blank_seed_is_ignored() {
        let (core, _) = core(Some("   "), &[]);
        assert_eq!(core.credential().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_call_uses_credential() {
        let (core, mock) = core(
            Some(r#"{"musicid":"123","musickey":"ABC"}"#),
            &[json!({"m.x": {"code": 0, "data": {"v": 1}}})],
        );

        let cred = core.credential().await.unwrap();
        let data = core
            .call("m", "x", json!({}), cred.as_ref())
            .await
            .unwrap();

        assert_eq!(data, json!({"v": 1}));
        let body: Value = serde_json::from_slice(&mock.requests()[0].body).unwrap();
        assert_eq!(body["comm"]["qq"], "123");
    }

    #[test]
    fn test_sign_matches_sent_signature() {
        let envelope = Envelope::build(None, vec![ModuleCall::new("a", "b", json!({}))]);

        let body = serde_json::to_vec(&envelope).unwrap();
        assert_eq!(EdgeCore::sign(&envelope).unwrap(), crate::sign::sign(&body));
    }

    #[tokio::test]
    async fn test_storage_failure_is_fatal() {
        let mock = Arc::new(MockHttpClient::default());
        let dispatcher = Dispatcher::new(mock.clone(), Url::parse(DEFAULT_ENDPOINT).unwrap());
        let core = EdgeCore::new(
            Arc::new(UnavailableStore),
            Some(r#"{"musicid":"123","musickey":"ABC"}"#.to_string()),
            dispatcher,
        );

        let err = core.credential().await.unwrap_err();
        assert!(matches!(err, EdgeError::Storage(_)));
        assert_eq!(err.reason(), "storage_error");
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_anonymous_state_logged_once() {
        let (core, _) = core(None, &[]);

        assert!(core.note_anonymous(true));
        assert!(!core.note_anonymous(true));
        assert!(!core.note_anonymous(false));
        assert!(core.note_anonymous(true));
        assert!(!core.clone().note_anonymous(true));
    }
}
