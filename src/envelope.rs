//! 请求信封的构造。
//!
//! 信封是一个有序 JSON 对象：`comm` 在最前，随后每个调用以 `"module.method"` 为键。
//! 键的顺序会进入被签名的字节，因此这里全程使用保序的 `serde_json::Map`。

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value, json};

use crate::credential::Credential;

const CLIENT_VERSION: u64 = 13_020_508;
const QIMEI36: &str = "8888888888888888";
const DEFAULT_UID: &str = "3931641530";

/// 信封中的公共参数 `comm`。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct CommonParams(Map<String, Value>);

impl CommonParams {
    /// 默认的公共参数，凭据有效时附带鉴权字段。
    #[must_use]
    pub fn for_credential(credential: Option<&Credential>) -> Self {
        let mut params = Map::new();
        params.insert("cv".into(), json!(CLIENT_VERSION));
        params.insert("v".into(), json!(CLIENT_VERSION));
        params.insert("QIMEI36".into(), json!(QIMEI36));
        params.insert("ct".into(), json!("11"));
        params.insert("tmeAppID".into(), json!("qqmusic"));
        params.insert("format".into(), json!("json"));
        params.insert("inCharset".into(), json!("utf-8"));
        params.insert("outCharset".into(), json!("utf-8"));
        params.insert("uid".into(), json!(DEFAULT_UID));

        let mut params = Self(params);
        params.attach_auth(credential);
        params
    }

    /// 获取播放链接时使用的公共参数。
    #[must_use]
    pub fn streaming(credential: Option<&Credential>) -> Self {
        let mut params = Map::new();
        params.insert("ct".into(), json!("19"));
        params.insert("cv".into(), json!(CLIENT_VERSION));
        params.insert("v".into(), json!(CLIENT_VERSION));
        params.insert("format".into(), json!("json"));

        let mut params = Self(params);
        params.attach_auth(credential);
        params
    }

    fn attach_auth(&mut self, credential: Option<&Credential>) {
        let Some(cred) = credential.filter(|c| c.is_valid()) else {
            return;
        };
        self.0.insert("qq".into(), json!(cred.musicid));
        self.0.insert("authst".into(), json!(cred.musickey));
        self.0
            .insert("tmeLoginType".into(), json!(cred.login_type.to_string()));
    }

    /// 是否携带了鉴权字段。
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.0.contains_key("authst")
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// 一次远程调用。
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleCall {
    pub module: String,
    pub method: String,
    pub param: Value,
}

impl ModuleCall {
    pub fn new(module: impl Into<String>, method: impl Into<String>, param: Value) -> Self {
        Self {
            module: module.into(),
            method: method.into(),
            param,
        }
    }

    /// 该调用在信封和响应中的键。
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}.{}", self.module, self.method)
    }
}

impl Serialize for ModuleCall {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("module", &self.module)?;
        map.serialize_entry("method", &self.method)?;
        map.serialize_entry("param", &self.param)?;
        map.end()
    }
}

/// 完整的请求信封。
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    comm: CommonParams,
    calls: Vec<(String, ModuleCall)>,
}

impl Envelope {
    #[must_use]
    pub const fn new(comm: CommonParams) -> Self {
        Self {
            comm,
            calls: Vec::new(),
        }
    }

    /// 按调用顺序构造信封。
    #[must_use]
    pub fn build(credential: Option<&Credential>, calls: Vec<ModuleCall>) -> Self {
        let mut envelope = Self::new(CommonParams::for_credential(credential));
        for call in calls {
            envelope.push(call);
        }
        envelope
    }

    /// 追加一个调用。键重复时替换原有调用，位置保持不变。
    pub fn push(&mut self, call: ModuleCall) {
        let key = call.key();
        if let Some(slot) = self.calls.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = call;
        } else {
            self.calls.push((key, call));
        }
    }

    #[must_use]
    pub fn with_call(mut self, call: ModuleCall) -> Self {
        self.push(call);
        self
    }

    #[must_use]
    pub const fn comm(&self) -> &CommonParams {
        &self.comm
    }

    /// 调用键，按信封中的顺序。
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.calls.iter().map(|(k, _)| k.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.calls.len() + 1))?;
        map.serialize_entry("comm", &self.comm)?;
        for (key, call) in &self.calls {
            map.serialize_entry(key, call)?;
        }
        map.end()
    }
}

/// 请求上游时附带的 Cookie，凭据无效时为空字符串。
#[must_use]
pub fn cookie_header(credential: Option<&Credential>) -> String {
    match credential.filter(|c| c.is_valid()) {
        Some(cred) => [
            format!("uin={}", cred.musicid),
            format!("qqmusic_key={}", cred.musickey),
            format!("qm_keyst={}", cred.musickey),
            format!("tmeLoginType={}", cred.login_type),
        ]
        .join("; "),
        None => String::new(),
    }
}
