//! 登录凭据的数据模型与解析。

pub mod store;

#[cfg(test)]
pub mod mock;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{error, warn};

pub use store::{CredentialStore, SqliteCredentialStore, StorageError, StorageResult};

pub const DEFAULT_LOGIN_TYPE: i64 = 2;
pub const DEFAULT_KEY_EXPIRES_IN: i64 = 259_200;

/// 持久化的 QQ 音乐登录凭据。
///
/// 全局只存在一份，只会被整体替换，不会被删除。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub openid: String,
    pub refresh_token: String,
    pub access_token: String,
    /// 过期时间（Unix 秒）
    pub expired_at: i64,
    /// 数字形式的账号 ID，以字符串保存
    pub musicid: String,
    pub musickey: String,
    pub unionid: String,
    pub str_musicid: String,
    pub refresh_key: String,
    pub encrypt_uin: String,
    pub login_type: i64,
    pub musickey_createtime: i64,
    pub key_expires_in: i64,
}

impl Default for Credential {
    fn default() -> Self {
        Self {
            openid: String::new(),
            refresh_token: String::new(),
            access_token: String::new(),
            expired_at: 0,
            musicid: String::new(),
            musickey: String::new(),
            unionid: String::new(),
            str_musicid: String::new(),
            refresh_key: String::new(),
            encrypt_uin: String::new(),
            login_type: DEFAULT_LOGIN_TYPE,
            musickey_createtime: 0,
            key_expires_in: DEFAULT_KEY_EXPIRES_IN,
        }
    }
}

impl Credential {
    /// `musicid` 与 `musickey` 都非空时才能用于带鉴权的请求，否则按匿名请求处理。
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.musicid.is_empty() && !self.musickey.is_empty()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtraFields {
    musickey_create_time: i64,
    key_expires_in: i64,
}

/// 导出格式，与 [`parse_credential`] 接受的格式一致。
#[derive(Serialize)]
struct ExportedCredential<'a> {
    openid: &'a str,
    refresh_token: &'a str,
    access_token: &'a str,
    expired_at: i64,
    musicid: &'a str,
    musickey: &'a str,
    unionid: &'a str,
    str_musicid: &'a str,
    refresh_key: &'a str,
    encrypt_uin: &'a str,
    login_type: i64,
    extra_fields: ExtraFields,
}

impl Serialize for Credential {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ExportedCredential {
            openid: &self.openid,
            refresh_token: &self.refresh_token,
            access_token: &self.access_token,
            expired_at: self.expired_at,
            musicid: &self.musicid,
            musickey: &self.musickey,
            unionid: &self.unionid,
            str_musicid: &self.str_musicid,
            refresh_key: &self.refresh_key,
            encrypt_uin: &self.encrypt_uin,
            login_type: self.login_type,
            extra_fields: ExtraFields {
                musickey_create_time: self.musickey_createtime,
                key_expires_in: self.key_expires_in,
            },
        }
        .serialize(serializer)
    }
}

/// 将任意来源的凭据 JSON 规范化为 [`Credential`]。
///
/// 输入为空、不是合法 JSON 或顶层不是对象时返回 `None`。字段缺失或格式不对时回落到默认值，
/// 此函数不会 panic，也不会返回错误。
///
/// # 参数
/// * `raw` - 凭据 JSON 文本，通常来自 `INITIAL_CREDENTIAL` 或导出的凭据。
#[must_use]
pub fn parse_credential(raw: &str) -> Option<Credential> {
    if raw.is_empty() {
        return None;
    }

    let data: Map<String, Value> = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            error!(kind = json_kind(&other), "解析凭据失败: 顶层不是 JSON 对象");
            return None;
        }
        Err(e) => {
            error!(error = %e, "解析凭据失败");
            return None;
        }
    };

    let extra_fields = match data.get("extra_fields") {
        Some(Value::String(s)) => match serde_json::from_str::<Value>(&s.replace('\'', "\"")) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => {
                warn!(error = %e, "解析 extra_fields 失败");
                Map::new()
            }
        },
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };

    let text = |key: &str| loose_string(data.get(key));

    Some(Credential {
        openid: text("openid"),
        refresh_token: text("refresh_token"),
        access_token: text("access_token"),
        expired_at: int_or(data.get("expired_at"), 0),
        musicid: text("musicid"),
        musickey: text("musickey"),
        unionid: text("unionid"),
        str_musicid: text("str_musicid"),
        refresh_key: text("refresh_key"),
        encrypt_uin: text("encrypt_uin"),
        login_type: int_or(data.get("login_type"), DEFAULT_LOGIN_TYPE),
        musickey_createtime: int_or(extra_fields.get("musickeyCreateTime"), 0),
        key_expires_in: int_or(extra_fields.get("keyExpiresIn"), DEFAULT_KEY_EXPIRES_IN),
    })
}

/// 取整数值，解析失败或结果为 0 时使用默认值。
fn int_or(value: Option<&Value>, default: i64) -> i64 {
    value
        .and_then(parse_int_prefix)
        .filter(|n| *n != 0)
        .unwrap_or(default)
}

/// 宽松的整数解析：数字向零取整，字符串取开头的十进制整数部分。
pub(crate) fn parse_int_prefix(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < 9.2e18)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => parse_int_str(s),
        _ => None,
    }
}

pub(crate) fn parse_int_str(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude = digits[..end]
        .bytes()
        .try_fold(0i64, |acc, b| {
            acc.checked_mul(10)?.checked_add(i64::from(b - b'0'))
        })?;
    Some(if negative { -magnitude } else { magnitude })
}

/// 文本字段：字符串原样保留，数字转为十进制文本，其余视为空。
fn loose_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) if n.as_f64() != Some(0.0) => n.to_string(),
        Some(Value::Bool(true)) => "true".to_string(),
        _ => String::new(),
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
