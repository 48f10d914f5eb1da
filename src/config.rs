//! 负责加载代理的配置。
//!
//! 配置文件为 TOML，默认位于 `<配置目录>/qqmusic-edge/config.toml`，所有字段都有默认值。
//! 环境变量 `INITIAL_CREDENTIAL` 会覆盖文件中的种子凭据。

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::dispatch::DEFAULT_ENDPOINT;

pub const APP_DIR_NAME: &str = "qqmusic-edge";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const SEED_ENV_VAR: &str = "INITIAL_CREDENTIAL";

/// 配置加载或校验错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("无法读取配置文件 {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("配置文件格式错误: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("无效的监听地址: {0}")]
    InvalidBind(String),
    #[error("无效的上游地址: {0}")]
    InvalidEndpoint(String),
    #[error("超时时间必须大于 0")]
    InvalidTimeout,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct EdgeConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub storage: StorageConfig,
    pub credential: CredentialConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub bind: String,
    /// 是否允许通过 `/api/credential` 导出当前凭据
    pub expose_credential: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8787".to_string(),
            expose_credential: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpstreamConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: base.join(APP_DIR_NAME).join("credentials.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CredentialConfig {
    /// 首次启动时写入存储的凭据 JSON
    pub seed: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` 过滤规则，`RUST_LOG` 优先
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// 默认配置文件路径。
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

impl EdgeConfig {
    /// 从 TOML 文本解析配置。
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// 读取指定的配置文件，文件必须存在。
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), "已读取配置文件");
        Ok(config)
    }

    /// 读取默认位置的配置文件，不存在时使用默认配置。
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => {
                debug!("未找到配置文件，使用默认配置");
                Ok(Self::default())
            }
        }
    }

    /// 实际会读取的配置文件：显式给出的路径，或存在时的默认路径。
    #[must_use]
    pub fn source_path(path: Option<&Path>) -> Option<PathBuf> {
        path.map(Path::to_path_buf)
            .or_else(|| default_config_path().filter(|p| p.exists()))
    }

    /// 按给定路径或默认位置加载配置，并应用环境变量覆盖。
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::load_default()?,
        };
        config.apply_seed_override(std::env::var(SEED_ENV_VAR).ok());
        config.validate()?;
        Ok(config)
    }

    /// 非空的环境变量值覆盖配置中的种子凭据。
    pub fn apply_seed_override(&mut self, value: Option<String>) {
        if let Some(seed) = value.filter(|v| !v.trim().is_empty()) {
            self.credential.seed = Some(seed);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        self.endpoint()?;
        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|_| ConfigError::InvalidBind(self.server.bind.clone()))
    }

    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.upstream.endpoint)
            .map_err(|e| ConfigError::InvalidEndpoint(format!("{}: {e}", self.upstream.endpoint)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint(self.upstream.endpoint.clone()));
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EdgeConfig::default();

        assert_eq!(config.server.bind, "0.0.0.0:8787");
        assert!(!config.server.expose_credential);
        assert_eq!(config.upstream.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.upstream.timeout_secs, 10);
        assert!(config.storage.database_path.ends_with("qqmusic-edge/credentials.db"));
        assert_eq!(config.credential.seed, None);
        assert_eq!(config.log.filter, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = EdgeConfig::from_toml(
            r#"
            [server]
            expose_credential = true

            [credential]
            seed = '{"musicid": "1", "musickey": "k"}'
            "#,
        )
        .unwrap();

        assert!(config.server.expose_credential);
        assert_eq!(config.server.bind, "0.0.0.0:8787");
        assert_eq!(config.upstream.timeout_secs, 10);
        assert_eq!(
            config.credential.seed.as_deref(),
            Some(r#"{"musicid": "1", "musickey": "k"}"#)
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nbind = \"127.0.0.1:9000\"\n\n[upstream]\ntimeout_secs = 3"
        )
        .unwrap();

        let config = EdgeConfig::load(file.path()).unwrap();
        assert_eq!(config.bind_addr().unwrap().port(), 9000);
        assert_eq!(config.upstream.timeout_secs, 3);
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EdgeConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_file_is_error() {
        assert!(matches!(
            EdgeConfig::from_toml("[server\nbind = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_source_path_prefers_explicit_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(
            EdgeConfig::source_path(Some(file.path())),
            Some(file.path().to_path_buf())
        );
    }

    #[test]
    fn test_seed_override() {
        let mut config = EdgeConfig::default();
        config.credential.seed = Some("from-file".into());

        config.apply_seed_override(Some("  ".into()));
        assert_eq!(config.credential.seed.as_deref(), Some("from-file"));

        config.apply_seed_override(Some("from-env".into()));
        assert_eq!(config.credential.seed.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_validation() {
        let mut config = EdgeConfig::default();
        config.server.bind = "not-an-addr".into();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBind(_))));

        let mut config = EdgeConfig::default();
        config.upstream.endpoint = "ftp://example.com".into();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidEndpoint(_))));

        let mut config = EdgeConfig::default();
        config.upstream.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout)));
    }
}
