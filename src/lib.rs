pub mod config;
pub mod credential;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod http;
pub mod logging;
pub mod qrc;
pub mod server;
pub mod service;
pub mod sign;

pub use config::EdgeConfig;
pub use credential::{Credential, CredentialStore, SqliteCredentialStore, parse_credential};
pub use dispatch::{Dispatcher, UpstreamResult};
pub use envelope::{CommonParams, Envelope, ModuleCall, cookie_header};
pub use error::{EdgeError, Result};
pub use qrc::{LyricDecryptor, QrcCodec};
pub use service::EdgeCore;
pub use sign::{sign, sign_envelope};
