//! 测试用的凭据存储：每次读写都失败，模拟数据库不可用。

use super::Credential;
use super::store::{CredentialStore, StorageError, StorageResult};

#[derive(Debug, Default)]
pub struct UnavailableStore;

impl UnavailableStore {
    fn unavailable<T>() -> StorageResult<T> {
        Err(StorageError::InvalidPath("数据库不可用".to_string()))
    }
}

impl CredentialStore for UnavailableStore {
    fn ensure_schema(&self) -> StorageResult<()> {
        Self::unavailable()
    }

    fn load(&self) -> StorageResult<Option<Credential>> {
        Self::unavailable()
    }

    fn save(&self, _credential: &Credential) -> StorageResult<()> {
        Self::unavailable()
    }

    fn insert_if_absent(&self, _credential: &Credential) -> StorageResult<bool> {
        Self::unavailable()
    }
}
