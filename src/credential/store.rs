//! 凭据的持久化存储。
//!
//! 表中只允许存在 `id = 1` 的一行，所有写入都是针对这一行的原子操作。

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;
use tracing::{debug, info, instrument};

use super::{Credential, DEFAULT_KEY_EXPIRES_IN, DEFAULT_LOGIN_TYPE, parse_credential};

/// 凭据存储可能发生的错误。
#[derive(Debug, Error)]
pub enum StorageError {
    /// `SQLite` 错误。
    #[error("SQLite 错误: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// 数据库路径无效或无法创建所在目录。
    #[error("无效的数据库路径: {0}")]
    InvalidPath(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

const CREATE_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS credentials (
        id INTEGER PRIMARY KEY DEFAULT 1,
        openid TEXT,
        refresh_token TEXT,
        access_token TEXT,
        expired_at INTEGER,
        musicid TEXT,
        musickey TEXT,
        unionid TEXT,
        str_musicid TEXT,
        refresh_key TEXT,
        encrypt_uin TEXT,
        login_type INTEGER DEFAULT 2,
        musickey_createtime INTEGER,
        key_expires_in INTEGER DEFAULT 259200,
        updated_at INTEGER,
        CHECK (id = 1)
    )";

const SELECT_SQL: &str = "
    SELECT openid, refresh_token, access_token, expired_at, musicid, musickey, unionid,
           str_musicid, refresh_key, encrypt_uin, login_type, musickey_createtime, key_expires_in
    FROM credentials WHERE id = 1";

const INSERT_SQL: &str = "
    INSERT INTO credentials (
        id, openid, refresh_token, access_token, expired_at,
        musicid, musickey, unionid, str_musicid, refresh_key,
        encrypt_uin, login_type, musickey_createtime, key_expires_in, updated_at
    ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)";

const UPSERT_CLAUSE: &str = "
    ON CONFLICT(id) DO UPDATE SET
        openid = excluded.openid,
        refresh_token = excluded.refresh_token,
        access_token = excluded.access_token,
        expired_at = excluded.expired_at,
        musicid = excluded.musicid,
        musickey = excluded.musickey,
        unionid = excluded.unionid,
        str_musicid = excluded.str_musicid,
        refresh_key = excluded.refresh_key,
        encrypt_uin = excluded.encrypt_uin,
        login_type = excluded.login_type,
        musickey_createtime = excluded.musickey_createtime,
        key_expires_in = excluded.key_expires_in,
        updated_at = excluded.updated_at";

/// 凭据存储的统一接口。
pub trait CredentialStore: Send + Sync {
    /// 确保凭据表存在，可重复调用。
    fn ensure_schema(&self) -> StorageResult<()>;

    /// 读取已保存的凭据，不存在时返回 `None`。
    fn load(&self) -> StorageResult<Option<Credential>>;

    /// 整体替换已保存的凭据，不存在时插入。
    fn save(&self, credential: &Credential) -> StorageResult<()>;

    /// 仅在尚无凭据时写入，返回是否真正写入了。
    fn insert_if_absent(&self, credential: &Credential) -> StorageResult<bool>;

    /// 获取凭据，存储为空时用种子初始化。
    ///
    /// 返回最终存储中的凭据。并发初始化时只有第一个写入生效，其余调用拿到的是已存储的值。
    /// 存储为空且种子缺失或无法解析时返回 `None`。
    fn bootstrap(&self, seed: Option<&str>) -> StorageResult<Option<Credential>> {
        if let Some(existing) = self.load()? {
            return Ok(Some(existing));
        }

        let Some(seeded) = seed.and_then(parse_credential) else {
            debug!("存储中没有凭据，且未提供可用的 INITIAL_CREDENTIAL");
            return Ok(None);
        };

        if self.insert_if_absent(&seeded)? {
            info!(musicid = %seeded.musicid, "已使用种子凭据初始化存储");
        } else {
            debug!("凭据已被其他请求写入，跳过种子");
        }

        self.load()
    }
}

/// 基于 `SQLite` 的凭据存储。
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCredentialStore").finish_non_exhaustive()
    }
}

impl SqliteCredentialStore {
    /// 打开或创建位于 `path` 的数据库，并确保表结构存在。
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::InvalidPath(format!("无法创建目录 {}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// 打开一个内存数据库，主要用于测试。
    pub fn open_in_memory() -> StorageResult<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// 最近一次写入的时间（Unix 秒）。
    pub fn updated_at(&self) -> StorageResult<Option<i64>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT updated_at FROM credentials WHERE id = 1", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .optional()?;
        Ok(value.flatten())
    }

    #[cfg(test)]
    fn row_count(&self) -> StorageResult<i64> {
        let conn = self.conn.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM credentials", [], |row| row.get(0))?)
    }

    fn write(&self, credential: &Credential, tail: &str) -> StorageResult<usize> {
        let now = chrono::Utc::now().timestamp();
        let sql = format!("{INSERT_SQL} {tail}");
        let conn = self.conn.lock();
        let changed = conn.execute(
            &sql,
            params![
                credential.openid,
                credential.refresh_token,
                credential.access_token,
                credential.expired_at,
                credential.musicid,
                credential.musickey,
                credential.unionid,
                credential.str_musicid,
                credential.refresh_key,
                credential.encrypt_uin,
                credential.login_type,
                credential.musickey_createtime,
                credential.key_expires_in,
                now,
            ],
        )?;
        Ok(changed)
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn ensure_schema(&self) -> StorageResult<()> {
        self.conn.lock().execute(CREATE_TABLE_SQL, [])?;
        Ok(())
    }

    fn load(&self) -> StorageResult<Option<Credential>> {
        let conn = self.conn.lock();
        Ok(conn.query_row(SELECT_SQL, [], credential_from_row).optional()?)
    }

    fn save(&self, credential: &Credential) -> StorageResult<()> {
        self.write(credential, UPSERT_CLAUSE)?;
        debug!(musicid = %credential.musicid, "凭据已保存");
        Ok(())
    }

    fn insert_if_absent(&self, credential: &Credential) -> StorageResult<bool> {
        Ok(self.write(credential, "ON CONFLICT(id) DO NOTHING")? > 0)
    }
}

/// 列值为 NULL、空或 0 时回落到默认值。
fn credential_from_row(row: &Row<'_>) -> rusqlite::Result<Credential> {
    let text = |idx: usize| -> rusqlite::Result<String> {
        Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
    };
    let int = |idx: usize, default: i64| -> rusqlite::Result<i64> {
        Ok(row
            .get::<_, Option<i64>>(idx)?
            .filter(|n| *n != 0)
            .unwrap_or(default))
    };

    Ok(Credential {
        openid: text(0)?,
        refresh_token: text(1)?,
        access_token: text(2)?,
        expired_at: int(3, 0)?,
        musicid: text(4)?,
        musickey: text(5)?,
        unionid: text(6)?,
        str_musicid: text(7)?,
        refresh_key: text(8)?,
        encrypt_uin: text(9)?,
        login_type: int(10, DEFAULT_LOGIN_TYPE)?,
        musickey_createtime: int(11, 0)?,
        key_expires_in: int(12, DEFAULT_KEY_EXPIRES_IN)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    const SEED: &str = r#"{"musicid":"123","musickey":"ABC","expired_at":"99"}"#;

    fn sample(musicid: &str, musickey: &str) -> Credential {
        Credential {
            musicid: musicid.to_string(),
            musickey: musickey.to_string(),
            openid: "openid".to_string(),
            expired_at: 1_800_000_000,
            ..Credential::default()
        }
    }

    #[test]
    fn test_empty_store_loads_none() {
        let store = SqliteCredentialStore::open_in_memory().expect("无法创建内存数据库");
        assert_eq!(store.load().unwrap(), None);
        assert_eq!(store.updated_at().unwrap(), None);
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let store = SqliteCredentialStore::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        store.ensure_schema().unwrap();
        assert_eq!(store.row_count().unwrap(), 0);
    }

    #[test]
    fn test_second_save_replaces_first() {
        let store = SqliteCredentialStore::open_in_memory().unwrap();

        store.save(&sample("1", "first")).unwrap();
        let second = sample("2", "second");
        store.save(&second).unwrap();

        assert_eq!(store.load().unwrap(), Some(second));
        assert_eq!(store.row_count().unwrap(), 1);
        assert!(store.updated_at().unwrap().is_some());
    }

    #[test]
    fn test_insert_if_absent_keeps_existing_row() {
        let store = SqliteCredentialStore::open_in_memory().unwrap();

        assert!(store.insert_if_absent(&sample("1", "a")).unwrap());
        assert!(!store.insert_if_absent(&sample("2", "b")).unwrap());
        assert_eq!(store.load().unwrap().unwrap().musicid, "1");
    }

    #[test]
    fn test_bootstrap_from_seed() {
        let store = SqliteCredentialStore::open_in_memory().unwrap();

        let cred = store.bootstrap(Some(SEED)).unwrap().expect("应当写入种子");
        assert_eq!(cred.musicid, "123");
        assert_eq!(cred.musickey, "ABC");
        assert_eq!(cred.expired_at, 99);
        assert_eq!(cred.login_type, 2);
        assert_eq!(store.load().unwrap(), Some(cred));
    }

    #[test]
    fn test_bootstrap_twice_persists_once() {
        let store = SqliteCredentialStore::open_in_memory().unwrap();

        let first = store.bootstrap(Some(SEED)).unwrap();
        let second = store
            .bootstrap(Some(r#"{"musicid":"999","musickey":"other"}"#))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.row_count().unwrap(), 1);
    }

    #[test]
    fn test_bootstrap_without_seed() {
        let store = SqliteCredentialStore::open_in_memory().unwrap();
        assert_eq!(store.bootstrap(None).unwrap(), None);
        assert_eq!(store.bootstrap(Some("not json")).unwrap(), None);
        assert_eq!(store.row_count().unwrap(), 0);
    }

    #[test]
    fn test_bootstrap_keeps_saved_credential() {
        let store = SqliteCredentialStore::open_in_memory().unwrap();
        let saved = sample("7", "saved");
        store.save(&saved).unwrap();

        assert_eq!(store.bootstrap(Some(SEED)).unwrap(), Some(saved));
    }

    #[test]
    fn test_concurrent_bootstrap_on_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.db");
        SqliteCredentialStore::open(&path).unwrap();

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = path.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let store = SqliteCredentialStore::open(&path).unwrap();
                    let seed = format!(r#"{{"musicid":"{i}","musickey":"key{i}"}}"#);
                    barrier.wait();
                    store.bootstrap(Some(&seed)).unwrap().unwrap()
                })
            })
            .collect();

        let results: Vec<Credential> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let store = SqliteCredentialStore::open(&path).unwrap();
        let stored = store.load().unwrap().unwrap();

        assert_eq!(store.row_count().unwrap(), 1);
        assert!(results.iter().all(|c| *c == stored));
    }
}
