//! 认证状态存储 - 业务能力层
//!
//! 以 (project_id, state_name) 为键保存浏览器会话快照。
//! 同一个键的并发写入以最后一次为准。

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::models::{check_key_segment, AuthKey, AuthState};

/// 认证状态存储
#[async_trait]
pub trait AuthStateStore: Send + Sync {
    /// 不存在时返回 None
    async fn get(&self, key: &AuthKey) -> EngineResult<Option<AuthState>>;

    async fn put(&self, key: &AuthKey, state: &AuthState) -> EngineResult<()>;
}

/// 文件存储：`<root>/<project_id>/<state_name>.json`
#[derive(Debug, Clone)]
pub struct FileAuthStore {
    root: PathBuf,
}

impl FileAuthStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 键在加载场景时已校验，这里只兜底，失败按普通步骤错误处理
    fn path_for(&self, key: &AuthKey) -> EngineResult<PathBuf> {
        check_key_segment("project_id", &key.project_id).map_err(EngineError::auth_store)?;
        check_key_segment("state_name", &key.state_name).map_err(EngineError::auth_store)?;
        Ok(self
            .root
            .join(&key.project_id)
            .join(format!("{}.json", key.state_name)))
    }
}

#[async_trait]
impl AuthStateStore for FileAuthStore {
    async fn get(&self, key: &AuthKey) -> EngineResult<Option<AuthState>> {
        let path = self.path_for(key)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EngineError::auth_store(format!("{}: {}", path.display(), e))),
        };
        let state = serde_json::from_str(&content)
            .map_err(|e| EngineError::auth_store(format!("{}: {}", path.display(), e)))?;
        Ok(Some(state))
    }

    async fn put(&self, key: &AuthKey, state: &AuthState) -> EngineResult<()> {
        let path = self.path_for(key)?;
        let dir = self.root.join(&key.project_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| EngineError::auth_store(format!("{}: {}", dir.display(), e)))?;

        // 先写临时文件再 rename，读者不会看到写了一半的文件
        let tmp = dir.join(format!(".{}.{}.tmp", key.state_name, uuid::Uuid::new_v4().simple()));
        let body = serde_json::to_vec_pretty(state)?;
        fs::write(&tmp, body)
            .await
            .map_err(|e| EngineError::auth_store(format!("{}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| EngineError::auth_store(format!("{}: {}", path.display(), e)))?;

        debug!("认证状态已写入: {}", path.display());
        Ok(())
    }
}

/// 内存存储，用于测试和一次性运行
#[derive(Debug, Default)]
pub struct MemoryAuthStore {
    states: RwLock<HashMap<AuthKey, AuthState>>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl AuthStateStore for MemoryAuthStore {
    async fn get(&self, key: &AuthKey) -> EngineResult<Option<AuthState>> {
        Ok(self.states.read().await.get(key).cloned())
    }

    async fn put(&self, key: &AuthKey, state: &AuthState) -> EngineResult<()> {
        self.states.write().await.insert(key.clone(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OriginStorage, StorageEntry};
    use serde_json::json;

    fn sample_state() -> AuthState {
        AuthState {
            cookies: vec![json!({"name": "sid", "value": "abc", "domain": "app.test", "path": "/"})],
            origins: vec![OriginStorage {
                origin: "https://app.test".to_string(),
                local_storage: vec![StorageEntry {
                    name: "token".to_string(),
                    value: "t-1".to_string(),
                }],
                session_storage: Vec::new(),
            }],
        }
    }

    #[tokio::test]
    async fn test_file_store_round_trip_and_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAuthStore::new(dir.path());
        let key = AuthKey::new("shop", "admin");

        assert!(store.get(&key).await.unwrap().is_none());

        store.put(&key, &sample_state()).await.unwrap();
        assert!(dir.path().join("shop").join("admin.json").exists());
        assert_eq!(store.get(&key).await.unwrap(), Some(sample_state()));

        // 文件格式与 storage state 兼容
        let raw: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("shop/admin.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(raw["origins"][0]["localStorage"][0]["name"], "token");
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAuthStore::new(dir.path());
        let key = AuthKey::new("shop", "user");

        store.put(&key, &AuthState::default()).await.unwrap();
        store.put(&key, &sample_state()).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(sample_state()));

        // 不留下临时文件
        let leftovers = std::fs::read_dir(dir.path().join("shop")).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_rejects_path_like_keys() {
        let store = FileAuthStore::new("unused");
        let err = store.get(&AuthKey::new("shop", "../etc")).await.unwrap_err();
        assert!(matches!(err, EngineError::AuthStore(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryAuthStore::new();
        let key = AuthKey::new("p", "s");
        assert!(store.get(&key).await.unwrap().is_none());
        store.put(&key, &sample_state()).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&key).await.unwrap(), Some(sample_state()));
    }
}
