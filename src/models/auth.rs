//! 认证状态模型
//!
//! 与浏览器 storage state 文件格式保持兼容：
//! `{"cookies": [...], "origins": [{"origin", "localStorage": [{"name", "value"}]}]}`

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::Display;

/// 认证状态的存储键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthKey {
    pub project_id: String,
    pub state_name: String,
}

impl AuthKey {
    pub fn new(project_id: impl Into<String>, state_name: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            state_name: state_name.into(),
        }
    }
}

/// 键的每一段都会落成存储路径的一段：不能为空，不能含路径分隔符，不能是 `.` 或 `..`
pub fn check_key_segment(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() || value.contains(['/', '\\']) || value == ".." || value == "." {
        return Err(format!("非法的 {}: '{}'", field, value));
    }
    Ok(())
}

impl Display for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.project_id, self.state_name)
    }
}

/// 单个存储项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

/// 某个 origin 下的 Web Storage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginStorage {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<StorageEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub session_storage: Vec<StorageEntry>,
}

/// 浏览器会话快照
///
/// 对存储层不透明，cookie 保持驱动给出的原始 JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    #[serde(default)]
    pub cookies: Vec<JsonValue>,
    #[serde(default)]
    pub origins: Vec<OriginStorage>,
}

impl AuthState {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.iter().all(|o| o.local_storage.is_empty())
    }

    pub fn origin(&self, origin: &str) -> Option<&OriginStorage> {
        self.origins.iter().find(|o| o.origin == origin)
    }
}
