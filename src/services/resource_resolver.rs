//! 资源解析 - 业务能力层
//!
//! `resource:<id>` 形式的文件路径通过项目资源清单解析为本地文件。

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;

use crate::error::{EngineError, EngineResult};

/// 资源引用前缀
pub const RESOURCE_PREFIX: &str = "resource:";

/// 取出 `resource:<id>` 中的 id
pub fn parse_resource_ref(file_path: &str) -> Option<&str> {
    file_path
        .strip_prefix(RESOURCE_PREFIX)
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

#[async_trait]
pub trait ResourceResolver: Send + Sync {
    /// 解析为已存在的本地文件
    async fn resolve(&self, project_id: &str, resource_id: &str) -> EngineResult<PathBuf>;
}

#[derive(Debug, Deserialize)]
struct ResourceEntry {
    id: String,
    filename: String,
}

/// 基于 `<root>/<project_id>/metadata.json` 清单的解析器
#[derive(Debug, Clone)]
pub struct FileResourceResolver {
    root: PathBuf,
}

impl FileResourceResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ResourceResolver for FileResourceResolver {
    async fn resolve(&self, project_id: &str, resource_id: &str) -> EngineResult<PathBuf> {
        let reference = format!("{}{}", RESOURCE_PREFIX, resource_id);
        let project_dir = self.root.join(project_id);
        let metadata_path = project_dir.join("metadata.json");

        let content = fs::read_to_string(&metadata_path)
            .await
            .map_err(|e| EngineError::resource(&reference, format!("{}: {}", metadata_path.display(), e)))?;
        let entries: Vec<ResourceEntry> = serde_json::from_str(&content)
            .map_err(|e| EngineError::resource(&reference, format!("{}: {}", metadata_path.display(), e)))?;

        let entry = entries
            .into_iter()
            .find(|e| e.id == resource_id)
            .ok_or_else(|| EngineError::resource(&reference, "清单中没有该资源"))?;

        let path = project_dir.join(&entry.filename);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(EngineError::resource(&reference, format!("文件不存在: {}", path.display())));
        }
        Ok(path)
    }
}

/// 固定映射的解析器
#[derive(Debug, Clone, Default)]
pub struct StaticResourceResolver {
    entries: HashMap<String, PathBuf>,
}

impl StaticResourceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resource_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.entries.insert(resource_id.into(), path.into());
        self
    }
}

#[async_trait]
impl ResourceResolver for StaticResourceResolver {
    async fn resolve(&self, _project_id: &str, resource_id: &str) -> EngineResult<PathBuf> {
        self.entries.get(resource_id).cloned().ok_or_else(|| {
            EngineError::resource(format!("{}{}", RESOURCE_PREFIX, resource_id), "未登记的资源")
        })
    }
}
