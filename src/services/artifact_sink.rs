//! 产物写入服务 - 业务能力层
//!
//! 只负责"把截图和运行结果存起来"，不关心流程

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::EngineResult;
use crate::models::RunResult;

/// 产物存储
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// 保存截图，返回可写入 StepOutcome 的引用
    async fn store_screenshot(&self, name: &str, png: &[u8]) -> EngineResult<String>;

    /// 保存运行结果，返回其位置
    async fn store_result(&self, result: &RunResult) -> EngineResult<Option<String>>;

    /// 本次运行产物所在位置
    fn location(&self) -> Option<String> {
        None
    }
}

/// 写入 `<root>/<时间戳>_<run_id>/` 目录
#[derive(Debug, Clone)]
pub struct DirArtifactSink {
    dir: PathBuf,
}

impl DirArtifactSink {
    /// 为一次运行创建产物目录
    pub async fn create(root: &Path, run_id: &str) -> EngineResult<Self> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let dir = root.join(format!("{}_{}", stamp, run_id));
        fs::create_dir_all(&dir).await?;
        debug!("产物目录: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactSink for DirArtifactSink {
    async fn store_screenshot(&self, name: &str, png: &[u8]) -> EngineResult<String> {
        let path = self.dir.join(name);
        fs::write(&path, png).await?;
        Ok(path.to_string_lossy().to_string())
    }

    async fn store_result(&self, result: &RunResult) -> EngineResult<Option<String>> {
        let path = self.dir.join("result.json");
        fs::write(&path, serde_json::to_vec_pretty(result)?).await?;
        Ok(Some(path.to_string_lossy().to_string()))
    }

    fn location(&self) -> Option<String> {
        Some(self.dir.to_string_lossy().to_string())
    }
}

/// 只在内存里记账的产物存储
#[derive(Debug, Default)]
pub struct MemoryArtifactSink {
    screenshots: Mutex<Vec<(String, usize)>>,
    results: Mutex<Vec<RunResult>>,
}

impl MemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已保存的截图名
    pub async fn screenshot_names(&self) -> Vec<String> {
        self.screenshots
            .lock()
            .await
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub async fn results(&self) -> Vec<RunResult> {
        self.results.lock().await.clone()
    }
}

#[async_trait]
impl ArtifactSink for MemoryArtifactSink {
    async fn store_screenshot(&self, name: &str, png: &[u8]) -> EngineResult<String> {
        self.screenshots
            .lock()
            .await
            .push((name.to_string(), png.len()));
        Ok(format!("memory://{}", name))
    }

    async fn store_result(&self, result: &RunResult) -> EngineResult<Option<String>> {
        self.results.lock().await.push(result.clone());
        Ok(None)
    }
}
