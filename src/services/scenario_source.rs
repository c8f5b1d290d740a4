//! 场景来源 - 业务能力层

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{EngineError, EngineResult};
use crate::models::{load_scenario_file, Scenario};

/// 按 id 提供已校验的场景
#[async_trait]
pub trait ScenarioSource: Send + Sync {
    /// 场景不存在返回 None；文档不合法返回 Configuration 错误
    async fn load(&self, scenario_id: &str) -> EngineResult<Option<Scenario>>;
}

/// 从 `<dir>/<id>.json` 读取
#[derive(Debug, Clone)]
pub struct FileScenarioSource {
    dir: PathBuf,
}

impl FileScenarioSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ScenarioSource for FileScenarioSource {
    async fn load(&self, scenario_id: &str) -> EngineResult<Option<Scenario>> {
        if scenario_id.contains(['/', '\\']) || scenario_id.starts_with('.') {
            return Err(EngineError::config(format!("非法的场景 id: '{}'", scenario_id)));
        }
        let path = self.dir.join(format!("{}.json", scenario_id));
        let scenario = load_scenario_file(&path).await?;

        if let Some(found) = &scenario {
            if found.id != scenario_id {
                tracing::warn!(
                    "场景文件 {} 中的 id 为 '{}'，与文件名不一致",
                    path.display(),
                    found.id
                );
            }
        }
        Ok(scenario)
    }
}

/// 内存中的场景集合
#[derive(Debug, Clone, Default)]
pub struct MemoryScenarioSource {
    scenarios: HashMap<String, Scenario>,
}

impl MemoryScenarioSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scenario: Scenario) {
        self.scenarios.insert(scenario.id.clone(), scenario);
    }
}

impl FromIterator<Scenario> for MemoryScenarioSource {
    fn from_iter<I: IntoIterator<Item = Scenario>>(iter: I) -> Self {
        let mut source = MemoryScenarioSource::new();
        for scenario in iter {
            source.insert(scenario);
        }
        source
    }
}

#[async_trait]
impl ScenarioSource for MemoryScenarioSource {
    async fn load(&self, scenario_id: &str) -> EngineResult<Option<Scenario>> {
        Ok(self.scenarios.get(scenario_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_source_reads_by_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("login.json"),
            r##"{"id": "login", "steps": [{"action": "click", "target": "#go"}]}"##,
        )
        .unwrap();

        let source = FileScenarioSource::new(dir.path());
        let scenario = source.load("login").await.unwrap().unwrap();
        assert_eq!(scenario.steps.len(), 1);
        assert!(source.load("missing").await.unwrap().is_none());
        assert!(source.load("../login").await.unwrap_err().is_fatal());
    }
}
