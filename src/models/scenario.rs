//! 场景模型

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::auth::check_key_segment;
use crate::models::step::{Step, StepDocument, StepKind};

/// 场景文件的原始形态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDocument {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// 裸元素名默认查找的 UI Map
    #[serde(default)]
    pub ui_map_id: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepDocument>,
}

/// 已校验的场景
#[derive(Debug, Clone)]
pub struct Scenario {
    pub id: String,
    pub name: Option<String>,
    pub project_id: Option<String>,
    pub ui_map_id: Option<String>,
    pub steps: Vec<Step>,
}

impl Scenario {
    /// 校验文档中的每个步骤，错误信息带上场景和步骤位置
    pub fn from_document(doc: ScenarioDocument) -> EngineResult<Self> {
        if doc.id.trim().is_empty() {
            return Err(EngineError::config("场景缺少 id"));
        }
        if let Some(project_id) = &doc.project_id {
            check_key_segment("project_id", project_id)
                .map_err(|msg| EngineError::config(format!("场景 {}: {}", doc.id, msg)))?;
        }

        let mut steps = Vec::with_capacity(doc.steps.len());
        for (index, step_doc) in doc.steps.into_iter().enumerate() {
            let step = Step::from_document(step_doc).map_err(|e| match e {
                EngineError::Configuration(msg) => EngineError::config(format!(
                    "场景 {} 第 {} 步: {}",
                    doc.id,
                    index + 1,
                    msg
                )),
                other => other,
            })?;
            steps.push(step);
        }

        Ok(Self {
            id: doc.id,
            name: doc.name,
            project_id: doc.project_id,
            ui_map_id: doc.ui_map_id,
            steps,
        })
    }

    pub fn from_json(json: &str) -> EngineResult<Self> {
        let doc: ScenarioDocument = serde_json::from_str(json)
            .map_err(|e| EngineError::config(format!("场景文档格式错误: {}", e)))?;
        Self::from_document(doc)
    }

    /// 显示名，未命名时退回 id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// 按出现顺序列出引用的子场景（run_scenario 与 ensure_auth 登录场景）
    pub fn referenced_scenarios(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|s| s.kind.referenced_scenario())
            .collect()
    }

    /// 在最前面插入一个 goto，用于环境 base URL
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let goto = Step::new(StepKind::Goto {
            url: base_url.to_string(),
        });
        self.steps.insert(0, goto);
        self
    }
}
