//! 执行结果模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::step::{ActionKind, Step};

/// 单步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    /// 运行提前结束，未执行
    Skipped,
}

/// 运行最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

/// 步骤期间捕获的一次网络请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRequest {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub status: Option<u16>,
    pub duration_ms: u64,
    #[serde(default)]
    pub response_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 单步执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// 在所属场景中的位置（从 0 开始）
    pub index: usize,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: StepStatus,
    /// 实际生效的选择器 / URL / 变量说明
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default)]
    pub network_requests: Vec<NetworkRequest>,
    #[serde(default)]
    pub logs: Vec<String>,
    /// run_scenario / ensure_auth 内部执行的子步骤
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StepOutcome>,
}

impl StepOutcome {
    /// 未执行的步骤
    pub fn skipped(index: usize, step: &Step) -> Self {
        Self {
            index,
            action: step.action(),
            name: step.name.clone(),
            status: StepStatus::Skipped,
            selector: None,
            error: None,
            duration_ms: 0,
            screenshot: None,
            network_requests: Vec::new(),
            logs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// 一次运行的完整结果，落盘为 result.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub status: RunStatus,
    pub scenario_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    /// 场景显示名
    pub goal: String,
    pub steps: Vec<StepOutcome>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub total_duration_ms: u64,
    #[serde(default)]
    pub artifact_dir: Option<String>,
    #[serde(default)]
    pub video: Option<String>,
    /// 致命错误或取消原因
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// 顶层失败步骤数
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.is_failed()).count()
    }

    pub fn succeeded_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Success)
            .count()
    }
}
