//! 运行上下文
//!
//! 封装"我正在执行哪个场景的第几步"以及一次运行共享的协作者

use futures::future::BoxFuture;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::infrastructure::BrowserDriver;
use crate::models::{EventSender, RunEvent, RunStatus, StepOutcome};
use crate::services::{
    ArtifactSink, AuthStateStore, MemoryArtifactSink, MemoryAuthStore, ResourceResolver,
    ScenarioSource, SelectorResolver, StaticResourceResolver, VariableScope,
};

/// 引擎运行参数
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// 认证状态与资源所属项目
    pub project_id: String,
    pub default_timeout: Duration,
    /// 相对 URL 与相对文件路径的基准目录
    pub working_dir: PathBuf,
    pub capture_every_step: bool,
    pub type_delay: Duration,
    pub auth_check_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            project_id: "default".to_string(),
            default_timeout: Duration::from_millis(5000),
            working_dir: PathBuf::from("."),
            capture_every_step: false,
            type_delay: Duration::from_millis(50),
            auth_check_timeout: Duration::from_millis(3000),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config, project_id: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            project_id: project_id.into(),
            default_timeout: config.default_timeout(),
            working_dir: config.resolve_working_dir()?,
            capture_every_step: config.capture_every_step,
            type_delay: Duration::from_millis(config.type_delay_ms),
            auth_check_timeout: Duration::from_millis(config.auth_check_timeout_ms),
        })
    }
}

/// 一次运行共享的协作者
pub struct EngineContext {
    pub driver: Arc<dyn BrowserDriver>,
    pub selectors: SelectorResolver,
    pub scenarios: Arc<dyn ScenarioSource>,
    pub auth_store: Arc<dyn AuthStateStore>,
    pub resources: Arc<dyn ResourceResolver>,
    pub artifacts: Arc<dyn ArtifactSink>,
    pub settings: EngineSettings,
    pub events: Option<EventSender>,
    pub cancel: CancellationToken,
}

impl EngineContext {
    /// 只给定驱动和场景来源，其余使用内存实现
    pub fn new(driver: Arc<dyn BrowserDriver>, scenarios: Arc<dyn ScenarioSource>) -> Self {
        Self {
            driver,
            selectors: SelectorResolver::default(),
            scenarios,
            auth_store: Arc::new(MemoryAuthStore::new()),
            resources: Arc::new(StaticResourceResolver::new()),
            artifacts: Arc::new(MemoryArtifactSink::new()),
            settings: EngineSettings::default(),
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_selectors(mut self, selectors: SelectorResolver) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_auth_store(mut self, store: Arc<dyn AuthStateStore>) -> Self {
        self.auth_store = store;
        self
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceResolver>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactSink>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_events(mut self, events: Option<EventSender>) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 推送进度事件；接收端已关闭时静默丢弃
    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

/// 步骤上下文
#[derive(Debug, Clone)]
pub struct StepCtx {
    pub scenario_id: String,
    /// 在所属场景中的位置（从 0 开始）
    pub index: usize,
    /// 顶层为 0，每进入一层子场景加 1
    pub depth: usize,
}

impl StepCtx {
    pub fn new(scenario_id: impl Into<String>, index: usize, depth: usize) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            index,
            depth,
        }
    }
}

impl Display for StepCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.depth == 0 {
            write!(f, "[场景 {} 步骤#{}]", self.scenario_id, self.index + 1)
        } else {
            write!(
                f,
                "[场景 {} 步骤#{} 层级#{}]",
                self.scenario_id,
                self.index + 1,
                self.depth
            )
        }
    }
}

/// 子场景调用链，用于环检测
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStack {
    ids: Vec<String>,
}

impl CallStack {
    pub fn root(scenario_id: impl Into<String>) -> Self {
        Self {
            ids: vec![scenario_id.into()],
        }
    }

    pub fn contains(&self, scenario_id: &str) -> bool {
        self.ids.iter().any(|id| id == scenario_id)
    }

    /// 进入子场景后的调用链
    pub fn push(&self, scenario_id: impl Into<String>) -> Self {
        let mut ids = self.ids.clone();
        ids.push(scenario_id.into());
        Self { ids }
    }

    /// 当前调用链再加上一个 id，用于报告环
    pub fn chain_with(&self, scenario_id: &str) -> Vec<String> {
        let mut chain = self.ids.clone();
        chain.push(scenario_id.to_string());
        chain
    }
}

/// 单步执行期间收集的信息
pub struct StepTrace {
    ctx: StepCtx,
    events: Option<EventSender>,
    /// 本步骤产物文件名前缀，如 `007_click`
    pub artifact_stem: String,
    pub logs: Vec<String>,
    pub selector: Option<String>,
    pub screenshot: Option<String>,
    pub children: Vec<StepOutcome>,
}

impl StepTrace {
    pub fn new(ctx: StepCtx, events: Option<EventSender>, artifact_stem: impl Into<String>) -> Self {
        Self {
            ctx,
            events,
            artifact_stem: artifact_stem.into(),
            logs: Vec::new(),
            selector: None,
            screenshot: None,
            children: Vec::new(),
        }
    }

    /// 记录一行步骤日志并实时推送
    pub fn log(&mut self, line: impl Into<String>) {
        let line = line.into();
        debug!("{} {}", self.ctx, line);
        if let Some(tx) = &self.events {
            let _ = tx.send(RunEvent::StepLog {
                scenario_id: self.ctx.scenario_id.clone(),
                depth: self.ctx.depth,
                index: self.ctx.index,
                line: line.clone(),
            });
        }
        self.logs.push(line);
    }
}

/// 一个场景（顶层或子场景）执行后的汇总
#[derive(Debug, Default)]
pub struct ScenarioReport {
    pub outcomes: Vec<StepOutcome>,
    /// 有非 optional 步骤失败
    pub failed: bool,
    pub cancelled: bool,
    /// 终止运行的致命错误
    pub fatal: Option<EngineError>,
}

impl ScenarioReport {
    pub fn status(&self) -> RunStatus {
        if self.fatal.is_some() {
            RunStatus::Failed
        } else if self.cancelled {
            RunStatus::Cancelled
        } else if self.failed {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        }
    }

    /// 第一个失败步骤的错误信息
    pub fn failure_reason(&self) -> String {
        self.outcomes
            .iter()
            .find(|o| o.is_failed())
            .map(|o| {
                format!(
                    "步骤#{} ({}): {}",
                    o.index + 1,
                    o.action,
                    o.error.as_deref().unwrap_or("未知错误")
                )
            })
            .unwrap_or_else(|| "未知错误".to_string())
    }

    /// 子步骤并入调用方的 trace，子场景的失败转换成调用步骤的错误
    pub fn settle(self, scenario_id: &str, trace: &mut StepTrace) -> EngineResult<()> {
        let reason = self.failure_reason();
        trace.children.extend(self.outcomes);
        if let Some(fatal) = self.fatal {
            return Err(fatal);
        }
        if self.cancelled {
            return Err(EngineError::Cancelled);
        }
        if self.failed {
            return Err(EngineError::SubScenarioFailed {
                scenario_id: scenario_id.to_string(),
                reason,
            });
        }
        Ok(())
    }
}

/// 子场景执行入口
///
/// 由编排层实现，流程层只依赖这个接口
pub trait NestedRunner: Send + Sync {
    fn run_nested<'a>(
        &'a self,
        scenario_id: &'a str,
        scope: &'a mut VariableScope,
        stack: &'a CallStack,
        depth: usize,
    ) -> BoxFuture<'a, EngineResult<ScenarioReport>>;
}
