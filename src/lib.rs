//! # Scenario Runner
//!
//! 按 JSON DSL 描述的场景驱动浏览器执行端到端测试
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构，依赖只向下：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露原语能力
//! - `BrowserDriver` - 驱动接口：导航、探测、元素操作、脚本、截图、会话快照
//! - `ChromiumDriver` - 基于 chromiumoxide 的实现，附带网络请求捕获
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `SelectorResolver` - UI Map 引用 → 候选选择器
//! - `VariableScope` - `{{var}}` 替换
//! - `AuthStateStore` - 按 (project, state) 保存会话
//! - `ResourceResolver` / `ScenarioSource` / `ArtifactSink`
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个步骤"的完整处理流程
//! - `StepEvaluator` - 变量替换、选择器解析、超时确定
//! - `ActionDispatcher` - 候选定位与动作执行
//! - `AuthFlow` - save / load / ensure_auth 状态机
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/run_controller` - 逐步执行、策略表、进度事件
//! - `orchestrator/sub_scenario` - 子场景嵌套与环检测
//! - `orchestrator/app` - 浏览器生命周期
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{DriverError, EngineError, EngineResult};
pub use infrastructure::{BrowserDriver, ChromiumDriver};
pub use models::{RunEvent, RunResult, RunStatus, Scenario, Step, StepOutcome};
pub use orchestrator::{App, RunController, RunRequest};
pub use workflow::{EngineContext, EngineSettings};
