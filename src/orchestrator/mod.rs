//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `app` - 应用生命周期
//! - 加载场景与 UI Map、预检
//! - 启动/连接浏览器，运行结束后释放
//!
//! ### `run_controller` - 运行控制器
//! - 逐步执行、策略表、进度事件、取消
//!
//! ### `sub_scenario` - 子场景编排
//! - 环检测、共享变量作用域下的嵌套执行
//!
//! ### `preflight` - 静态检查
//!
//! ## 层次关系
//!
//! ```text
//! app (一次运行)
//!     ↓
//! run_controller (Vec<Step>) ⇄ sub_scenario (嵌套场景)
//!     ↓
//! workflow (单步：求值 → 分发 → 认证)
//!     ↓
//! services (选择器 / 变量 / 认证状态 / 资源 / 产物)
//!     ↓
//! infrastructure (BrowserDriver)
//! ```

pub mod app;
pub mod preflight;
pub mod run_controller;
pub mod sub_scenario;

pub use app::{prepare, App, PreparedRun, RunRequest};
pub use run_controller::{new_run_id, FailurePolicy, RunController};
