//! 浏览器驱动接口 - 基础设施层
//!
//! 引擎只通过这组原语操作浏览器：定位策略、超时、重试都在上层，
//! 驱动的每个调用都是"立即尝试一次"。

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::DriverResult;
use crate::models::{AuthState, NetworkRequest};

/// 元素此刻的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// 选择器没有匹配任何已附加的元素
    Missing,
    /// 已附加但不可见
    Hidden,
    Visible,
}

/// 针对单个元素的操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementOp {
    Click,
    DoubleClick,
    Hover,
    Focus,
    ScrollIntoView,
    Check,
    Uncheck,
    /// 原子地清空并写入
    Fill(String),
    /// 逐字符输入
    Type { text: String, delay: Duration },
    Select(String),
    Press(String),
    /// 读取文本内容，结果在返回值中
    ReadText,
    SetInputFiles(PathBuf),
}

impl ElementOp {
    /// 是否要求元素可见；文件输入框和纯读取只要求已附加
    pub fn needs_visible(&self) -> bool {
        !matches!(self, ElementOp::ReadText | ElementOp::SetInputFiles(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ElementOp::Click => "click",
            ElementOp::DoubleClick => "dblclick",
            ElementOp::Hover => "hover",
            ElementOp::Focus => "focus",
            ElementOp::ScrollIntoView => "scroll",
            ElementOp::Check => "check",
            ElementOp::Uncheck => "uncheck",
            ElementOp::Fill(_) => "fill",
            ElementOp::Type { .. } => "type",
            ElementOp::Select(_) => "select",
            ElementOp::Press(_) => "press",
            ElementOp::ReadText => "read_text",
            ElementOp::SetInputFiles(_) => "set_input_files",
        }
    }
}

/// 浏览器驱动
///
/// 职责：
/// - 持有页面资源，只暴露原语能力
/// - 不认识 Step / Scenario
/// - 不做等待和重试
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// 导航并等待页面加载
    async fn goto(&self, url: &str) -> DriverResult<()>;

    async fn current_url(&self) -> DriverResult<String>;

    /// 查询元素状态，不等待
    async fn probe(&self, selector: &str) -> DriverResult<ElementState>;

    /// 对第一个匹配元素执行操作；ReadText 时返回文本
    async fn perform(&self, selector: &str, op: &ElementOp) -> DriverResult<Option<String>>;

    /// 在页面上下文执行脚本
    async fn evaluate(&self, script: &str) -> DriverResult<JsonValue>;

    /// PNG 截图
    async fn screenshot(&self, full_page: bool) -> DriverResult<Vec<u8>>;

    /// 导出 cookie 与当前 origin 的 storage
    async fn snapshot_session(&self) -> DriverResult<AuthState>;

    /// 把快照恢复到当前会话
    async fn restore_session(&self, state: &AuthState) -> DriverResult<()>;

    /// 取走自上次调用以来捕获的网络请求
    async fn take_network_requests(&self) -> Vec<NetworkRequest>;

    /// 结束录像并返回引用；不支持录像的驱动返回 None
    async fn finish_recording(&self) -> DriverResult<Option<String>> {
        Ok(None)
    }

    /// 释放页面
    async fn close(&self) -> DriverResult<()>;
}
