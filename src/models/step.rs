//! 步骤模型
//!
//! 场景文件中的步骤以扁平 JSON 文档（`StepDocument`）存储，
//! 加载时校验并转换成封闭的 `StepKind` 枚举。未知动作和缺少必填字段
//! 都在这里以 `Configuration` 错误拒绝，任何浏览器交互之前完成。

use phf::phf_map;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::models::auth::check_key_segment;

/// 未指定 state_name 时使用的认证状态名
pub const DEFAULT_STATE_NAME: &str = "default";
/// ensure_auth 默认的登录页 URL 特征
pub const DEFAULT_LOGIN_URL_PATTERN: &str = "/login";
/// press 未指定按键时使用的键
pub const DEFAULT_PRESS_KEY: &str = "Enter";

/// 动作名称
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Goto,
    Click,
    Dblclick,
    Hover,
    Focus,
    Scroll,
    Check,
    Uncheck,
    Fill,
    Type,
    Select,
    Press,
    WaitFor,
    AssertText,
    Wait,
    RunJs,
    Screenshot,
    Extract,
    UploadFile,
    PasteImage,
    RunScenario,
    SaveAuthState,
    LoadAuthState,
    EnsureAuth,
}

static ACTIONS: phf::Map<&'static str, ActionKind> = phf_map! {
    "goto" => ActionKind::Goto,
    "click" => ActionKind::Click,
    "dblclick" => ActionKind::Dblclick,
    "hover" => ActionKind::Hover,
    "focus" => ActionKind::Focus,
    "scroll" => ActionKind::Scroll,
    "check" => ActionKind::Check,
    "uncheck" => ActionKind::Uncheck,
    "fill" => ActionKind::Fill,
    "type" => ActionKind::Type,
    "select" => ActionKind::Select,
    "press" => ActionKind::Press,
    "wait_for" => ActionKind::WaitFor,
    "assert_text" => ActionKind::AssertText,
    "wait" => ActionKind::Wait,
    "run_js" => ActionKind::RunJs,
    "screenshot" => ActionKind::Screenshot,
    "extract" => ActionKind::Extract,
    "upload_file" => ActionKind::UploadFile,
    "paste_image" => ActionKind::PasteImage,
    "run_scenario" => ActionKind::RunScenario,
    "save_auth_state" => ActionKind::SaveAuthState,
    "load_auth_state" => ActionKind::LoadAuthState,
    "ensure_auth" => ActionKind::EnsureAuth,
};

impl ActionKind {
    /// 按 DSL 中的名称查找动作
    pub fn parse(name: &str) -> Option<Self> {
        ACTIONS.get(name).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Goto => "goto",
            ActionKind::Click => "click",
            ActionKind::Dblclick => "dblclick",
            ActionKind::Hover => "hover",
            ActionKind::Focus => "focus",
            ActionKind::Scroll => "scroll",
            ActionKind::Check => "check",
            ActionKind::Uncheck => "uncheck",
            ActionKind::Fill => "fill",
            ActionKind::Type => "type",
            ActionKind::Select => "select",
            ActionKind::Press => "press",
            ActionKind::WaitFor => "wait_for",
            ActionKind::AssertText => "assert_text",
            ActionKind::Wait => "wait",
            ActionKind::RunJs => "run_js",
            ActionKind::Screenshot => "screenshot",
            ActionKind::Extract => "extract",
            ActionKind::UploadFile => "upload_file",
            ActionKind::PasteImage => "paste_image",
            ActionKind::RunScenario => "run_scenario",
            ActionKind::SaveAuthState => "save_auth_state",
            ActionKind::LoadAuthState => "load_auth_state",
            ActionKind::EnsureAuth => "ensure_auth",
        }
    }
}

impl Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 场景文件中步骤的原始形态
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepDocument {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_as: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_scenario_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logged_in_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_url_pattern: Option<String>,
    /// 毫秒
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
}

/// 失败处理与超时选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOptions {
    pub continue_on_error: bool,
    pub optional: bool,
    /// 覆盖运行级默认超时
    pub timeout: Option<Duration>,
}

/// 无值的元素交互
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Click,
    DoubleClick,
    Hover,
    Focus,
    Scroll,
    Check,
    Uncheck,
}

/// ensure_auth 的参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureAuthSpec {
    pub check_url: String,
    pub login_scenario_id: String,
    pub state_name: String,
    pub logged_in_selector: Option<String>,
    pub login_url_pattern: String,
}

/// 校验后的步骤动作，每种动作只携带它需要的字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    Goto { url: String },
    Interact { gesture: Gesture, target: String },
    Fill { target: String, value: String },
    Type { target: String, value: String },
    Select { target: String, value: String },
    Press { target: String, key: String },
    WaitFor { target: String },
    AssertText { target: String, value: String },
    /// 毫秒数，可能含 `{{var}}` 占位符，求值时再解析
    Wait { value: String },
    RunJs { script: String },
    Screenshot,
    Extract { target: String, save_as: String },
    UploadFile { target: String, file_path: String },
    PasteImage { target: String, file_path: String },
    RunScenario { scenario_id: String },
    SaveAuthState { state_name: String },
    LoadAuthState { state_name: String },
    EnsureAuth(EnsureAuthSpec),
}

impl StepKind {
    pub fn action(&self) -> ActionKind {
        match self {
            StepKind::Goto { .. } => ActionKind::Goto,
            StepKind::Interact { gesture, .. } => match gesture {
                Gesture::Click => ActionKind::Click,
                Gesture::DoubleClick => ActionKind::Dblclick,
                Gesture::Hover => ActionKind::Hover,
                Gesture::Focus => ActionKind::Focus,
                Gesture::Scroll => ActionKind::Scroll,
                Gesture::Check => ActionKind::Check,
                Gesture::Uncheck => ActionKind::Uncheck,
            },
            StepKind::Fill { .. } => ActionKind::Fill,
            StepKind::Type { .. } => ActionKind::Type,
            StepKind::Select { .. } => ActionKind::Select,
            StepKind::Press { .. } => ActionKind::Press,
            StepKind::WaitFor { .. } => ActionKind::WaitFor,
            StepKind::AssertText { .. } => ActionKind::AssertText,
            StepKind::Wait { .. } => ActionKind::Wait,
            StepKind::RunJs { .. } => ActionKind::RunJs,
            StepKind::Screenshot => ActionKind::Screenshot,
            StepKind::Extract { .. } => ActionKind::Extract,
            StepKind::UploadFile { .. } => ActionKind::UploadFile,
            StepKind::PasteImage { .. } => ActionKind::PasteImage,
            StepKind::RunScenario { .. } => ActionKind::RunScenario,
            StepKind::SaveAuthState { .. } => ActionKind::SaveAuthState,
            StepKind::LoadAuthState { .. } => ActionKind::LoadAuthState,
            StepKind::EnsureAuth(_) => ActionKind::EnsureAuth,
        }
    }

    /// 主要目标，用于日志和结果展示
    pub fn target(&self) -> Option<&str> {
        match self {
            StepKind::Goto { url } => Some(url),
            StepKind::Interact { target, .. }
            | StepKind::Fill { target, .. }
            | StepKind::Type { target, .. }
            | StepKind::Select { target, .. }
            | StepKind::Press { target, .. }
            | StepKind::WaitFor { target }
            | StepKind::AssertText { target, .. }
            | StepKind::Extract { target, .. }
            | StepKind::UploadFile { target, .. }
            | StepKind::PasteImage { target, .. } => Some(target),
            StepKind::RunScenario { scenario_id } => Some(scenario_id),
            StepKind::EnsureAuth(spec) => Some(&spec.check_url),
            StepKind::SaveAuthState { state_name } | StepKind::LoadAuthState { state_name } => {
                Some(state_name)
            }
            StepKind::Wait { .. } | StepKind::RunJs { .. } | StepKind::Screenshot => None,
        }
    }

    /// 该步骤会调用的其他场景
    pub fn referenced_scenario(&self) -> Option<&str> {
        match self {
            StepKind::RunScenario { scenario_id } => Some(scenario_id),
            StepKind::EnsureAuth(spec) => Some(&spec.login_scenario_id),
            _ => None,
        }
    }
}

/// 一个已校验的步骤
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: Option<String>,
    pub kind: StepKind,
    pub options: StepOptions,
}

impl Step {
    /// 创建使用默认选项的步骤
    pub fn new(kind: StepKind) -> Self {
        Self {
            name: None,
            kind,
            options: StepOptions::default(),
        }
    }

    pub fn action(&self) -> ActionKind {
        self.kind.action()
    }

    /// 校验并转换原始步骤文档
    pub fn from_document(doc: StepDocument) -> EngineResult<Self> {
        let action = ActionKind::parse(doc.action.trim())
            .ok_or_else(|| EngineError::config(format!("未知动作 '{}'", doc.action)))?;

        let options = StepOptions {
            continue_on_error: doc.continue_on_error.unwrap_or(false),
            optional: doc.optional.unwrap_or(false),
            timeout: doc.timeout.map(Duration::from_millis),
        };
        let name = present(doc.name.clone());
        let kind = build_kind(action, doc)?;

        Ok(Self {
            name,
            kind,
            options,
        })
    }
}

impl TryFrom<StepDocument> for Step {
    type Error = EngineError;

    fn try_from(doc: StepDocument) -> EngineResult<Self> {
        Step::from_document(doc)
    }
}

/// 空字符串视为缺失
fn present(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.trim().is_empty())
}

fn require(action: ActionKind, field: &str, value: Option<String>) -> EngineResult<String> {
    present(value).ok_or_else(|| EngineError::config(format!("{} 缺少必填字段 {}", action, field)))
}

/// 认证状态名会成为存储路径的一段，加载时就拒绝非法值
fn state_key(action: ActionKind, state_name: String) -> EngineResult<String> {
    check_key_segment("state_name", &state_name)
        .map_err(|msg| EngineError::config(format!("{}: {}", action, msg)))?;
    Ok(state_name)
}

fn build_kind(action: ActionKind, doc: StepDocument) -> EngineResult<StepKind> {
    let StepDocument {
        target,
        url,
        value,
        save_as,
        scenario_id,
        file_path,
        state_name,
        check_url,
        login_scenario_id,
        logged_in_selector,
        login_url_pattern,
        ..
    } = doc;

    let interact = |gesture: Gesture, target: Option<String>| -> EngineResult<StepKind> {
        Ok(StepKind::Interact {
            gesture,
            target: require(action, "target", target)?,
        })
    };

    let kind = match action {
        ActionKind::Goto => StepKind::Goto {
            url: require(action, "url", url)?,
        },
        ActionKind::Click => interact(Gesture::Click, target)?,
        ActionKind::Dblclick => interact(Gesture::DoubleClick, target)?,
        ActionKind::Hover => interact(Gesture::Hover, target)?,
        ActionKind::Focus => interact(Gesture::Focus, target)?,
        ActionKind::Scroll => interact(Gesture::Scroll, target)?,
        ActionKind::Check => interact(Gesture::Check, target)?,
        ActionKind::Uncheck => interact(Gesture::Uncheck, target)?,
        ActionKind::Fill => StepKind::Fill {
            target: require(action, "target", target)?,
            value: require(action, "value", value)?,
        },
        ActionKind::Type => StepKind::Type {
            target: require(action, "target", target)?,
            value: require(action, "value", value)?,
        },
        ActionKind::Select => StepKind::Select {
            target: require(action, "target", target)?,
            value: require(action, "value", value)?,
        },
        ActionKind::Press => StepKind::Press {
            target: require(action, "target", target)?,
            key: present(value).unwrap_or_else(|| DEFAULT_PRESS_KEY.to_string()),
        },
        ActionKind::WaitFor => StepKind::WaitFor {
            target: require(action, "target", target)?,
        },
        ActionKind::AssertText => StepKind::AssertText {
            target: require(action, "target", target)?,
            value: require(action, "value", value)?,
        },
        ActionKind::Wait => {
            let value = require(action, "value", value)?;
            if !value.contains("{{") {
                parse_wait_millis(&value)?;
            }
            StepKind::Wait { value }
        }
        ActionKind::RunJs => StepKind::RunJs {
            script: require(action, "value", value)?,
        },
        ActionKind::Screenshot => StepKind::Screenshot,
        ActionKind::Extract => StepKind::Extract {
            target: require(action, "target", target)?,
            save_as: require(action, "save_as", present(save_as).or(value))?,
        },
        ActionKind::UploadFile => StepKind::UploadFile {
            target: require(action, "target", target)?,
            file_path: require(action, "file_path", present(file_path).or(value))?,
        },
        ActionKind::PasteImage => StepKind::PasteImage {
            target: require(action, "target", target)?,
            file_path: require(action, "file_path", present(file_path).or(value))?,
        },
        ActionKind::RunScenario => StepKind::RunScenario {
            scenario_id: require(action, "scenario_id", present(scenario_id).or(value))?,
        },
        ActionKind::SaveAuthState => StepKind::SaveAuthState {
            state_name: state_key(
                action,
                present(state_name)
                    .or(present(value))
                    .unwrap_or_else(|| DEFAULT_STATE_NAME.to_string()),
            )?,
        },
        ActionKind::LoadAuthState => StepKind::LoadAuthState {
            state_name: state_key(
                action,
                require(action, "state_name", present(state_name).or(value))?,
            )?,
        },
        ActionKind::EnsureAuth => StepKind::EnsureAuth(EnsureAuthSpec {
            check_url: require(action, "check_url", present(check_url).or(url))?,
            login_scenario_id: require(
                action,
                "login_scenario_id",
                present(login_scenario_id).or(scenario_id),
            )?,
            state_name: state_key(
                action,
                present(state_name).unwrap_or_else(|| DEFAULT_STATE_NAME.to_string()),
            )?,
            logged_in_selector: present(logged_in_selector).or(present(target)),
            login_url_pattern: login_url_pattern
                .unwrap_or_else(|| DEFAULT_LOGIN_URL_PATTERN.to_string()),
        }),
    };

    Ok(kind)
}

/// 解析 wait 的毫秒数
pub fn parse_wait_millis(value: &str) -> EngineResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| EngineError::config(format!("wait 的值 '{}' 不是有效的毫秒数", value)))
}
