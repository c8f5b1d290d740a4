use thiserror::Error;

/// 执行引擎错误类型
///
/// 分为两类：
/// - 步骤级错误：交给运行控制器按 `continue_on_error` / `optional` 策略处理
/// - 致命错误（`is_fatal`）：绕过策略表，立即终止整个运行
#[derive(Debug, Error)]
pub enum EngineError {
    /// 所有候选选择器在超时内都未能定位到可操作的元素
    #[error("元素未找到: 已依次尝试 [{}] ({detail})", .candidates.join(", "))]
    ElementNotFound {
        candidates: Vec<String>,
        detail: String,
    },

    /// 步骤执行超过了预算时间
    #[error("动作 {action} 超时 ({timeout_ms}ms)")]
    ActionTimeout { action: String, timeout_ms: u64 },

    /// assert_text 在超时内未能匹配
    #[error("断言失败: {selector} 的文本不包含 '{expected}' (实际: '{actual}')")]
    AssertionFailure {
        selector: String,
        expected: String,
        actual: String,
    },

    /// 页面脚本抛出异常
    #[error("脚本执行失败: {0}")]
    ScriptExecution(String),

    /// 子场景调用链出现环
    #[error("场景循环引用: {}", .chain.join(" -> "))]
    CyclicScenarioReference { chain: Vec<String> },

    /// ensure_auth 的登录子场景失败
    #[error("登录场景 {scenario_id} 未能完成认证: {reason}")]
    AuthLoginFailure { scenario_id: String, reason: String },

    /// 步骤/场景文档不合法（未知动作、缺少必填字段等）
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 引用的场景不存在
    #[error("场景不存在: {0}")]
    ScenarioNotFound(String),

    /// run_scenario 调用的子场景以失败结束
    #[error("子场景 {scenario_id} 执行失败: {reason}")]
    SubScenarioFailed { scenario_id: String, reason: String },

    /// resource:<id> 引用或本地文件无法解析
    #[error("资源解析失败 ({reference}): {reason}")]
    Resource { reference: String, reason: String },

    /// 认证状态读写失败
    #[error("认证状态存储错误: {0}")]
    AuthStore(String),

    /// 运行被外部取消
    #[error("运行已取消")]
    Cancelled,

    #[error(transparent)]
    Browser(#[from] DriverError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 解析失败: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// 致命错误不受步骤策略表约束
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::CyclicScenarioReference { .. } | EngineError::Configuration(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

/// 浏览器驱动层错误
#[derive(Debug, Error)]
pub enum DriverError {
    /// 选择器当前没有匹配任何元素
    #[error("未找到元素: {0}")]
    NoSuchElement(String),

    #[error("页面脚本异常: {0}")]
    Script(String),

    #[error("导航到 {url} 失败: {reason}")]
    Navigation { url: String, reason: String },

    /// 其他 CDP 协议层面的失败
    #[error("浏览器协议错误: {0}")]
    Protocol(String),
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for DriverError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        DriverError::Protocol(err.to_string())
    }
}

// ========== 便捷构造函数 ==========

impl EngineError {
    /// 创建配置错误
    pub fn config(message: impl Into<String>) -> Self {
        EngineError::Configuration(message.into())
    }

    /// 创建资源解析错误
    pub fn resource(reference: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        EngineError::Resource {
            reference: reference.into(),
            reason: reason.to_string(),
        }
    }

    /// 创建认证状态存储错误
    pub fn auth_store(reason: impl std::fmt::Display) -> Self {
        EngineError::AuthStore(reason.to_string())
    }

    /// 驱动层脚本异常归入 ScriptExecution，其余保持 Browser
    pub fn from_script(err: DriverError) -> Self {
        match err {
            DriverError::Script(msg) => EngineError::ScriptExecution(msg),
            other => EngineError::Browser(other),
        }
    }
}

// ========== Result 类型别名 ==========

/// 引擎结果类型
pub type EngineResult<T> = Result<T, EngineError>;

/// 驱动结果类型
pub type DriverResult<T> = Result<T, DriverError>;
