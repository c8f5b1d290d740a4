use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 程序配置文件
///
/// 加载顺序：默认值 → TOML 文件 → `RUNNER_*` 环境变量 → 命令行参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 数据目录，包含 scenarios/ ui_maps/ auth_states/ resources/
    pub data_dir: String,
    /// 产物根目录，每次运行在其下建子目录
    pub artifacts_dir: String,
    /// 场景未声明 project_id 时使用
    pub project_id: String,
    /// 步骤默认超时（毫秒）
    pub default_timeout_ms: u64,
    pub headless: bool,
    /// 设置后连接到该端口上已运行的浏览器，而不是启动新的
    pub browser_debug_port: Option<u16>,
    pub chrome_executable: Option<String>,
    pub browser_args: Vec<String>,
    pub user_data_dir: Option<String>,
    /// 每步成功后截全页图
    pub capture_every_step: bool,
    /// type 动作的逐字间隔（毫秒）
    pub type_delay_ms: u64,
    /// ensure_auth 等待已登录标记的上限（毫秒）
    pub auth_check_timeout_ms: u64,
    /// 相对 URL 与相对文件路径的基准目录，默认为当前目录
    pub working_dir: Option<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            artifacts_dir: "artifacts".to_string(),
            project_id: "default".to_string(),
            default_timeout_ms: 5000,
            headless: true,
            browser_debug_port: None,
            chrome_executable: None,
            browser_args: Vec::new(),
            user_data_dir: None,
            capture_every_step: true,
            type_delay_ms: 50,
            auth_check_timeout_ms: 3000,
            working_dir: None,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 从可选的 TOML 文件加载，再应用环境变量
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("无法解析配置文件: {}", path.display()))?
            }
            None => Self::default(),
        };
        Ok(base.apply_env())
    }

    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// 用环境变量覆盖已有值，解析失败的变量被忽略
    pub fn apply_env(self) -> Self {
        let current = self;
        Self {
            data_dir: std::env::var("RUNNER_DATA_DIR").unwrap_or(current.data_dir),
            artifacts_dir: std::env::var("RUNNER_ARTIFACTS_DIR").unwrap_or(current.artifacts_dir),
            project_id: std::env::var("RUNNER_PROJECT_ID").unwrap_or(current.project_id),
            default_timeout_ms: std::env::var("RUNNER_DEFAULT_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(current.default_timeout_ms),
            headless: std::env::var("RUNNER_HEADLESS").ok().and_then(|v| v.parse().ok()).unwrap_or(current.headless),
            browser_debug_port: std::env::var("RUNNER_BROWSER_DEBUG_PORT").ok().and_then(|v| v.parse().ok()).or(current.browser_debug_port),
            chrome_executable: std::env::var("RUNNER_CHROME_EXECUTABLE").ok().or(current.chrome_executable),
            browser_args: current.browser_args,
            user_data_dir: std::env::var("RUNNER_USER_DATA_DIR").ok().or(current.user_data_dir),
            capture_every_step: std::env::var("RUNNER_CAPTURE_EVERY_STEP").ok().and_then(|v| v.parse().ok()).unwrap_or(current.capture_every_step),
            type_delay_ms: std::env::var("RUNNER_TYPE_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(current.type_delay_ms),
            auth_check_timeout_ms: std::env::var("RUNNER_AUTH_CHECK_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(current.auth_check_timeout_ms),
            working_dir: std::env::var("RUNNER_WORKING_DIR").ok().or(current.working_dir),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(current.verbose_logging),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn scenarios_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("scenarios")
    }

    pub fn ui_maps_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("ui_maps")
    }

    pub fn auth_states_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("auth_states")
    }

    pub fn resources_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("resources")
    }

    /// 解析工作目录，未配置时使用进程当前目录
    pub fn resolve_working_dir(&self) -> Result<PathBuf> {
        match &self.working_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => std::env::current_dir().context("无法获取当前目录"),
        }
    }
}
