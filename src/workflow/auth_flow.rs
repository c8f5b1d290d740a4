//! 认证流程
//!
//! save / load 直接读写认证状态存储；ensure_auth 是一个小状态机：
//!
//! ```text
//! Checking ──已登录──▶ Authenticated
//!    │
//!    └─未登录─▶ LoggingIn ──成功──▶ Authenticated
//!                   └──失败──▶ Failed
//! ```

use std::fmt::Display;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::models::{ActionKind, AuthKey};
use crate::services::VariableScope;
use crate::workflow::locate::{bounded, locate, Expectation};
use crate::workflow::run_ctx::{CallStack, EngineContext, NestedRunner, StepTrace};
use crate::workflow::step_evaluator::ResolvedEnsureAuth;

/// ensure_auth 所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Checking,
    LoggingIn,
    Authenticated,
    Failed,
}

impl Display for AuthPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AuthPhase::Checking => "检查登录状态",
            AuthPhase::LoggingIn => "执行登录",
            AuthPhase::Authenticated => "已认证",
            AuthPhase::Failed => "认证失败",
        };
        f.write_str(label)
    }
}

/// 认证流程
pub struct AuthFlow<'a> {
    ctx: &'a EngineContext,
}

impl<'a> AuthFlow<'a> {
    pub fn new(ctx: &'a EngineContext) -> Self {
        Self { ctx }
    }

    fn key(&self, state_name: &str) -> AuthKey {
        AuthKey::new(&self.ctx.settings.project_id, state_name)
    }

    fn enter(&self, phase: AuthPhase, trace: &mut StepTrace) {
        trace.log(format!("🔐 {}", phase));
    }

    /// 快照当前会话并写入存储
    pub async fn save(&self, state_name: &str, trace: &mut StepTrace) -> EngineResult<()> {
        let key = self.key(state_name);
        let state = self.ctx.driver.snapshot_session().await?;
        self.ctx.auth_store.put(&key, &state).await?;
        info!("💾 认证状态已保存: {} ({} 个 cookie)", key, state.cookies.len());
        trace.log(format!("认证状态已保存: {}", key));
        trace.selector = Some(format!("save_auth_state:{}", state_name));
        Ok(())
    }

    /// 恢复已保存的会话；不存在时什么也不做并返回 false
    pub async fn load(&self, state_name: &str, trace: &mut StepTrace) -> EngineResult<bool> {
        let key = self.key(state_name);
        trace.selector = Some(format!("load_auth_state:{}", state_name));
        match self.ctx.auth_store.get(&key).await? {
            Some(state) => {
                self.ctx.driver.restore_session(&state).await?;
                info!("🔑 已恢复认证状态: {}", key);
                trace.log(format!("已恢复认证状态: {}", key));
                Ok(true)
            }
            None => {
                trace.log(format!("认证状态 {} 不存在，跳过", key));
                Ok(false)
            }
        }
    }

    /// 确保已登录，必要时执行登录子场景并保存状态
    #[allow(clippy::too_many_arguments)]
    pub async fn ensure(
        &self,
        spec: &ResolvedEnsureAuth,
        timeout: Duration,
        scope: &mut VariableScope,
        stack: &CallStack,
        depth: usize,
        runner: &dyn NestedRunner,
        trace: &mut StepTrace,
    ) -> EngineResult<AuthPhase> {
        self.enter(AuthPhase::Checking, trace);
        let restored = self.load(&spec.state_name, trace).await?;
        self.visit(&spec.check_url, timeout).await?;

        if self.is_authenticated(spec, timeout, trace).await? {
            self.enter(AuthPhase::Authenticated, trace);
            let how = if restored { "restored" } else { "already" };
            trace.selector = Some(format!("ensure_auth:{}:{}", spec.state_name, how));
            return Ok(AuthPhase::Authenticated);
        }

        self.enter(AuthPhase::LoggingIn, trace);
        info!("🔐 未登录，执行登录场景: {}", spec.login_scenario_id);
        let login = match runner
            .run_nested(&spec.login_scenario_id, scope, stack, depth)
            .await
        {
            Ok(report) => report.settle(&spec.login_scenario_id, trace),
            Err(e) => Err(e),
        };

        if let Err(e) = login {
            if e.is_fatal() || e.is_cancelled() {
                return Err(e);
            }
            self.enter(AuthPhase::Failed, trace);
            warn!("❌ 登录场景 {} 失败: {}", spec.login_scenario_id, e);
            return Err(EngineError::AuthLoginFailure {
                scenario_id: spec.login_scenario_id.clone(),
                reason: e.to_string(),
            });
        }

        self.save(&spec.state_name, trace).await?;
        self.visit(&spec.check_url, timeout).await?;
        self.enter(AuthPhase::Authenticated, trace);
        trace.selector = Some(format!("ensure_auth:{}:logged_in", spec.state_name));
        Ok(AuthPhase::Authenticated)
    }

    async fn visit(&self, url: &str, timeout: Duration) -> EngineResult<()> {
        bounded(ActionKind::EnsureAuth, timeout, async {
            self.ctx.driver.goto(url).await.map_err(EngineError::from)
        })
        .await
    }

    /// 当前 URL 不含登录页特征，且（如配置了）已登录标记可见
    async fn is_authenticated(
        &self,
        spec: &ResolvedEnsureAuth,
        timeout: Duration,
        trace: &mut StepTrace,
    ) -> EngineResult<bool> {
        let current = self.ctx.driver.current_url().await?;
        if !spec.login_url_pattern.is_empty() && current.contains(&spec.login_url_pattern) {
            trace.log(format!("当前位于登录页: {}", current));
            return Ok(false);
        }

        let Some(candidates) = &spec.logged_in else {
            return Ok(true);
        };

        let budget = self.ctx.settings.auth_check_timeout.min(timeout);
        match locate(self.ctx.driver.as_ref(), candidates, Expectation::Visible, budget).await {
            Ok(hit) => {
                trace.log(format!("已登录标记可见: {}", hit.selector));
                Ok(true)
            }
            Err(EngineError::ElementNotFound { .. }) => {
                trace.log("未发现已登录标记");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
