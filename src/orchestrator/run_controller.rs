//! 运行控制器 - 编排层
//!
//! ## 职责
//!
//! 1. **预检**：执行前检查子场景引用，循环引用直接判定运行失败
//! 2. **逐步执行**：求值 → 分发 → 截图 → 收集网络请求 → 生成 StepOutcome
//! 3. **策略表**：按 `continue_on_error` / `optional` 决定是否继续、是否计入失败
//! 4. **进度事件**：按步骤顺序推送 RunEvent
//! 5. **取消**：外部取消后停止在当前步骤，剩余步骤记为 skipped

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::error::{EngineError, EngineResult};
use crate::models::{
    ActionKind, RunEvent, RunResult, RunStatus, Scenario, Step, StepOutcome, StepStatus,
};
use crate::orchestrator::{preflight, sub_scenario};
use crate::services::VariableScope;
use crate::utils::logging;
use crate::workflow::{
    ActionDispatcher, CallStack, EngineContext, NestedRunner, ResolvedStep, ScenarioReport,
    StepCtx, StepEvaluator, StepTrace,
};

/// 外层时限在步骤超时之上的余量
const TIMEOUT_GRACE: Duration = Duration::from_millis(100);

/// 步骤失败处理策略
///
/// | continue_on_error | optional | 运行继续 | 运行判定失败 |
/// |---|---|---|---|
/// | false | false | 否 | 是 |
/// | true  | false | 是 | 是 |
/// | false | true  | 否 | 否 |
/// | true  | true  | 是 | 否 |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    pub continue_on_error: bool,
    pub optional: bool,
}

impl FailurePolicy {
    pub fn of(step: &Step) -> Self {
        Self {
            continue_on_error: step.options.continue_on_error,
            optional: step.options.optional,
        }
    }

    /// 失败后是否继续执行后续步骤
    pub fn continues(self) -> bool {
        self.continue_on_error
    }

    /// 失败是否计入运行失败
    pub fn fails_run(self) -> bool {
        !self.optional
    }
}

/// 生成 8 位运行 id
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// 运行控制器
pub struct RunController {
    ctx: EngineContext,
    artifact_seq: AtomicUsize,
}

impl RunController {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            artifact_seq: AtomicUsize::new(0),
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// 执行场景，使用新生成的运行 id
    pub async fn run(&self, scenario: &Scenario) -> RunResult {
        self.run_with_id(scenario, new_run_id()).await
    }

    /// 执行场景并返回结果；失败也以 RunResult 表达
    pub async fn run_with_id(&self, scenario: &Scenario, run_id: String) -> RunResult {
        let start_time = Utc::now();
        let clock = Instant::now();
        logging::log_run_start(&run_id, scenario);

        self.ctx.emit(RunEvent::RunStarted {
            run_id: run_id.clone(),
            scenario_id: scenario.id.clone(),
            total_steps: scenario.steps.len(),
        });

        let mut result = RunResult {
            run_id,
            status: RunStatus::Completed,
            scenario_id: scenario.id.clone(),
            project_id: Some(self.ctx.settings.project_id.clone()),
            goal: scenario.display_name().to_string(),
            steps: Vec::new(),
            start_time,
            end_time: None,
            total_duration_ms: 0,
            artifact_dir: self.ctx.artifacts.location(),
            video: None,
            error: None,
        };

        match preflight::check_references(scenario, self.ctx.scenarios.as_ref()).await {
            Err(e) => {
                error!("❌ 预检失败: {}", e);
                result.status = RunStatus::Failed;
                result.error = Some(e.to_string());
                result.steps = scenario
                    .steps
                    .iter()
                    .enumerate()
                    .map(|(i, step)| StepOutcome::skipped(i, step))
                    .collect();
            }
            Ok(()) => {
                let mut scope = VariableScope::new();
                let stack = CallStack::root(&scenario.id);
                let report = self
                    .execute_steps(&scenario.id, &scenario.steps, &mut scope, &stack, 0)
                    .await;

                result.status = report.status();
                result.error = match (&report.fatal, report.cancelled) {
                    (Some(fatal), _) => Some(fatal.to_string()),
                    (None, true) => Some(EngineError::Cancelled.to_string()),
                    (None, false) => None,
                };
                result.steps = report.outcomes;
            }
        }

        match self.ctx.driver.finish_recording().await {
            Ok(video) => result.video = video,
            Err(e) => warn!("⚠️ 录像保存失败: {}", e),
        }

        result.end_time = Some(Utc::now());
        result.total_duration_ms = clock.elapsed().as_millis() as u64;

        if let Err(e) = self.ctx.artifacts.store_result(&result).await {
            warn!("⚠️ 运行结果写入失败: {}", e);
        }

        logging::log_run_complete(&result);
        self.ctx.emit(RunEvent::RunCompleted {
            result: result.clone(),
        });
        result
    }

    /// 顺序执行一组步骤（顶层或子场景）
    pub fn execute_steps<'a>(
        &'a self,
        scenario_id: &'a str,
        steps: &'a [Step],
        scope: &'a mut VariableScope,
        stack: &'a CallStack,
        depth: usize,
    ) -> BoxFuture<'a, ScenarioReport> {
        async move {
            let mut report = ScenarioReport::default();

            for (index, step) in steps.iter().enumerate() {
                if self.ctx.cancel.is_cancelled() {
                    report.cancelled = true;
                    skip_rest(&mut report, steps, index);
                    break;
                }

                let step_ctx = StepCtx::new(scenario_id, index, depth);
                logging::log_step_start(&step_ctx, step);
                self.ctx.emit(RunEvent::StepStarted {
                    scenario_id: scenario_id.to_string(),
                    depth,
                    index,
                    action: step.action(),
                    name: step.name.clone(),
                });

                let (outcome, failure) = self.execute_step(&step_ctx, step, scope, stack).await;

                logging::log_step_end(&step_ctx, &outcome);
                self.ctx.emit(RunEvent::StepEnded {
                    scenario_id: scenario_id.to_string(),
                    depth,
                    outcome: outcome.clone(),
                });
                report.outcomes.push(outcome);

                let Some(failure) = failure else {
                    continue;
                };

                if failure.is_fatal() {
                    report.failed = true;
                    report.fatal = Some(failure);
                    skip_rest(&mut report, steps, index + 1);
                    break;
                }
                if failure.is_cancelled() {
                    report.cancelled = true;
                    skip_rest(&mut report, steps, index + 1);
                    break;
                }

                let policy = FailurePolicy::of(step);
                if policy.fails_run() {
                    report.failed = true;
                }
                if !policy.continues() {
                    skip_rest(&mut report, steps, index + 1);
                    break;
                }
            }

            report
        }
        .boxed()
    }

    async fn execute_step(
        &self,
        step_ctx: &StepCtx,
        step: &Step,
        scope: &mut VariableScope,
        stack: &CallStack,
    ) -> (StepOutcome, Option<EngineError>) {
        let started = Instant::now();
        let action = step.action();
        let seq = self.artifact_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let mut trace = StepTrace::new(
            step_ctx.clone(),
            self.ctx.events.clone(),
            format!("{:03}_{}", seq, action),
        );

        // 丢弃上一步之后残留的请求
        self.ctx.driver.take_network_requests().await;

        let result = self
            .evaluate_and_dispatch(step, scope, stack, step_ctx.depth, &mut trace)
            .await;

        match &result {
            Ok(()) if self.ctx.settings.capture_every_step && captures_after(action) => {
                let name = format!("{}.png", trace.artifact_stem);
                self.capture(name, &mut trace).await;
            }
            Err(e) if !e.is_fatal() && !e.is_cancelled() => {
                let name = format!("{}_error.png", trace.artifact_stem);
                self.capture(name, &mut trace).await;
            }
            _ => {}
        }

        let network_requests = self.ctx.driver.take_network_requests().await;
        let failure = result.err();
        if let Some(e) = &failure {
            trace.log(format!("❌ {}", e));
        }

        let outcome = StepOutcome {
            index: step_ctx.index,
            action,
            name: step.name.clone(),
            status: if failure.is_some() {
                StepStatus::Failed
            } else {
                StepStatus::Success
            },
            selector: trace.selector.take(),
            error: failure.as_ref().map(ToString::to_string),
            duration_ms: started.elapsed().as_millis() as u64,
            screenshot: trace.screenshot.take(),
            network_requests,
            logs: std::mem::take(&mut trace.logs),
            children: std::mem::take(&mut trace.children),
        };
        (outcome, failure)
    }

    async fn evaluate_and_dispatch(
        &self,
        step: &Step,
        scope: &mut VariableScope,
        stack: &CallStack,
        depth: usize,
        trace: &mut StepTrace,
    ) -> EngineResult<()> {
        let resolved = StepEvaluator::new(&self.ctx).evaluate(step, scope).await?;
        for name in &resolved.undefined {
            warn!("⚠️ 变量 {} 未定义，按原文保留", name);
            trace.log(format!("⚠️ 变量 {{{{{}}}}} 未定义，按原文保留", name));
        }

        let dispatcher = ActionDispatcher::new(&self.ctx, self);
        let work = dispatcher.dispatch(&resolved, scope, stack, depth, trace);
        let guarded = async {
            if resolved.is_composite() {
                work.await
            } else {
                guard(&resolved, work).await
            }
        };

        tokio::select! {
            biased;
            _ = self.ctx.cancel.cancelled() => Err(EngineError::Cancelled),
            result = guarded => result,
        }
    }

    async fn capture(&self, name: String, trace: &mut StepTrace) {
        let png = match self.ctx.driver.screenshot(true).await {
            Ok(png) => png,
            Err(e) => {
                warn!("⚠️ 截图失败: {}", e);
                return;
            }
        };
        match self.ctx.artifacts.store_screenshot(&name, &png).await {
            Ok(stored) => trace.screenshot = Some(stored),
            Err(e) => warn!("⚠️ 截图保存失败: {}", e),
        }
    }
}

impl NestedRunner for RunController {
    fn run_nested<'a>(
        &'a self,
        scenario_id: &'a str,
        scope: &'a mut VariableScope,
        stack: &'a CallStack,
        depth: usize,
    ) -> BoxFuture<'a, EngineResult<ScenarioReport>> {
        sub_scenario::run_sub_scenario(self, scenario_id, scope, stack, depth).boxed()
    }
}

/// 单步外层时限：步骤超时加一个轮询间隔的余量
async fn guard<F>(resolved: &ResolvedStep, work: F) -> EngineResult<()>
where
    F: std::future::Future<Output = EngineResult<()>>,
{
    let limit = resolved.timeout + TIMEOUT_GRACE;
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::ActionTimeout {
            action: resolved.action.to_string(),
            timeout_ms: resolved.timeout.as_millis() as u64,
        }),
    }
}

/// 成功后自动截图的动作
fn captures_after(action: ActionKind) -> bool {
    !matches!(
        action,
        ActionKind::Screenshot
            | ActionKind::Wait
            | ActionKind::RunScenario
            | ActionKind::EnsureAuth
            | ActionKind::SaveAuthState
            | ActionKind::LoadAuthState
    )
}

fn skip_rest(report: &mut ScenarioReport, steps: &[Step], from: usize) {
    report.outcomes.extend(
        steps
            .iter()
            .enumerate()
            .skip(from)
            .map(|(i, step)| StepOutcome::skipped(i, step)),
    );
}
