//! 子场景编排
//!
//! run_scenario 和 ensure_auth 的登录都从这里进入。
//! 子场景与调用方共享同一个变量作用域，深度加一，调用链加上自己。

use tracing::{error, info};

use crate::error::{EngineError, EngineResult};
use crate::orchestrator::run_controller::RunController;
use crate::services::VariableScope;
use crate::workflow::{CallStack, ScenarioReport};

/// 执行子场景
///
/// 调用链中已有该场景时不执行任何步骤，直接返回循环引用错误
pub async fn run_sub_scenario(
    controller: &RunController,
    scenario_id: &str,
    scope: &mut VariableScope,
    stack: &CallStack,
    depth: usize,
) -> EngineResult<ScenarioReport> {
    if stack.contains(scenario_id) {
        let chain = stack.chain_with(scenario_id);
        error!("🔁 检测到场景循环引用: {}", chain.join(" -> "));
        return Err(EngineError::CyclicScenarioReference { chain });
    }

    let scenario = controller
        .context()
        .scenarios
        .load(scenario_id)
        .await?
        .ok_or_else(|| EngineError::ScenarioNotFound(scenario_id.to_string()))?;

    info!(
        "📂 子场景 {} 开始 ({} 步, 层级 {})",
        scenario.display_name(),
        scenario.steps.len(),
        depth + 1
    );

    let child_stack = stack.push(scenario_id);
    let report = controller
        .execute_steps(&scenario.id, &scenario.steps, scope, &child_stack, depth + 1)
        .await;

    info!("📂 子场景 {} 结束: {:?}", scenario_id, report.status());
    Ok(report)
}
