/// 日志工具模块
///
/// 提供日志初始化和运行过程输出的辅助函数
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::{RunResult, RunStatus, Scenario, Step, StepOutcome, StepStatus};
use crate::workflow::StepCtx;

/// 初始化全局日志
///
/// `RUST_LOG` 优先；未设置时按 `verbose` 选择 debug 或 info
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("scenario_runner={},warn", default_level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 场景执行器启动");
    info!("📁 数据目录: {}", config.data_dir);
    info!("⏱️ 默认超时: {}ms", config.default_timeout_ms);
    match config.browser_debug_port {
        Some(port) => info!("🔌 连接已有浏览器: 端口 {}", port),
        None => info!("🖥️ 启动浏览器: {}", if config.headless { "无头" } else { "有界面" }),
    }
    info!("{}", "=".repeat(60));
}

/// 记录运行开始
pub fn log_run_start(run_id: &str, scenario: &Scenario) {
    info!("\n{}", "=".repeat(60));
    info!("▶️ 运行 {} - {}", run_id, scenario.display_name());
    info!("📄 共 {} 个步骤", scenario.steps.len());
    info!("{}", "=".repeat(60));
}

pub fn log_step_start(ctx: &StepCtx, step: &Step) {
    match &step.name {
        Some(name) => info!("{} ▶ {} ({})", ctx, step.action(), name),
        None => match step.kind.target() {
            Some(target) => info!("{} ▶ {} {}", ctx, step.action(), truncate_text(target, 60)),
            None => info!("{} ▶ {}", ctx, step.action()),
        },
    }
}

pub fn log_step_end(ctx: &StepCtx, outcome: &StepOutcome) {
    match outcome.status {
        StepStatus::Success => info!("{} ✓ 完成 ({}ms)", ctx, outcome.duration_ms),
        StepStatus::Failed => warn!(
            "{} ✗ 失败 ({}ms): {}",
            ctx,
            outcome.duration_ms,
            outcome.error.as_deref().unwrap_or("未知错误")
        ),
        StepStatus::Skipped => info!("{} ⏭️ 跳过", ctx),
    }
}

/// 记录运行完成
pub fn log_run_complete(result: &RunResult) {
    info!("\n{}", "─".repeat(60));
    match result.status {
        RunStatus::Completed => info!("✅ 运行 {} 完成", result.run_id),
        RunStatus::Failed => error!(
            "❌ 运行 {} 失败{}",
            result.run_id,
            result
                .error
                .as_deref()
                .map(|e| format!(": {}", e))
                .unwrap_or_default()
        ),
        RunStatus::Cancelled => warn!("⏹️ 运行 {} 已取消", result.run_id),
    }
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(result: &RunResult) {
    let skipped = result.steps.len() - result.succeeded_steps() - result.failed_steps();
    info!("\n{}", "=".repeat(60));
    info!("📊 运行统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", result.succeeded_steps(), result.steps.len());
    info!("❌ 失败: {}", result.failed_steps());
    info!("⏭️ 跳过: {}", skipped);
    info!("⏱️ 总耗时: {}ms", result.total_duration_ms);
    info!("{}", "=".repeat(60));
    if let Some(dir) = &result.artifact_dir {
        info!("\n产物已保存至: {}", dir);
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
