//! 运行进度事件
//!
//! 引擎通过无界通道按顺序推送事件；第 n 步的事件全部发出后才会开始第 n+1 步。
//! 子场景的事件（depth > 0）夹在父步骤的 StepStarted 与 StepEnded 之间。

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::models::outcome::{RunResult, StepOutcome};
use crate::models::step::ActionKind;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        scenario_id: String,
        total_steps: usize,
    },
    StepStarted {
        scenario_id: String,
        depth: usize,
        index: usize,
        action: ActionKind,
        name: Option<String>,
    },
    StepLog {
        scenario_id: String,
        depth: usize,
        index: usize,
        line: String,
    },
    StepEnded {
        scenario_id: String,
        depth: usize,
        outcome: StepOutcome,
    },
    RunCompleted {
        result: RunResult,
    },
}

pub type EventSender = UnboundedSender<RunEvent>;
pub type EventReceiver = UnboundedReceiver<RunEvent>;

/// 创建事件通道
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
