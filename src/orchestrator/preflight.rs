//! 执行前的静态检查
//!
//! 沿 run_scenario / ensure_auth 的引用做一次迭代深度优先遍历，
//! 在任何浏览器动作之前发现循环引用和不合法的子场景文档。

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::models::Scenario;
use crate::services::ScenarioSource;

struct Frame {
    id: String,
    refs: Vec<String>,
    next: usize,
}

impl Frame {
    fn of(scenario: &Scenario) -> Self {
        Self {
            id: scenario.id.clone(),
            refs: scenario
                .referenced_scenarios()
                .into_iter()
                .map(str::to_string)
                .collect(),
            next: 0,
        }
    }
}

/// 检查场景引用图
///
/// 引用的场景不存在只记录警告，留给执行期按步骤失败处理
pub async fn check_references(root: &Scenario, source: &dyn ScenarioSource) -> EngineResult<()> {
    let mut finished: HashSet<String> = HashSet::new();
    let mut frames = vec![Frame::of(root)];

    loop {
        let Some(frame) = frames.last_mut() else {
            break;
        };
        if frame.next >= frame.refs.len() {
            finished.insert(frame.id.clone());
            frames.pop();
            continue;
        }
        let next = frame.refs[frame.next].clone();
        frame.next += 1;

        if frames.iter().any(|f| f.id == next) {
            let mut chain: Vec<String> = frames.iter().map(|f| f.id.clone()).collect();
            chain.push(next);
            return Err(EngineError::CyclicScenarioReference { chain });
        }
        if finished.contains(&next) {
            continue;
        }

        match source.load(&next).await? {
            Some(scenario) => {
                debug!("预检: {} 引用 {}", scenario.id, scenario.referenced_scenarios().len());
                frames.push(Frame::of(&scenario));
            }
            None => {
                warn!("⚠️ 引用的场景 {} 不存在，执行到该步骤时会失败", next);
                finished.insert(next);
            }
        }
    }

    Ok(())
}
