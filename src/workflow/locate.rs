//! 候选选择器定位
//!
//! 每轮按顺序尝试全部候选，第一个满足要求的胜出；整轮失败后等待一个轮询间隔再来，
//! 直到步骤超时。超时后报告全部候选及各自最后一次失败原因。

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::error::{EngineError, EngineResult};
use crate::infrastructure::{BrowserDriver, ElementOp, ElementState};
use crate::models::ActionKind;

/// 两轮尝试之间的间隔
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 对候选元素的要求
#[derive(Debug, Clone, Copy)]
pub enum Expectation<'a> {
    /// 已附加且可见
    Visible,
    /// 元素就绪后执行操作
    Perform(&'a ElementOp),
    /// 文本包含给定子串
    TextContains(&'a str),
}

/// 定位结果
#[derive(Debug, Clone)]
pub struct Located {
    /// 实际生效的候选
    pub selector: String,
    /// 操作返回值（ReadText / TextContains 时为文本）
    pub output: Option<String>,
}

enum Attempt {
    Done(Option<String>),
    TextMismatch(String),
    NotReady(String),
}

/// 在超时内定位第一个满足要求的候选
pub async fn locate(
    driver: &dyn BrowserDriver,
    candidates: &[String],
    expectation: Expectation<'_>,
    timeout: Duration,
) -> EngineResult<Located> {
    let deadline = Instant::now() + timeout;
    let mut last_mismatch: Option<(String, String)> = None;

    loop {
        let mut reasons = Vec::with_capacity(candidates.len());
        for selector in candidates {
            match attempt(driver, selector, expectation).await {
                Attempt::Done(output) => {
                    return Ok(Located {
                        selector: selector.clone(),
                        output,
                    })
                }
                Attempt::TextMismatch(actual) => {
                    reasons.push(format!("{}: 文本不匹配", selector));
                    last_mismatch = Some((selector.clone(), actual));
                }
                Attempt::NotReady(reason) => reasons.push(format!("{}: {}", selector, reason)),
            }
        }

        let now = Instant::now();
        if now >= deadline {
            if let (Expectation::TextContains(expected), Some((selector, actual))) =
                (expectation, last_mismatch)
            {
                return Err(EngineError::AssertionFailure {
                    selector,
                    expected: expected.to_string(),
                    actual,
                });
            }
            return Err(EngineError::ElementNotFound {
                candidates: candidates.to_vec(),
                detail: reasons.join("; "),
            });
        }

        sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
}

async fn attempt(driver: &dyn BrowserDriver, selector: &str, expectation: Expectation<'_>) -> Attempt {
    let state = match driver.probe(selector).await {
        Ok(state) => state,
        Err(e) => return Attempt::NotReady(e.to_string()),
    };

    match (state, expectation) {
        (ElementState::Missing, _) => Attempt::NotReady("未附加".to_string()),
        (ElementState::Hidden, Expectation::Visible) => Attempt::NotReady("不可见".to_string()),
        (ElementState::Visible, Expectation::Visible) => Attempt::Done(None),
        (ElementState::Hidden, Expectation::Perform(op)) if op.needs_visible() => {
            Attempt::NotReady("不可见".to_string())
        }
        (_, Expectation::Perform(op)) => match driver.perform(selector, op).await {
            Ok(output) => Attempt::Done(output),
            Err(e) => Attempt::NotReady(format!("{} 失败: {}", op.name(), e)),
        },
        (_, Expectation::TextContains(expected)) => {
            match driver.perform(selector, &ElementOp::ReadText).await {
                Ok(text) => {
                    let text = text.unwrap_or_default();
                    if text.contains(expected) {
                        Attempt::Done(Some(text))
                    } else {
                        Attempt::TextMismatch(text)
                    }
                }
                Err(e) => Attempt::NotReady(e.to_string()),
            }
        }
    }
}

/// 给单次浏览器调用加上超时
pub async fn bounded<T, F>(action: ActionKind, timeout: Duration, work: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    match tokio::time::timeout(timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::ActionTimeout {
            action: action.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
