//! 测试用的内存浏览器驱动

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use scenario_runner::error::{DriverError, DriverResult};
use scenario_runner::infrastructure::{BrowserDriver, ElementOp, ElementState};
use scenario_runner::models::{AuthState, NetworkRequest, Scenario, ScenarioDocument};
use scenario_runner::services::MemoryScenarioSource;

#[derive(Debug, Clone)]
struct FakeElement {
    visible: bool,
    text: String,
    /// 在此时刻之前视为未附加
    appears_at: Option<Instant>,
}

/// 受保护页面：没有 sid cookie 时访问会被重定向到登录页
#[derive(Debug, Clone)]
struct AuthGuard {
    protected_prefix: String,
    login_url: String,
    /// 点击该选择器后写入 sid cookie
    login_trigger: String,
}

#[derive(Debug, Default)]
struct FakeState {
    url: String,
    elements: HashMap<String, FakeElement>,
    values: HashMap<String, String>,
    cookies: Vec<JsonValue>,
    calls: Vec<String>,
    network: Vec<NetworkRequest>,
    guard: Option<AuthGuard>,
}

/// 内存浏览器
#[derive(Debug, Default)]
pub struct FakeDriver {
    state: Mutex<FakeState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(self, selector: &str, text: &str) -> Self {
        self.insert(selector, true, text, None);
        self
    }

    pub fn with_hidden_element(self, selector: &str) -> Self {
        self.insert(selector, false, "", None);
        self
    }

    /// 经过 delay 后才出现的元素
    pub fn with_delayed_element(self, selector: &str, text: &str, delay: Duration) -> Self {
        self.insert(selector, true, text, Some(Instant::now() + delay));
        self
    }

    pub fn with_auth_guard(self, protected_prefix: &str, login_url: &str, login_trigger: &str) -> Self {
        self.state.lock().unwrap().guard = Some(AuthGuard {
            protected_prefix: protected_prefix.to_string(),
            login_url: login_url.to_string(),
            login_trigger: login_trigger.to_string(),
        });
        self
    }

    fn insert(&self, selector: &str, visible: bool, text: &str, appears_at: Option<Instant>) {
        self.state.lock().unwrap().elements.insert(
            selector.to_string(),
            FakeElement {
                visible,
                text: text.to_string(),
                appears_at,
            },
        );
    }

    /// 已记录的调用，形如 `goto <url>` / `click <selector>`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn visited(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("goto ").map(str::to_string))
            .collect()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn value_of(&self, selector: &str) -> Option<String> {
        self.state.lock().unwrap().values.get(selector).cloned()
    }

    pub fn has_session(&self) -> bool {
        has_sid(&self.state.lock().unwrap().cookies)
    }
}

fn has_sid(cookies: &[JsonValue]) -> bool {
    cookies.iter().any(|c| c["name"] == "sid")
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("goto {}", url));

        let redirected = match &state.guard {
            Some(guard) if url.starts_with(&guard.protected_prefix) && !has_sid(&state.cookies) => {
                Some(guard.login_url.clone())
            }
            _ => None,
        };
        state.url = redirected.unwrap_or_else(|| url.to_string());
        state.network.push(NetworkRequest {
            url: url.to_string(),
            method: "GET".to_string(),
            status: Some(200),
            duration_ms: 1,
            response_size: 512,
            error: None,
        });
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn probe(&self, selector: &str) -> DriverResult<ElementState> {
        let state = self.state.lock().unwrap();
        Ok(match state.elements.get(selector) {
            None => ElementState::Missing,
            Some(el) if el.appears_at.is_some_and(|at| Instant::now() < at) => {
                ElementState::Missing
            }
            Some(el) if !el.visible => ElementState::Hidden,
            Some(_) => ElementState::Visible,
        })
    }

    async fn perform(&self, selector: &str, op: &ElementOp) -> DriverResult<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{} {}", op.name(), selector));

        let text = state
            .elements
            .get(selector)
            .map(|el| el.text.clone())
            .ok_or_else(|| DriverError::NoSuchElement(selector.to_string()))?;

        match op {
            ElementOp::ReadText => return Ok(Some(text)),
            ElementOp::Fill(value) | ElementOp::Select(value) => {
                state.values.insert(selector.to_string(), value.clone());
            }
            ElementOp::Type { text, .. } => {
                state.values.insert(selector.to_string(), text.clone());
            }
            ElementOp::Click => {
                let logs_in = state
                    .guard
                    .as_ref()
                    .is_some_and(|g| g.login_trigger == selector);
                if logs_in {
                    state.cookies.push(json!({"name": "sid", "value": "s3cr3t", "domain": "app.test"}));
                }
            }
            _ => {}
        }
        Ok(None)
    }

    async fn evaluate(&self, script: &str) -> DriverResult<JsonValue> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("evaluate".to_string());
        if script.contains("throw") {
            return Err(DriverError::Script("Error: boom".to_string()));
        }
        Ok(JsonValue::Null)
    }

    async fn screenshot(&self, _full_page: bool) -> DriverResult<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn snapshot_session(&self) -> DriverResult<AuthState> {
        let state = self.state.lock().unwrap();
        Ok(AuthState {
            cookies: state.cookies.clone(),
            origins: Vec::new(),
        })
    }

    async fn restore_session(&self, snapshot: &AuthState) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("restore_session".to_string());
        state.cookies = snapshot.cookies.clone();
        Ok(())
    }

    async fn take_network_requests(&self) -> Vec<NetworkRequest> {
        std::mem::take(&mut self.state.lock().unwrap().network)
    }

    async fn close(&self) -> DriverResult<()> {
        Ok(())
    }
}

/// 从 JSON 构造场景
pub fn scenario(value: JsonValue) -> Scenario {
    let doc: ScenarioDocument = serde_json::from_value(value).expect("场景 JSON 不合法");
    Scenario::from_document(doc).expect("场景校验失败")
}

pub fn source(scenarios: Vec<Scenario>) -> Arc<MemoryScenarioSource> {
    Arc::new(scenarios.into_iter().collect())
}
