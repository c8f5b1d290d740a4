//! Chromium 驱动 - 基础设施层
//!
//! 持有唯一的 page 资源，通过 CDP 实现 `BrowserDriver`。
//! 元素状态判断、填值、勾选等通过注入 JS 完成；点击、输入、按键走真实输入事件。

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Element, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::{DriverError, DriverResult};
use crate::infrastructure::driver::{BrowserDriver, ElementOp, ElementState};
use crate::models::{AuthState, NetworkRequest, OriginStorage, StorageEntry};

const PROBE_JS: &str = r#"(sel) => {
    const el = document.querySelector(sel);
    if (!el) return "missing";
    const r = el.getBoundingClientRect();
    const s = window.getComputedStyle(el);
    const visible = r.width > 0 && r.height > 0 && s.visibility !== "hidden" && s.display !== "none";
    return visible ? "visible" : "hidden";
}"#;

const FILL_JS: &str = r#"(sel, value) => {
    const el = document.querySelector(sel);
    if (!el) return false;
    el.focus();
    el.value = value;
    el.dispatchEvent(new Event("input", { bubbles: true }));
    el.dispatchEvent(new Event("change", { bubbles: true }));
    return true;
}"#;

const CLEAR_JS: &str = r#"(sel) => {
    const el = document.querySelector(sel);
    if (!el) return false;
    el.value = "";
    el.dispatchEvent(new Event("input", { bubbles: true }));
    return true;
}"#;

const SELECT_JS: &str = r#"(sel, value) => {
    const el = document.querySelector(sel);
    if (!el) return "missing";
    const option = Array.from(el.options || []).find(o => o.value === value || o.label === value || o.text === value);
    if (!option) return "no_option";
    el.value = option.value;
    el.dispatchEvent(new Event("input", { bubbles: true }));
    el.dispatchEvent(new Event("change", { bubbles: true }));
    return "ok";
}"#;

const SET_CHECKED_JS: &str = r#"(sel, checked) => {
    const el = document.querySelector(sel);
    if (!el) return false;
    if (el.checked !== checked) el.click();
    return true;
}"#;

const DBLCLICK_JS: &str = r#"(sel) => {
    const el = document.querySelector(sel);
    if (!el) return false;
    el.scrollIntoView({ block: "center" });
    const opts = { bubbles: true, cancelable: true, view: window, detail: 2 };
    el.dispatchEvent(new MouseEvent("mousedown", opts));
    el.dispatchEvent(new MouseEvent("mouseup", opts));
    el.dispatchEvent(new MouseEvent("click", opts));
    el.dispatchEvent(new MouseEvent("dblclick", opts));
    return true;
}"#;

const READ_TEXT_JS: &str = r#"(sel) => {
    const el = document.querySelector(sel);
    if (!el) return null;
    return el.innerText ?? el.textContent ?? "";
}"#;

const SNAPSHOT_STORAGE_JS: &str = r#"() => {
    const dump = (store) => {
        const out = [];
        for (let i = 0; i < store.length; i++) {
            const name = store.key(i);
            out.push({ name, value: store.getItem(name) });
        }
        return out;
    };
    return { origin: location.origin, localStorage: dump(localStorage), sessionStorage: dump(sessionStorage) };
}"#;

/// 一个尚未完成的请求
struct PendingRequest {
    url: String,
    method: String,
    status: Option<u16>,
    started: Instant,
}

#[derive(Default)]
struct NetworkLog {
    pending: HashMap<String, PendingRequest>,
    finished: Vec<NetworkRequest>,
}

impl NetworkLog {
    fn complete(&mut self, request_id: &str, response_size: u64, error: Option<String>) {
        if let Some(req) = self.pending.remove(request_id) {
            self.finished.push(NetworkRequest {
                url: req.url,
                method: req.method,
                status: req.status,
                duration_ms: req.started.elapsed().as_millis() as u64,
                response_size,
                error,
            });
        }
    }
}

/// Chromium 驱动
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 后台监听网络事件并按请求汇总
/// - 不认识 Step / Scenario
pub struct ChromiumDriver {
    page: Page,
    network: Arc<Mutex<NetworkLog>>,
    listeners: Vec<JoinHandle<()>>,
}

impl ChromiumDriver {
    /// 接管页面并开始捕获网络请求
    pub async fn attach(page: Page) -> DriverResult<Self> {
        page.execute(EnableParams::default()).await?;

        let network = Arc::new(Mutex::new(NetworkLog::default()));
        let mut listeners = Vec::new();

        let mut sent = page.event_listener::<EventRequestWillBeSent>().await?;
        let log = network.clone();
        listeners.push(tokio::spawn(async move {
            while let Some(event) = sent.next().await {
                log.lock().await.pending.insert(
                    event.request_id.inner().clone(),
                    PendingRequest {
                        url: event.request.url.clone(),
                        method: event.request.method.clone(),
                        status: None,
                        started: Instant::now(),
                    },
                );
            }
        }));

        let mut responses = page.event_listener::<EventResponseReceived>().await?;
        let log = network.clone();
        listeners.push(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                if let Some(req) = log.lock().await.pending.get_mut(event.request_id.inner()) {
                    req.status = u16::try_from(event.response.status).ok();
                }
            }
        }));

        let mut finished = page.event_listener::<EventLoadingFinished>().await?;
        let log = network.clone();
        listeners.push(tokio::spawn(async move {
            while let Some(event) = finished.next().await {
                log.lock().await.complete(
                    event.request_id.inner(),
                    event.encoded_data_length.max(0.0) as u64,
                    None,
                );
            }
        }));

        let mut failed = page.event_listener::<EventLoadingFailed>().await?;
        let log = network.clone();
        listeners.push(tokio::spawn(async move {
            while let Some(event) = failed.next().await {
                log.lock()
                    .await
                    .complete(event.request_id.inner(), 0, Some(event.error_text.clone()));
            }
        }));

        debug!("Chromium 驱动已接管页面，网络监听已启动");
        Ok(Self {
            page,
            network,
            listeners,
        })
    }

    /// 获取 page 的引用
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 以 `void 0, (fn)(args...)` 形式调用 JS 函数，参数经 JSON 编码
    ///
    /// 前缀让表达式不以括号开头，避免被当成函数声明走 callFunctionOn
    async fn call<T: DeserializeOwned>(&self, function: &str, args: &[JsonValue]) -> DriverResult<T> {
        let encoded = args
            .iter()
            .map(|a| serde_json::to_string(a))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DriverError::Script(e.to_string()))?;
        let script = format!("void 0, ({})({})", function, encoded.join(", "));
        let value = self.evaluate(&script).await?;
        serde_json::from_value(value).map_err(|e| DriverError::Script(e.to_string()))
    }

    async fn element(&self, selector: &str) -> DriverResult<Element> {
        self.page
            .find_element(selector)
            .await
            .map_err(|_| DriverError::NoSuchElement(selector.to_string()))
    }

    /// JS 返回 false 说明元素在两次调用之间消失了
    fn ensure_found(found: bool, selector: &str) -> DriverResult<()> {
        if found {
            Ok(())
        } else {
            Err(DriverError::NoSuchElement(selector.to_string()))
        }
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| DriverError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn probe(&self, selector: &str) -> DriverResult<ElementState> {
        let state: String = self.call(PROBE_JS, &[selector.into()]).await?;
        Ok(match state.as_str() {
            "visible" => ElementState::Visible,
            "hidden" => ElementState::Hidden,
            _ => ElementState::Missing,
        })
    }

    async fn perform(&self, selector: &str, op: &ElementOp) -> DriverResult<Option<String>> {
        match op {
            ElementOp::Click => {
                let el = self.element(selector).await?;
                el.scroll_into_view().await?;
                el.click().await?;
            }
            ElementOp::DoubleClick => {
                let found: bool = self.call(DBLCLICK_JS, &[selector.into()]).await?;
                Self::ensure_found(found, selector)?;
            }
            ElementOp::Hover => {
                self.element(selector).await?.hover().await?;
            }
            ElementOp::Focus => {
                self.element(selector).await?.focus().await?;
            }
            ElementOp::ScrollIntoView => {
                self.element(selector).await?.scroll_into_view().await?;
            }
            ElementOp::Check | ElementOp::Uncheck => {
                let checked = matches!(op, ElementOp::Check);
                let found: bool = self
                    .call(SET_CHECKED_JS, &[selector.into(), checked.into()])
                    .await?;
                Self::ensure_found(found, selector)?;
            }
            ElementOp::Fill(value) => {
                let found: bool = self
                    .call(FILL_JS, &[selector.into(), value.as_str().into()])
                    .await?;
                Self::ensure_found(found, selector)?;
            }
            ElementOp::Type { text, delay } => {
                let found: bool = self.call(CLEAR_JS, &[selector.into()]).await?;
                Self::ensure_found(found, selector)?;
                let el = self.element(selector).await?;
                el.focus().await?;
                for ch in text.chars() {
                    el.type_str(ch.to_string()).await?;
                    sleep(*delay).await;
                }
            }
            ElementOp::Select(value) => {
                let result: String = self
                    .call(SELECT_JS, &[selector.into(), value.as_str().into()])
                    .await?;
                match result.as_str() {
                    "ok" => {}
                    "no_option" => {
                        return Err(DriverError::Script(format!(
                            "{} 中没有选项 '{}'",
                            selector, value
                        )))
                    }
                    _ => return Err(DriverError::NoSuchElement(selector.to_string())),
                }
            }
            ElementOp::Press(key) => {
                let el = self.element(selector).await?;
                el.focus().await?;
                el.press_key(key).await?;
            }
            ElementOp::ReadText => {
                let text: Option<String> = self.call(READ_TEXT_JS, &[selector.into()]).await?;
                return match text {
                    Some(text) => Ok(Some(text)),
                    None => Err(DriverError::NoSuchElement(selector.to_string())),
                };
            }
            ElementOp::SetInputFiles(path) => {
                let el = self.element(selector).await?;
                let mut params = SetFileInputFilesParams::new(vec![path.to_string_lossy().to_string()]);
                params.backend_node_id = Some(el.backend_node_id.clone());
                self.page.execute(params).await?;
            }
        }
        Ok(None)
    }

    async fn evaluate(&self, script: &str) -> DriverResult<JsonValue> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(JsonValue::Null))
    }

    async fn screenshot(&self, full_page: bool) -> DriverResult<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();
        Ok(self.page.screenshot(params).await?)
    }

    async fn snapshot_session(&self) -> DriverResult<AuthState> {
        let cookies = self
            .page
            .get_cookies()
            .await?
            .into_iter()
            .filter_map(|c| serde_json::to_value(c).ok())
            .collect();

        // about:blank 等页面没有可用的 storage
        let origins = match self.call::<OriginStorage>(SNAPSHOT_STORAGE_JS, &[]).await {
            Ok(origin) if origin.origin.starts_with("http") => vec![origin],
            Ok(_) => Vec::new(),
            Err(e) => {
                debug!("读取 storage 失败，仅保存 cookie: {}", e);
                Vec::new()
            }
        };

        Ok(AuthState { cookies, origins })
    }

    async fn restore_session(&self, state: &AuthState) -> DriverResult<()> {
        let mut params = Vec::with_capacity(state.cookies.len());
        for cookie in &state.cookies {
            let mut cookie = cookie.clone();
            // 会话 cookie 的 expires 为 -1，写回时去掉
            if let Some(obj) = cookie.as_object_mut() {
                if obj.get("expires").and_then(|v| v.as_f64()).is_some_and(|e| e < 0.0) {
                    obj.remove("expires");
                }
            }
            match serde_json::from_value::<CookieParam>(cookie) {
                Ok(param) => params.push(param),
                Err(e) => warn!("跳过无法还原的 cookie: {}", e),
            }
        }
        if !params.is_empty() {
            self.page.set_cookies(params).await?;
        }

        let current = self.current_url().await.unwrap_or_default();
        for origin in &state.origins {
            if !current.starts_with(&origin.origin) {
                continue;
            }
            for StorageEntry { name, value } in &origin.local_storage {
                let script = format!(
                    "localStorage.setItem({}, {})",
                    serde_json::to_string(name).map_err(|e| DriverError::Script(e.to_string()))?,
                    serde_json::to_string(value).map_err(|e| DriverError::Script(e.to_string()))?
                );
                self.evaluate(&script).await?;
            }
        }
        Ok(())
    }

    async fn take_network_requests(&self) -> Vec<NetworkRequest> {
        std::mem::take(&mut self.network.lock().await.finished)
    }

    async fn close(&self) -> DriverResult<()> {
        for listener in &self.listeners {
            listener.abort();
        }
        self.page.clone().close().await?;
        Ok(())
    }
}
