//! 动作分发
//!
//! 把求值后的步骤交给驱动执行。定位与重试走 `locate`，
//! 子场景与登录走 `NestedRunner`，认证状态读写走 `AuthFlow`。

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use phf::phf_map;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::infrastructure::ElementOp;
use crate::services::VariableScope;
use crate::utils::logging::truncate_text;
use crate::workflow::auth_flow::AuthFlow;
use crate::workflow::locate::{locate, Expectation};
use crate::workflow::run_ctx::{CallStack, EngineContext, NestedRunner, StepTrace};
use crate::workflow::step_evaluator::{ResolvedOp, ResolvedStep};

/// 扩展名到图片 MIME 的映射，未列出的按 PNG 处理
static IMAGE_MIME: phf::Map<&'static str, &'static str> = phf_map! {
    "png" => "image/png",
    "jpg" => "image/jpeg",
    "jpeg" => "image/jpeg",
    "gif" => "image/gif",
    "webp" => "image/webp",
};

/// 在聚焦元素上派发携带图片的 paste 事件
const PASTE_JS: &str = r#"{
    const bytes = Uint8Array.from(atob(__DATA__), c => c.charCodeAt(0));
    const file = new File([bytes], __NAME__, { type: __MIME__ });
    const transfer = new DataTransfer();
    transfer.items.add(file);
    const target = document.activeElement || document.body;
    target.dispatchEvent(new ClipboardEvent("paste", {
        clipboardData: transfer,
        bubbles: true,
        cancelable: true,
    }));
    true;
}"#;

pub fn image_mime(path: &Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| IMAGE_MIME.get(ext.to_ascii_lowercase().as_str()).copied())
        .unwrap_or("image/png")
}

/// 动作分发器
pub struct ActionDispatcher<'a> {
    ctx: &'a EngineContext,
    runner: &'a dyn NestedRunner,
}

impl<'a> ActionDispatcher<'a> {
    pub fn new(ctx: &'a EngineContext, runner: &'a dyn NestedRunner) -> Self {
        Self { ctx, runner }
    }

    /// 执行一个求值后的步骤
    pub async fn dispatch(
        &self,
        step: &ResolvedStep,
        scope: &mut VariableScope,
        stack: &CallStack,
        depth: usize,
        trace: &mut StepTrace,
    ) -> EngineResult<()> {
        let driver = self.ctx.driver.as_ref();
        let timeout = step.timeout;

        match &step.op {
            ResolvedOp::Navigate { url } => {
                trace.log(format!("🌐 打开 {}", url));
                driver.goto(url).await?;
                trace.selector = Some(url.clone());
            }
            ResolvedOp::Element { candidates, op } => {
                let hit = locate(driver, candidates, Expectation::Perform(op), timeout).await?;
                trace.log(format!("{} → {}", op.name(), hit.selector));
                trace.selector = Some(hit.selector);
            }
            ResolvedOp::WaitVisible { candidates } => {
                let hit = locate(driver, candidates, Expectation::Visible, timeout).await?;
                trace.log(format!("元素可见: {}", hit.selector));
                trace.selector = Some(hit.selector);
            }
            ResolvedOp::AssertText {
                candidates,
                expected,
            } => {
                let hit = locate(
                    driver,
                    candidates,
                    Expectation::TextContains(expected),
                    timeout,
                )
                .await?;
                trace.log(format!("✓ {} 包含 '{}'", hit.selector, expected));
                trace.selector = Some(hit.selector);
            }
            ResolvedOp::Extract {
                candidates,
                save_as,
            } => {
                let hit = locate(
                    driver,
                    candidates,
                    Expectation::Perform(&ElementOp::ReadText),
                    timeout,
                )
                .await?;
                let text = hit.output.unwrap_or_default().trim().to_string();
                trace.log(format!("{} = {}", save_as, truncate_text(&text, 80)));
                scope.set(save_as.clone(), text);
                trace.selector = Some(hit.selector);
            }
            ResolvedOp::Sleep(duration) => {
                trace.log(format!("等待 {}ms", duration.as_millis()));
                tokio::time::sleep(*duration).await;
            }
            ResolvedOp::Script(source) => {
                let value = driver
                    .evaluate(source)
                    .await
                    .map_err(EngineError::from_script)?;
                if !value.is_null() {
                    trace.log(format!("脚本返回: {}", truncate_text(&value.to_string(), 200)));
                }
            }
            ResolvedOp::Screenshot => {
                let png = driver.screenshot(false).await?;
                let name = format!("{}.png", trace.artifact_stem);
                let stored = self.ctx.artifacts.store_screenshot(&name, &png).await?;
                trace.log(format!("📸 截图已保存: {}", stored));
                trace.screenshot = Some(stored);
            }
            ResolvedOp::Upload { candidates, path } => {
                ensure_file(path).await?;
                let op = ElementOp::SetInputFiles(path.clone());
                let hit = locate(driver, candidates, Expectation::Perform(&op), timeout).await?;
                trace.log(format!("📎 已上传 {} → {}", path.display(), hit.selector));
                trace.selector = Some(hit.selector);
            }
            ResolvedOp::PasteImage { candidates, path } => {
                self.paste_image(candidates, path, timeout, trace).await?;
            }
            ResolvedOp::RunScenario { scenario_id } => {
                info!("↪️ 进入子场景: {}", scenario_id);
                trace.selector = Some(scenario_id.clone());
                let report = self
                    .runner
                    .run_nested(scenario_id, scope, stack, depth)
                    .await?;
                report.settle(scenario_id, trace)?;
            }
            ResolvedOp::SaveAuthState { state_name } => {
                AuthFlow::new(self.ctx).save(state_name, trace).await?;
            }
            ResolvedOp::LoadAuthState { state_name } => {
                AuthFlow::new(self.ctx).load(state_name, trace).await?;
            }
            ResolvedOp::EnsureAuth(spec) => {
                AuthFlow::new(self.ctx)
                    .ensure(spec, timeout, scope, stack, depth, self.runner, trace)
                    .await?;
            }
        }

        Ok(())
    }

    async fn paste_image(
        &self,
        candidates: &[String],
        path: &Path,
        timeout: Duration,
        trace: &mut StepTrace,
    ) -> EngineResult<()> {
        let bytes = fs::read(path)
            .await
            .map_err(|e| EngineError::resource(path.display().to_string(), e))?;
        let mime = image_mime(path);
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image.png");

        let hit = locate(
            self.ctx.driver.as_ref(),
            candidates,
            Expectation::Perform(&ElementOp::Focus),
            timeout,
        )
        .await?;

        let script = PASTE_JS
            .replace("__DATA__", &serde_json::to_string(&BASE64.encode(&bytes))?)
            .replace("__NAME__", &serde_json::to_string(file_name)?)
            .replace("__MIME__", &serde_json::to_string(mime)?);
        self.ctx
            .driver
            .evaluate(&script)
            .await
            .map_err(EngineError::from_script)?;

        trace.log(format!(
            "🖼️ 已粘贴 {} ({}, {} 字节) → {}",
            file_name,
            mime,
            bytes.len(),
            hit.selector
        ));
        trace.selector = Some(hit.selector);
        Ok(())
    }
}

async fn ensure_file(path: &Path) -> EngineResult<()> {
    if fs::try_exists(path).await.unwrap_or(false) {
        Ok(())
    } else {
        Err(EngineError::resource(
            path.display().to_string(),
            "文件不存在",
        ))
    }
}
