//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **准备**：加载场景、预检引用、加载 UI Map（不需要浏览器）
//! 2. **初始化**：启动或连接浏览器、创建 ChromiumDriver
//! 3. **执行**：组装 EngineContext，交给 RunController
//! 4. **清理**：无论运行结果如何都释放页面和浏览器

use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::browser::{self, BrowserSession};
use crate::config::Config;
use crate::infrastructure::{BrowserDriver, ChromiumDriver};
use crate::models::{check_key_segment, load_ui_maps, EventSender, RunResult, Scenario};
use crate::orchestrator::preflight;
use crate::orchestrator::run_controller::{new_run_id, RunController};
use crate::services::{
    DirArtifactSink, FileAuthStore, FileResourceResolver, FileScenarioSource, ScenarioSource,
    SelectorResolver,
};
use crate::utils::logging;
use crate::workflow::{EngineContext, EngineSettings};

/// 一次运行请求
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub scenario_id: String,
    /// 设置后在场景最前面插入一步 goto
    pub base_url: Option<String>,
}

/// 已通过校验、可以执行的运行
pub struct PreparedRun {
    pub scenario: Scenario,
    pub project_id: String,
    source: Arc<FileScenarioSource>,
    selectors: SelectorResolver,
}

/// 加载场景并做静态检查，不启动浏览器
pub async fn prepare(config: &Config, request: &RunRequest) -> Result<PreparedRun> {
    let source = Arc::new(FileScenarioSource::new(config.scenarios_dir()));
    let scenario = source
        .load(&request.scenario_id)
        .await?
        .ok_or_else(|| anyhow!("场景不存在: {}", request.scenario_id))?;

    preflight::check_references(&scenario, source.as_ref()).await?;

    let scenario = match &request.base_url {
        Some(url) => scenario.with_base_url(url),
        None => scenario,
    };

    let project_id = scenario
        .project_id
        .clone()
        .unwrap_or_else(|| config.project_id.clone());
    check_key_segment("project_id", &project_id).map_err(|msg| anyhow!(msg))?;

    let ui_maps = load_ui_maps(&config.ui_maps_dir(), Some(&project_id)).await?;
    info!("🗺️ 已加载 {} 个 UI Map", ui_maps.len());

    let mut selectors = SelectorResolver::new(ui_maps);
    if let Some(map_id) = &scenario.ui_map_id {
        let default_map = selectors.ui_maps().find_by_id(map_id).map(|m| m.name.clone());
        match default_map {
            Some(name) => selectors = selectors.with_default_map(name),
            None => warn!("⚠️ 场景绑定的 UI Map {} 不存在", map_id),
        }
    }

    Ok(PreparedRun {
        scenario,
        project_id,
        source,
        selectors,
    })
}

/// 应用主结构
pub struct App {
    config: Config,
    session: BrowserSession,
    driver: Arc<ChromiumDriver>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::log_startup(&config);

        let session = browser::open_session(&config).await?;
        let page = match session.new_page().await {
            Ok(page) => page,
            Err(e) => {
                session.close().await?;
                return Err(e);
            }
        };

        let driver = match ChromiumDriver::attach(page).await {
            Ok(driver) => Arc::new(driver),
            Err(e) => {
                session.close().await?;
                return Err(e.into());
            }
        };

        Ok(Self {
            config,
            session,
            driver,
        })
    }

    /// 执行一次准备好的运行
    pub async fn run(
        &self,
        prepared: PreparedRun,
        events: Option<EventSender>,
        cancel: CancellationToken,
    ) -> Result<RunResult> {
        let run_id = new_run_id();
        let artifacts =
            DirArtifactSink::create(Path::new(&self.config.artifacts_dir), &run_id).await?;
        info!("📂 产物目录: {}", artifacts.dir().display());

        let settings = EngineSettings::from_config(&self.config, &prepared.project_id)?;
        let driver: Arc<dyn BrowserDriver> = self.driver.clone();

        let ctx = EngineContext::new(driver, prepared.source)
            .with_selectors(prepared.selectors)
            .with_auth_store(Arc::new(FileAuthStore::new(self.config.auth_states_dir())))
            .with_resources(Arc::new(FileResourceResolver::new(
                self.config.resources_dir(),
            )))
            .with_artifacts(Arc::new(artifacts))
            .with_settings(settings)
            .with_events(events)
            .with_cancel(cancel);

        let controller = RunController::new(ctx);
        Ok(controller.run_with_id(&prepared.scenario, run_id).await)
    }

    /// 释放页面与浏览器
    pub async fn shutdown(self) -> Result<()> {
        if let Err(e) = self.driver.close().await {
            warn!("⚠️ 关闭页面失败: {}", e);
        }
        self.session.close().await
    }

    /// 校验 → 启动浏览器 → 执行 → 释放浏览器
    pub async fn run_once(
        config: Config,
        request: RunRequest,
        events: Option<EventSender>,
        cancel: CancellationToken,
    ) -> Result<RunResult> {
        let prepared = prepare(&config, &request).await?;
        let app = App::initialize(config).await?;
        let outcome = app.run(prepared, events, cancel).await;
        let closed = app.shutdown().await;

        let result = outcome?;
        if let Err(e) = closed {
            warn!("⚠️ 浏览器清理失败: {}", e);
        }
        Ok(result)
    }
}
