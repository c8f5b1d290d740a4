mod common;

use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{scenario, source, FakeDriver};
use scenario_runner::error::EngineError;
use scenario_runner::models::{
    event, AuthKey, AuthState, RunEvent, RunStatus, Scenario, StepStatus, UiMap, UiMapSet,
};
use scenario_runner::orchestrator::RunController;
use scenario_runner::services::{
    AuthStateStore, FileAuthStore, MemoryArtifactSink, MemoryAuthStore, SelectorResolver,
    VariableScope,
};
use scenario_runner::workflow::{CallStack, EngineContext, EngineSettings, NestedRunner};

fn settings() -> EngineSettings {
    EngineSettings {
        project_id: "shop".into(),
        default_timeout: Duration::from_millis(300),
        working_dir: PathBuf::from("/srv/app"),
        capture_every_step: false,
        type_delay: Duration::ZERO,
        auth_check_timeout: Duration::from_millis(200),
    }
}

fn engine(driver: &Arc<FakeDriver>, scenarios: Vec<Scenario>) -> EngineContext {
    EngineContext::new(driver.clone(), source(scenarios)).with_settings(settings())
}

async fn run(ctx: EngineContext, root: &Scenario) -> scenario_runner::RunResult {
    RunController::new(ctx).run(root).await
}

// ========== 变量与子场景 ==========

#[tokio::test]
async fn test_extracted_value_flows_into_later_steps() {
    let driver = Arc::new(
        FakeDriver::new()
            .with_element("#create", "新建订单")
            .with_element("#order-id", "  A-1001\n")
            .with_element("#result", "Order A-1001 found"),
    );
    let root = scenario(json!({
        "id": "order-search",
        "steps": [
            {"action": "goto", "url": "https://shop.test/orders"},
            {"action": "click", "target": "#create"},
            {"action": "extract", "target": "#order-id", "save_as": "oid"},
            {"action": "goto", "url": "https://shop.test/search?q={{oid}}"},
            {"action": "assert_text", "target": "#result", "value": "{{oid}}"}
        ]
    }));

    let result = run(engine(&driver, vec![]), &root).await;

    assert_eq!(result.status, RunStatus::Completed, "{:?}", result.error);
    assert!(driver
        .visited()
        .contains(&"https://shop.test/search?q=A-1001".to_string()));
    assert!(result.steps[2].logs.iter().any(|l| l.contains("oid = A-1001")));
    assert_eq!(result.steps[4].selector.as_deref(), Some("#result"));
}

#[tokio::test]
async fn test_sub_scenario_shares_variables_both_ways() {
    let driver = Arc::new(
        FakeDriver::new()
            .with_element("#user", "alice")
            .with_element("#name", "")
            .with_element("#order-id", "A-2002")
            .with_element("#q", ""),
    );
    let child = scenario(json!({
        "id": "make-order",
        "steps": [
            {"action": "fill", "target": "#name", "value": "{{user}}"},
            {"action": "extract", "target": "#order-id", "save_as": "oid"}
        ]
    }));
    let root = scenario(json!({
        "id": "main",
        "steps": [
            {"action": "extract", "target": "#user", "save_as": "user"},
            {"action": "run_scenario", "scenario_id": "make-order"},
            {"action": "fill", "target": "#q", "value": "{{oid}}"}
        ]
    }));

    let result = run(engine(&driver, vec![child]), &root).await;

    assert!(result.is_completed(), "{:?}", result.error);
    assert_eq!(driver.value_of("#name").as_deref(), Some("alice"));
    assert_eq!(driver.value_of("#q").as_deref(), Some("A-2002"));
    assert_eq!(result.steps[1].children.len(), 2);
}

#[tokio::test]
async fn test_undefined_variable_is_kept_literally() {
    let driver = Arc::new(FakeDriver::new().with_element("#q", ""));
    let root = scenario(json!({
        "id": "literal",
        "steps": [{"action": "fill", "target": "#q", "value": "{{nobody}}"}]
    }));

    let result = run(engine(&driver, vec![]), &root).await;

    assert!(result.is_completed());
    assert_eq!(driver.value_of("#q").as_deref(), Some("{{nobody}}"));
    assert!(result.steps[0].logs.iter().any(|l| l.contains("未定义")));
}

// ========== 失败策略 ==========

#[tokio::test]
async fn test_failure_policy_matrix() {
    // (continue_on_error, optional, 运行状态, 后续步骤状态)
    let cases = [
        (false, false, RunStatus::Failed, StepStatus::Skipped),
        (true, false, RunStatus::Failed, StepStatus::Success),
        (false, true, RunStatus::Completed, StepStatus::Skipped),
        (true, true, RunStatus::Completed, StepStatus::Success),
    ];

    for (continue_on_error, optional, run_status, next_status) in cases {
        let driver = Arc::new(FakeDriver::new().with_element("#next", ""));
        let root = scenario(json!({
            "id": "policy",
            "steps": [
                {
                    "action": "click",
                    "target": "#missing",
                    "timeout": 50,
                    "continue_on_error": continue_on_error,
                    "optional": optional
                },
                {"action": "click", "target": "#next"}
            ]
        }));

        let result = run(engine(&driver, vec![]), &root).await;

        let label = format!("coe={} optional={}", continue_on_error, optional);
        assert_eq!(result.status, run_status, "{}", label);
        assert_eq!(result.steps.len(), 2, "{}", label);
        assert_eq!(result.steps[0].status, StepStatus::Failed, "{}", label);
        assert_eq!(result.steps[1].status, next_status, "{}", label);
        assert_eq!(
            driver.count("click #next"),
            usize::from(next_status == StepStatus::Success),
            "{}",
            label
        );
    }
}

#[tokio::test]
async fn test_fatal_error_ignores_continue_on_error() {
    let driver = Arc::new(
        FakeDriver::new()
            .with_element("#delay", "soon")
            .with_element("#after", ""),
    );
    let root = scenario(json!({
        "id": "fatal",
        "steps": [
            {"action": "extract", "target": "#delay", "save_as": "delay"},
            {"action": "wait", "value": "{{delay}}", "continue_on_error": true, "optional": true},
            {"action": "click", "target": "#after"}
        ]
    }));

    let result = run(engine(&driver, vec![]), &root).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.error.as_deref().unwrap_or_default().contains("配置错误"));
    assert_eq!(result.steps[2].status, StepStatus::Skipped);
    assert_eq!(driver.count("click #after"), 0);
}

#[tokio::test]
async fn test_script_error_is_step_failure() {
    let driver = Arc::new(FakeDriver::new());
    let root = scenario(json!({
        "id": "js",
        "steps": [
            {"action": "run_js", "value": "throw new Error('boom')", "continue_on_error": true},
            {"action": "run_js", "value": "document.title"}
        ]
    }));

    let result = run(engine(&driver, vec![]), &root).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.steps[0].error.as_deref().unwrap_or_default().contains("脚本执行失败"));
    assert_eq!(result.steps[1].status, StepStatus::Success);
}

// ========== 选择器候选与超时 ==========

#[tokio::test]
async fn test_missing_element_fails_within_timeout() {
    let driver = Arc::new(FakeDriver::new());
    let root = scenario(json!({
        "id": "timeout",
        "steps": [{"action": "click", "target": "#never", "timeout": 100}]
    }));

    let started = Instant::now();
    let result = run(engine(&driver, vec![]), &root).await;
    let elapsed = started.elapsed();

    assert_eq!(result.status, RunStatus::Failed);
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(600), "耗时 {:?}", elapsed);
    let error = result.steps[0].error.clone().unwrap_or_default();
    assert!(error.contains("元素未找到"), "{}", error);
    assert!(error.contains("#never"), "{}", error);
}

fn login_map() -> UiMap {
    serde_json::from_value(json!({
        "id": "map-login",
        "name": "login",
        "elements": {
            "submit": {
                "primary": "#submit-v2",
                "fallbacks": ["#submit-old", "button.submit"]
            }
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn test_fallback_candidates_in_declared_order() {
    let driver = Arc::new(
        FakeDriver::new()
            .with_hidden_element("#submit-old")
            .with_element("button.submit", "登录"),
    );
    let root = scenario(json!({
        "id": "fallback",
        "steps": [{"action": "click", "target": "login.submit"}]
    }));
    let ctx = engine(&driver, vec![])
        .with_selectors(SelectorResolver::new(UiMapSet::from_iter([login_map()])));

    let result = run(ctx, &root).await;

    assert!(result.is_completed(), "{:?}", result.steps[0].error);
    assert_eq!(result.steps[0].selector.as_deref(), Some("button.submit"));
    assert_eq!(driver.calls(), vec!["click button.submit".to_string()]);
}

#[tokio::test]
async fn test_primary_wins_once_it_appears() {
    let driver = Arc::new(FakeDriver::new().with_delayed_element(
        "#submit-v2",
        "登录",
        Duration::from_millis(150),
    ));
    let root = scenario(json!({
        "id": "late",
        "ui_map_id": "map-login",
        "steps": [{"action": "click", "target": "submit", "timeout": 1000}]
    }));
    let ctx = engine(&driver, vec![]).with_selectors(
        SelectorResolver::new(UiMapSet::from_iter([login_map()])).with_default_map("login"),
    );

    let result = run(ctx, &root).await;

    assert!(result.is_completed(), "{:?}", result.steps[0].error);
    assert_eq!(result.steps[0].selector.as_deref(), Some("#submit-v2"));
}

// ========== 循环引用 ==========

#[tokio::test]
async fn test_cyclic_reference_fails_before_any_browser_action() {
    let driver = Arc::new(FakeDriver::new().with_element("#x", ""));
    let a = scenario(json!({
        "id": "a",
        "steps": [
            {"action": "click", "target": "#x"},
            {"action": "run_scenario", "scenario_id": "b"}
        ]
    }));
    let b = scenario(json!({
        "id": "b",
        "steps": [{"action": "run_scenario", "scenario_id": "a"}]
    }));

    let result = run(engine(&driver, vec![a.clone(), b]), &a).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.error.as_deref().unwrap_or_default().contains("a -> b -> a"));
    assert!(result.steps.iter().all(|s| s.status == StepStatus::Skipped));
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn test_nested_runner_rejects_scenario_on_call_stack() {
    let driver = Arc::new(FakeDriver::new());
    let a = scenario(json!({"id": "a", "steps": [{"action": "screenshot"}]}));
    let controller = RunController::new(engine(&driver, vec![a]));

    let stack = CallStack::root("a").push("b");
    let mut scope = VariableScope::new();
    let err = controller
        .run_nested("a", &mut scope, &stack, 2)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::CyclicScenarioReference { ref chain } if chain == &["a", "b", "a"]
    ));
    assert!(driver.calls().is_empty());
}

// ========== 认证 ==========

fn guarded_driver() -> Arc<FakeDriver> {
    Arc::new(
        FakeDriver::new()
            .with_auth_guard("https://app.test/dashboard", "https://app.test/login", "#login-btn")
            .with_element("#user", "")
            .with_element("#login-btn", "登录")
            .with_element("#avatar", "alice"),
    )
}

fn login_scenario() -> Scenario {
    scenario(json!({
        "id": "login",
        "steps": [
            {"action": "goto", "url": "https://app.test/login"},
            {"action": "fill", "target": "#user", "value": "alice"},
            {"action": "click", "target": "#login-btn"}
        ]
    }))
}

fn ensure_auth_scenario() -> Scenario {
    scenario(json!({
        "id": "dashboard",
        "steps": [{
            "action": "ensure_auth",
            "check_url": "https://app.test/dashboard",
            "login_scenario_id": "login",
            "state_name": "admin",
            "logged_in_selector": "#avatar"
        }]
    }))
}

#[tokio::test]
async fn test_ensure_auth_with_saved_state_skips_login() {
    let driver = guarded_driver();
    let store = Arc::new(MemoryAuthStore::new());
    let saved = AuthState {
        cookies: vec![json!({"name": "sid", "value": "s3cr3t"})],
        origins: Vec::new(),
    };
    store.put(&AuthKey::new("shop", "admin"), &saved).await.unwrap();

    let ctx = engine(&driver, vec![login_scenario()]).with_auth_store(store.clone());
    let result = run(ctx, &ensure_auth_scenario()).await;

    assert!(result.is_completed(), "{:?}", result.steps[0].error);
    assert_eq!(driver.count("click #login-btn"), 0);
    assert_eq!(driver.count("restore_session"), 1);
    assert_eq!(
        result.steps[0].selector.as_deref(),
        Some("ensure_auth:admin:restored")
    );
}

#[tokio::test]
async fn test_ensure_auth_logs_in_once_and_persists_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileAuthStore::new(dir.path()));

    let driver = guarded_driver();
    let ctx = engine(&driver, vec![login_scenario()]).with_auth_store(store.clone());
    let result = run(ctx, &ensure_auth_scenario()).await;

    assert!(result.is_completed(), "{:?}", result.steps[0].error);
    assert_eq!(driver.count("click #login-btn"), 1);
    assert_eq!(driver.count("goto https://app.test/dashboard"), 2);
    assert_eq!(result.steps[0].children.len(), 3);
    assert!(dir.path().join("shop").join("admin.json").exists());

    let saved = tokio_test::assert_ok!(store.get(&AuthKey::new("shop", "admin")).await);
    assert!(saved.is_some_and(|s| !s.cookies.is_empty()));

    // 新浏览器会话复用已保存的状态
    let fresh = guarded_driver();
    let ctx = engine(&fresh, vec![login_scenario()]).with_auth_store(store);
    let result = run(ctx, &ensure_auth_scenario()).await;

    assert!(result.is_completed());
    assert_eq!(fresh.count("click #login-btn"), 0);
    assert!(fresh.has_session());
}

#[tokio::test]
async fn test_ensure_auth_reports_login_failure() {
    let driver = guarded_driver();
    let broken_login = scenario(json!({
        "id": "login",
        "steps": [{"action": "click", "target": "#gone", "timeout": 50}]
    }));

    let result = run(engine(&driver, vec![broken_login]), &ensure_auth_scenario()).await;

    assert_eq!(result.status, RunStatus::Failed);
    let error = result.steps[0].error.clone().unwrap_or_default();
    assert!(error.contains("登录场景 login"), "{}", error);
    assert_eq!(result.steps[0].children.len(), 1);
}

#[tokio::test]
async fn test_ensure_auth_without_state_name_uses_default_state() {
    let store = Arc::new(MemoryAuthStore::new());
    let driver = guarded_driver();
    let root = scenario(json!({
        "id": "dashboard",
        "steps": [{
            "action": "ensure_auth",
            "check_url": "https://app.test/dashboard",
            "login_scenario_id": "login"
        }]
    }));

    let ctx = engine(&driver, vec![login_scenario()]).with_auth_store(store.clone());
    let result = run(ctx, &root).await;

    assert!(result.is_completed(), "{:?}", result.steps[0].error);
    assert_eq!(driver.count("click #login-btn"), 1);
    let saved = tokio_test::assert_ok!(store.get(&AuthKey::new("shop", "default")).await);
    assert!(saved.is_some());
    assert_eq!(
        result.steps[0].selector.as_deref(),
        Some("ensure_auth:default:logged_in")
    );
}

#[tokio::test]
async fn test_unusable_auth_store_key_follows_step_policy() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(FakeDriver::new().with_element("#next", ""));
    let root = scenario(json!({
        "id": "save",
        "steps": [
            {"action": "save_auth_state", "optional": true, "continue_on_error": true},
            {"action": "click", "target": "#next"}
        ]
    }));

    let mut broken = settings();
    broken.project_id = "team/shop".into();
    let ctx = EngineContext::new(driver.clone(), source(vec![]))
        .with_settings(broken)
        .with_auth_store(Arc::new(FileAuthStore::new(dir.path())));
    let result = run(ctx, &root).await;

    assert!(result.is_completed());
    assert_eq!(result.steps[0].status, StepStatus::Failed);
    assert_eq!(result.steps[1].status, StepStatus::Success);
    assert_eq!(driver.count("click #next"), 1);
}

#[tokio::test]
async fn test_save_and_load_auth_state_across_sessions() {
    let store = Arc::new(MemoryAuthStore::new());
    let driver = guarded_driver();
    let save = scenario(json!({
        "id": "save",
        "steps": [
            {"action": "click", "target": "#login-btn"},
            {"action": "save_auth_state", "state_name": "user"}
        ]
    }));
    let result = run(engine(&driver, vec![]).with_auth_store(store.clone()), &save).await;
    assert!(result.is_completed());

    let fresh = guarded_driver();
    let load = scenario(json!({
        "id": "load",
        "steps": [
            {"action": "load_auth_state", "state_name": "missing"},
            {"action": "load_auth_state", "state_name": "user"}
        ]
    }));
    let result = run(engine(&fresh, vec![]).with_auth_store(store), &load).await;

    assert!(result.is_completed());
    assert_eq!(fresh.count("restore_session"), 1);
    assert!(fresh.has_session());
}

// ========== 进度事件与取消 ==========

#[tokio::test]
async fn test_events_are_ordered_and_nested() {
    let driver = Arc::new(FakeDriver::new().with_element("#a", ""));
    let child = scenario(json!({
        "id": "child",
        "steps": [{"action": "click", "target": "#a"}]
    }));
    let root = scenario(json!({
        "id": "root",
        "steps": [
            {"action": "goto", "url": "https://shop.test"},
            {"action": "run_scenario", "scenario_id": "child"}
        ]
    }));

    let (tx, mut rx) = event::channel();
    let ctx = engine(&driver, vec![child]).with_events(Some(tx));
    let result = run(ctx, &root).await;
    assert!(result.is_completed());

    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        let label = match event {
            RunEvent::RunStarted { total_steps, .. } => format!("run_started:{}", total_steps),
            RunEvent::StepStarted { depth, index, .. } => format!("start:{}:{}", depth, index),
            RunEvent::StepEnded { depth, outcome, .. } => format!("end:{}:{}", depth, outcome.index),
            RunEvent::RunCompleted { .. } => "run_completed".to_string(),
            RunEvent::StepLog { .. } => continue,
        };
        seen.push(label);
    }

    assert_eq!(
        seen,
        vec![
            "run_started:2",
            "start:0:0",
            "end:0:0",
            "start:0:1",
            "start:1:0",
            "end:1:0",
            "end:0:1",
            "run_completed",
        ]
    );
}

#[tokio::test]
async fn test_cancellation_stops_run_and_skips_rest() {
    let driver = Arc::new(FakeDriver::new().with_element("#after", ""));
    let root = scenario(json!({
        "id": "slow",
        "steps": [
            {"action": "wait", "value": "5000"},
            {"action": "click", "target": "#after"}
        ]
    }));

    let ctx = engine(&driver, vec![]);
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let started = Instant::now();
    let result = run(ctx, &root).await;

    assert_eq!(result.status, RunStatus::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.steps[0].status, StepStatus::Failed);
    assert_eq!(result.steps[1].status, StepStatus::Skipped);
    assert_eq!(driver.count("click #after"), 0);
}

// ========== 产物 ==========

#[tokio::test]
async fn test_screenshots_and_network_per_step() {
    let driver = Arc::new(FakeDriver::new());
    let sink = Arc::new(MemoryArtifactSink::new());
    let root = scenario(json!({
        "id": "capture",
        "steps": [
            {"action": "goto", "url": "https://shop.test/"},
            {"action": "click", "target": "#nope", "timeout": 20, "optional": true, "continue_on_error": true},
            {"action": "screenshot"}
        ]
    }));

    let mut settings = settings();
    settings.capture_every_step = true;
    let ctx = engine(&driver, vec![])
        .with_settings(settings)
        .with_artifacts(sink.clone());
    let result = run(ctx, &root).await;

    assert!(result.is_completed());
    assert_eq!(
        sink.screenshot_names().await,
        vec!["001_goto.png", "002_click_error.png", "003_screenshot.png"]
    );
    assert_eq!(result.steps[0].network_requests.len(), 1);
    assert_eq!(result.steps[0].network_requests[0].url, "https://shop.test/");
    assert!(result.steps[1].network_requests.is_empty());
    assert_eq!(sink.results().await.len(), 1);
}

#[tokio::test]
async fn test_upload_and_paste_local_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("avatar.png"), [0x89, b'P', b'N', b'G']).unwrap();

    let driver = Arc::new(
        FakeDriver::new()
            .with_hidden_element("#file")
            .with_element("#editor", ""),
    );
    let root = scenario(json!({
        "id": "files",
        "steps": [
            {"action": "upload_file", "target": "#file", "file_path": "avatar.png"},
            {"action": "paste_image", "target": "#editor", "file_path": "avatar.png"},
            {"action": "upload_file", "target": "#file", "file_path": "missing.pdf"}
        ]
    }));

    let mut settings = settings();
    settings.working_dir = dir.path().to_path_buf();
    let result = run(engine(&driver, vec![]).with_settings(settings), &root).await;

    assert_eq!(result.steps[0].status, StepStatus::Success);
    assert_eq!(result.steps[1].status, StepStatus::Success);
    assert_eq!(result.steps[2].status, StepStatus::Failed);
    assert!(result.steps[2].error.as_deref().unwrap_or_default().contains("文件不存在"));
    assert_eq!(
        driver.calls(),
        vec!["set_input_files #file", "focus #editor", "evaluate"]
    );
}
