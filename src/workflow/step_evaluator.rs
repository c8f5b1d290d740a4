//! 步骤求值
//!
//! 在执行前把步骤变成"可直接执行"的形态：
//! 替换 `{{var}}`、解析选择器候选、补全相对 URL 和文件路径、确定超时。

use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::EngineResult;
use crate::infrastructure::ElementOp;
use crate::models::{parse_wait_millis, ActionKind, Gesture, Step, StepKind};
use crate::services::{parse_resource_ref, VariableScope};
use crate::workflow::run_ctx::EngineContext;

/// 原样导航、不做本地路径解析的 URL 前缀
const ABSOLUTE_URL_PREFIXES: [&str; 5] = ["http://", "https://", "file://", "about:", "data:"];

/// 求值后的步骤
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    pub action: ActionKind,
    pub timeout: Duration,
    pub op: ResolvedOp,
    /// 出现但未定义的变量名
    pub undefined: Vec<String>,
}

impl ResolvedStep {
    /// 复合步骤自己管理内部超时，不套外层时限
    pub fn is_composite(&self) -> bool {
        matches!(
            self.op,
            ResolvedOp::Sleep(_) | ResolvedOp::RunScenario { .. } | ResolvedOp::EnsureAuth(_)
        )
    }
}

/// 可直接执行的操作
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedOp {
    Navigate { url: String },
    Element { candidates: Vec<String>, op: ElementOp },
    WaitVisible { candidates: Vec<String> },
    AssertText { candidates: Vec<String>, expected: String },
    Extract { candidates: Vec<String>, save_as: String },
    Sleep(Duration),
    Script(String),
    Screenshot,
    Upload { candidates: Vec<String>, path: PathBuf },
    PasteImage { candidates: Vec<String>, path: PathBuf },
    RunScenario { scenario_id: String },
    SaveAuthState { state_name: String },
    LoadAuthState { state_name: String },
    EnsureAuth(ResolvedEnsureAuth),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEnsureAuth {
    pub check_url: String,
    pub login_scenario_id: String,
    pub state_name: String,
    /// 已登录标记的候选；None 表示只看 URL
    pub logged_in: Option<Vec<String>>,
    pub login_url_pattern: String,
}

/// 步骤求值器
pub struct StepEvaluator<'a> {
    ctx: &'a EngineContext,
}

impl<'a> StepEvaluator<'a> {
    pub fn new(ctx: &'a EngineContext) -> Self {
        Self { ctx }
    }

    /// 按当前变量作用域求值步骤
    pub async fn evaluate(&self, step: &Step, scope: &VariableScope) -> EngineResult<ResolvedStep> {
        let mut subst = Substitution::new(scope);
        let settings = &self.ctx.settings;

        let op = match &step.kind {
            StepKind::Goto { url } => ResolvedOp::Navigate {
                url: self.url(&subst.apply(url)),
            },
            StepKind::Interact { gesture, target } => ResolvedOp::Element {
                candidates: self.candidates(&mut subst, target),
                op: gesture_op(*gesture),
            },
            StepKind::Fill { target, value } => ResolvedOp::Element {
                candidates: self.candidates(&mut subst, target),
                op: ElementOp::Fill(subst.apply(value)),
            },
            StepKind::Type { target, value } => ResolvedOp::Element {
                candidates: self.candidates(&mut subst, target),
                op: ElementOp::Type {
                    text: subst.apply(value),
                    delay: settings.type_delay,
                },
            },
            StepKind::Select { target, value } => ResolvedOp::Element {
                candidates: self.candidates(&mut subst, target),
                op: ElementOp::Select(subst.apply(value)),
            },
            StepKind::Press { target, key } => ResolvedOp::Element {
                candidates: self.candidates(&mut subst, target),
                op: ElementOp::Press(subst.apply(key)),
            },
            StepKind::WaitFor { target } => ResolvedOp::WaitVisible {
                candidates: self.candidates(&mut subst, target),
            },
            StepKind::AssertText { target, value } => ResolvedOp::AssertText {
                candidates: self.candidates(&mut subst, target),
                expected: subst.apply(value),
            },
            StepKind::Wait { value } => ResolvedOp::Sleep(parse_wait_millis(&subst.apply(value))?),
            // 脚本原样执行
            StepKind::RunJs { script } => ResolvedOp::Script(script.clone()),
            StepKind::Screenshot => ResolvedOp::Screenshot,
            StepKind::Extract { target, save_as } => ResolvedOp::Extract {
                candidates: self.candidates(&mut subst, target),
                save_as: save_as.clone(),
            },
            StepKind::UploadFile { target, file_path } => ResolvedOp::Upload {
                candidates: self.candidates(&mut subst, target),
                path: self.file_path(&mut subst, file_path).await?,
            },
            StepKind::PasteImage { target, file_path } => ResolvedOp::PasteImage {
                candidates: self.candidates(&mut subst, target),
                path: self.file_path(&mut subst, file_path).await?,
            },
            StepKind::RunScenario { scenario_id } => ResolvedOp::RunScenario {
                scenario_id: scenario_id.clone(),
            },
            StepKind::SaveAuthState { state_name } => ResolvedOp::SaveAuthState {
                state_name: state_name.clone(),
            },
            StepKind::LoadAuthState { state_name } => ResolvedOp::LoadAuthState {
                state_name: state_name.clone(),
            },
            StepKind::EnsureAuth(spec) => ResolvedOp::EnsureAuth(ResolvedEnsureAuth {
                check_url: self.url(&subst.apply(&spec.check_url)),
                login_scenario_id: spec.login_scenario_id.clone(),
                state_name: spec.state_name.clone(),
                logged_in: spec
                    .logged_in_selector
                    .as_deref()
                    .map(|selector| self.candidates(&mut subst, selector)),
                login_url_pattern: spec.login_url_pattern.clone(),
            }),
        };

        Ok(ResolvedStep {
            action: step.action(),
            timeout: step.options.timeout.unwrap_or(settings.default_timeout),
            op,
            undefined: subst.into_undefined(),
        })
    }

    fn candidates(&self, subst: &mut Substitution<'_>, target: &str) -> Vec<String> {
        self.ctx.selectors.resolve(&subst.apply(target))
    }

    fn url(&self, url: &str) -> String {
        resolve_local_url(url, &self.ctx.settings.working_dir)
    }

    /// `resource:<id>` 交给资源解析器，其余按工作目录补全
    async fn file_path(&self, subst: &mut Substitution<'_>, raw: &str) -> EngineResult<PathBuf> {
        if let Some(resource_id) = parse_resource_ref(raw) {
            return self
                .ctx
                .resources
                .resolve(&self.ctx.settings.project_id, resource_id)
                .await;
        }
        let path = PathBuf::from(subst.apply(raw));
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(self.ctx.settings.working_dir.join(path))
        }
    }
}

/// 一次求值中的变量替换，顺带收集未定义变量
struct Substitution<'s> {
    scope: &'s VariableScope,
    undefined: Vec<String>,
}

impl<'s> Substitution<'s> {
    fn new(scope: &'s VariableScope) -> Self {
        Self {
            scope,
            undefined: Vec::new(),
        }
    }

    fn apply(&mut self, template: &str) -> String {
        for name in self.scope.undefined_in(template) {
            if !self.undefined.contains(&name) {
                self.undefined.push(name);
            }
        }
        self.scope.substitute(template)
    }

    fn into_undefined(self) -> Vec<String> {
        self.undefined
    }
}

fn gesture_op(gesture: Gesture) -> ElementOp {
    match gesture {
        Gesture::Click => ElementOp::Click,
        Gesture::DoubleClick => ElementOp::DoubleClick,
        Gesture::Hover => ElementOp::Hover,
        Gesture::Focus => ElementOp::Focus,
        Gesture::Scroll => ElementOp::ScrollIntoView,
        Gesture::Check => ElementOp::Check,
        Gesture::Uncheck => ElementOp::Uncheck,
    }
}

/// 把相对 URL 解析为工作目录下的 file:// 地址
///
/// 查询串和片段保持原样附加在文件 URL 之后
pub fn resolve_local_url(url: &str, working_dir: &Path) -> String {
    let lower = url.to_ascii_lowercase();
    if ABSOLUTE_URL_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return url.to_string();
    }

    let (path_part, suffix) = match url.find(['?', '#']) {
        Some(pos) => url.split_at(pos),
        None => (url, ""),
    };

    let base = if working_dir.is_absolute() {
        working_dir.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(working_dir),
            Err(_) => return url.to_string(),
        }
    };

    match Url::from_file_path(normalize(&base.join(path_part))) {
        Ok(file_url) => format!("{}{}", file_url, suffix),
        Err(()) => url.to_string(),
    }
}

/// 纯词法地消去 `.` 和 `..`
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StepOptions, UiMap, UiMapSet};
    use crate::services::{MemoryScenarioSource, SelectorResolver, StaticResourceResolver};
    use crate::error::{DriverResult, EngineError};
    use crate::infrastructure::{BrowserDriver, ElementState};
    use crate::models::{AuthState, NetworkRequest};
    use async_trait::async_trait;
    use serde_json::Value as JsonValue;
    use std::sync::Arc;

    /// 求值不触碰浏览器
    struct NoDriver;

    #[async_trait]
    impl BrowserDriver for NoDriver {
        async fn goto(&self, _url: &str) -> DriverResult<()> {
            unreachable!()
        }
        async fn current_url(&self) -> DriverResult<String> {
            unreachable!()
        }
        async fn probe(&self, _selector: &str) -> DriverResult<ElementState> {
            unreachable!()
        }
        async fn perform(&self, _selector: &str, _op: &ElementOp) -> DriverResult<Option<String>> {
            unreachable!()
        }
        async fn evaluate(&self, _script: &str) -> DriverResult<JsonValue> {
            unreachable!()
        }
        async fn screenshot(&self, _full_page: bool) -> DriverResult<Vec<u8>> {
            unreachable!()
        }
        async fn snapshot_session(&self) -> DriverResult<AuthState> {
            unreachable!()
        }
        async fn restore_session(&self, _state: &AuthState) -> DriverResult<()> {
            unreachable!()
        }
        async fn take_network_requests(&self) -> Vec<NetworkRequest> {
            Vec::new()
        }
        async fn close(&self) -> DriverResult<()> {
            Ok(())
        }
    }

    fn context() -> EngineContext {
        let map: UiMap = serde_json::from_str(
            r##"{"name": "login", "elements": {"submit": {"primary": "#submit", "fallbacks": ["button[type=submit]"]}}}"##,
        )
        .unwrap();
        let mut settings = crate::workflow::run_ctx::EngineSettings::default();
        settings.working_dir = PathBuf::from("/srv/site");
        settings.project_id = "shop".into();

        EngineContext::new(Arc::new(NoDriver), Arc::new(MemoryScenarioSource::new()))
            .with_selectors(SelectorResolver::new(UiMapSet::from_iter([map])))
            .with_resources(Arc::new(
                StaticResourceResolver::new().with("logo", "/data/resources/shop/logo.png"),
            ))
            .with_settings(settings)
    }

    #[test]
    fn test_resolve_local_url() {
        let base = Path::new("/srv/site");
        assert_eq!(resolve_local_url("https://a.test/x", base), "https://a.test/x");
        assert_eq!(resolve_local_url("about:blank", base), "about:blank");
        assert_eq!(
            resolve_local_url("pages/../index.html?q=1#top", base),
            "file:///srv/site/index.html?q=1#top"
        );
        assert_eq!(
            resolve_local_url("./form.html", base),
            "file:///srv/site/form.html"
        );
    }

    #[tokio::test]
    async fn test_substitution_happens_before_selector_resolution() {
        let ctx = context();
        let mut scope = VariableScope::new();
        scope.set("el", "submit");
        let step = Step::new(StepKind::Interact {
            gesture: Gesture::Click,
            target: "login.{{el}}".into(),
        });

        let resolved = StepEvaluator::new(&ctx).evaluate(&step, &scope).await.unwrap();
        assert_eq!(
            resolved.op,
            ResolvedOp::Element {
                candidates: vec!["#submit".into(), "button[type=submit]".into()],
                op: ElementOp::Click,
            }
        );
        assert_eq!(resolved.timeout, Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_undefined_variables_are_reported_and_kept() {
        let ctx = context();
        let scope = VariableScope::new();
        let mut step = Step::new(StepKind::Fill {
            target: "#q".into(),
            value: "{{missing}}-{{missing}}".into(),
        });
        step.options = StepOptions {
            timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        };

        let resolved = StepEvaluator::new(&ctx).evaluate(&step, &scope).await.unwrap();
        assert_eq!(resolved.undefined, vec!["missing".to_string()]);
        assert_eq!(resolved.timeout, Duration::from_millis(100));
        assert!(matches!(
            resolved.op,
            ResolvedOp::Element { op: ElementOp::Fill(ref v), .. } if v == "{{missing}}-{{missing}}"
        ));
    }

    #[tokio::test]
    async fn test_file_paths_and_resources() {
        let ctx = context();
        let scope = VariableScope::new();

        let step = Step::new(StepKind::UploadFile {
            target: "#file".into(),
            file_path: "resource:logo".into(),
        });
        let resolved = StepEvaluator::new(&ctx).evaluate(&step, &scope).await.unwrap();
        assert!(matches!(
            resolved.op,
            ResolvedOp::Upload { ref path, .. } if path == Path::new("/data/resources/shop/logo.png")
        ));

        let step = Step::new(StepKind::PasteImage {
            target: "#editor".into(),
            file_path: "img/a.png".into(),
        });
        let resolved = StepEvaluator::new(&ctx).evaluate(&step, &scope).await.unwrap();
        assert!(matches!(
            resolved.op,
            ResolvedOp::PasteImage { ref path, .. } if path == Path::new("/srv/site/img/a.png")
        ));

        let step = Step::new(StepKind::UploadFile {
            target: "#file".into(),
            file_path: "resource:missing".into(),
        });
        let err = StepEvaluator::new(&ctx).evaluate(&step, &scope).await.unwrap_err();
        assert!(matches!(err, EngineError::Resource { .. }));
    }

    #[tokio::test]
    async fn test_wait_value_after_substitution() {
        let ctx = context();
        let mut scope = VariableScope::new();
        scope.set("delay", "250");
        let step = Step::new(StepKind::Wait {
            value: "{{delay}}".into(),
        });

        let resolved = StepEvaluator::new(&ctx).evaluate(&step, &scope).await.unwrap();
        assert_eq!(resolved.op, ResolvedOp::Sleep(Duration::from_millis(250)));
        assert!(resolved.is_composite());
    }
}
