pub mod auth_flow;
pub mod dispatcher;
pub mod locate;
pub mod run_ctx;
pub mod step_evaluator;

pub use auth_flow::{AuthFlow, AuthPhase};
pub use dispatcher::ActionDispatcher;
pub use locate::{locate, Expectation, Located, POLL_INTERVAL};
pub use run_ctx::{
    CallStack, EngineContext, EngineSettings, NestedRunner, ScenarioReport, StepCtx, StepTrace,
};
pub use step_evaluator::{resolve_local_url, ResolvedEnsureAuth, ResolvedOp, ResolvedStep, StepEvaluator};
