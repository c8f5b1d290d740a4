pub mod auth;
pub mod event;
pub mod loaders;
pub mod outcome;
pub mod scenario;
pub mod step;
pub mod ui_map;

pub use auth::{check_key_segment, AuthKey, AuthState, OriginStorage, StorageEntry};
pub use event::{EventReceiver, EventSender, RunEvent};
pub use loaders::{load_scenario_file, load_ui_map_file, load_ui_maps};
pub use outcome::{NetworkRequest, RunResult, RunStatus, StepOutcome, StepStatus};
pub use scenario::{Scenario, ScenarioDocument};
pub use step::{
    parse_wait_millis, ActionKind, EnsureAuthSpec, Gesture, Step, StepDocument, StepKind,
    StepOptions,
};
pub use ui_map::{ElementLocator, UiMap, UiMapSet};
