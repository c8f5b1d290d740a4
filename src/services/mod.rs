pub mod artifact_sink;
pub mod auth_store;
pub mod resource_resolver;
pub mod scenario_source;
pub mod selector_resolver;
pub mod variable_scope;

pub use artifact_sink::{ArtifactSink, DirArtifactSink, MemoryArtifactSink};
pub use auth_store::{AuthStateStore, FileAuthStore, MemoryAuthStore};
pub use resource_resolver::{
    parse_resource_ref, FileResourceResolver, ResourceResolver, StaticResourceResolver,
};
pub use scenario_source::{FileScenarioSource, MemoryScenarioSource, ScenarioSource};
pub use selector_resolver::SelectorResolver;
pub use variable_scope::VariableScope;
