pub mod remote;
pub mod script;

pub use remote::{RemoteComponent, RemoteModuleLoader, RemoteModuleState, ScopeRegistry};
pub use script::{HttpScriptFetcher, ScriptFetcher, ScriptHost, ScriptLoader, ScriptStatus};
