//! Remote Module Loader
//!
//! Fetches a remotely hosted bundle exposing a named module under a shared
//! scope, instantiates the exposed component once the script is ready, and
//! surfaces load failure as a first-class state. The resolved component is
//! memoized for the lifetime of the loader.

use crate::grid_item::VariableValue;
use crate::loader::script::{ScriptError, ScriptLoader, ScriptStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A renderable unit produced by a remote module factory.
#[derive(Debug, PartialEq)]
pub struct RemoteComponent {
    /// Module name the component was produced from.
    pub name: String,
}

impl RemoteComponent {
    pub fn new(name: impl Into<String>) -> Self {
        RemoteComponent { name: name.into() }
    }
}

pub type ComponentFactory = Arc<dyn Fn() -> RemoteComponent + Send + Sync>;

#[derive(Default)]
struct ScopeContainer {
    initialized: bool,
    factories: HashMap<String, ComponentFactory>,
}

/// Process-wide registry of remote scopes and the modules they expose.
/// Mirrors the runtime-shared container a federated bundle registers itself
/// into; scope initialization happens at most once per scope.
#[derive(Clone, Default)]
pub struct ScopeRegistry {
    scopes: Arc<Mutex<HashMap<String, ScopeContainer>>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module factory under a scope, creating the scope
    /// container if needed.
    pub fn register_module(&self, scope: &str, module: &str, factory: ComponentFactory) {
        let mut scopes = self.scopes.lock().expect("scope registry lock poisoned");
        scopes
            .entry(scope.to_string())
            .or_default()
            .factories
            .insert(module.to_string(), factory);
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        let scopes = self.scopes.lock().expect("scope registry lock poisoned");
        scopes.contains_key(scope)
    }

    /// Initializes the scope's shared-module registry. Returns true when
    /// this call performed the initialization, false when the scope was
    /// already initialized (the call is then a no-op).
    pub fn initialize(&self, scope: &str) -> bool {
        let mut scopes = self.scopes.lock().expect("scope registry lock poisoned");
        match scopes.get_mut(scope) {
            Some(container) if container.initialized => false,
            Some(container) => {
                container.initialized = true;
                true
            }
            None => false,
        }
    }

    pub fn is_initialized(&self, scope: &str) -> bool {
        let scopes = self.scopes.lock().expect("scope registry lock poisoned");
        scopes.get(scope).is_some_and(|c| c.initialized)
    }

    fn factory(&self, scope: &str, module: &str) -> Option<ComponentFactory> {
        let scopes = self.scopes.lock().expect("scope registry lock poisoned");
        scopes.get(scope)?.factories.get(module).cloned()
    }
}

/// Render state of a remote module.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteModuleState {
    /// No module was specified; nothing to load or render.
    NoModule,
    /// The script is still being fetched.
    Loading,
    /// The component is instantiated and renderable.
    Ready(Arc<RemoteComponent>),
    /// The script or scope failed; the message names what failed.
    Failed(String),
}

pub struct RemoteModuleLoader {
    scope: String,
    module: Option<String>,
    url: Option<String>,
    scopes: ScopeRegistry,
    script: ScriptLoader,
    component: Option<Arc<RemoteComponent>>,
    variable_snapshot: Option<Arc<HashMap<String, VariableValue>>>,
}

impl RemoteModuleLoader {
    /// Creates the loader and, when a module is specified, starts loading
    /// the script. Without a module no network activity is attempted.
    pub fn new(
        scopes: ScopeRegistry,
        mut script: ScriptLoader,
        scope: impl Into<String>,
        module: Option<String>,
        url: Option<String>,
    ) -> Self {
        if module.is_some() {
            script.set_url(url.as_deref());
        }
        RemoteModuleLoader {
            scope: scope.into(),
            module,
            url,
            scopes,
            script,
            component: None,
            variable_snapshot: None,
        }
    }

    /// Drives the state machine one step and reports the current state.
    pub fn state(&mut self) -> RemoteModuleState {
        let Some(module) = self.module.clone() else {
            return RemoteModuleState::NoModule;
        };

        // The resolved component is never re-fetched.
        if let Some(component) = &self.component {
            return RemoteModuleState::Ready(component.clone());
        }

        match self.script.status() {
            ScriptStatus { failed: true, .. } => RemoteModuleState::Failed(format!(
                "Failed to load dynamic script: {}",
                self.url.as_deref().unwrap_or_default()
            )),
            ScriptStatus { ready: false, .. } => RemoteModuleState::Loading,
            ScriptStatus { ready: true, .. } => self.instantiate(&module),
        }
    }

    /// The transport error behind a failed script load, if any.
    pub fn script_error(&self) -> Option<ScriptError> {
        self.script.error()
    }

    /// Waits for the script load to settle, then reports the state.
    pub async fn settle(&mut self) -> RemoteModuleState {
        if self.module.is_some() {
            self.script.wait_for_completion().await;
        }
        self.state()
    }

    fn instantiate(&mut self, module: &str) -> RemoteModuleState {
        if !self.scopes.has_scope(&self.scope) {
            return RemoteModuleState::Failed(format!(
                "Scope '{}' was not registered by the loaded script",
                self.scope
            ));
        }
        // One-time share-scope initialization; skipped if already done.
        if !self.scopes.is_initialized(&self.scope) {
            self.scopes.initialize(&self.scope);
        }
        let Some(factory) = self.scopes.factory(&self.scope, module) else {
            return RemoteModuleState::Failed(format!(
                "Module '{}' not found in scope '{}'",
                module, self.scope
            ));
        };
        let component = Arc::new(factory());
        self.component = Some(component.clone());
        RemoteModuleState::Ready(component)
    }

    /// Builds the context forwarded to the loaded component: a read-only
    /// snapshot of the variable-input values plus an updater merging partial
    /// updates into the shared map. The snapshot is only rebuilt when the
    /// contents change, so an unchanged map never forces a re-render.
    pub fn render_context(
        &mut self,
        values: &HashMap<String, VariableValue>,
        updater: Arc<dyn Fn(HashMap<String, VariableValue>) + Send + Sync>,
    ) -> RenderContext {
        let snapshot = match &self.variable_snapshot {
            Some(existing) if existing.as_ref() == values => existing.clone(),
            _ => {
                let fresh = Arc::new(values.clone());
                self.variable_snapshot = Some(fresh.clone());
                fresh
            }
        };
        RenderContext {
            variable_input_values: snapshot,
            updater,
        }
    }

    /// Detaches the script resource; in-flight loads have no further effect.
    pub fn teardown(&mut self) {
        self.script.teardown();
    }
}

/// Capabilities injected into a loaded remote component.
#[derive(Clone)]
pub struct RenderContext {
    pub variable_input_values: Arc<HashMap<String, VariableValue>>,
    updater: Arc<dyn Fn(HashMap<String, VariableValue>) + Send + Sync>,
}

impl RenderContext {
    /// Merges partial updates into the shared variable-input map; never
    /// replaces the map wholesale.
    pub fn update_variable_inputs(&self, updates: HashMap<String, VariableValue>) {
        (self.updater)(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::script::{MockScriptFetcher, ScriptError, ScriptHost};

    fn ready_script(host: &ScriptHost) -> ScriptLoader {
        let mut fetcher = MockScriptFetcher::new();
        fetcher.expect_fetch().returning(|_| Ok(()));
        ScriptLoader::new(host.clone(), Arc::new(fetcher))
    }

    fn failing_script(host: &ScriptHost) -> ScriptLoader {
        let mut fetcher = MockScriptFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Err(ScriptError::Fetch("boom".to_string())));
        ScriptLoader::new(host.clone(), Arc::new(fetcher))
    }

    fn registry_with_plot_module() -> ScopeRegistry {
        let scopes = ScopeRegistry::new();
        scopes.register_module(
            "hydro_plugins",
            "./StreamflowPlot",
            Arc::new(|| RemoteComponent::new("StreamflowPlot")),
        );
        scopes
    }

    #[tokio::test]
    async fn test_no_module_reports_no_module_and_loads_nothing() {
        let host = ScriptHost::new();
        let mut loader = RemoteModuleLoader::new(
            ScopeRegistry::new(),
            ready_script(&host),
            "hydro_plugins",
            None,
            Some("https://example.com/remote.js".to_string()),
        );

        assert_eq!(loader.state(), RemoteModuleState::NoModule);
        assert!(host.attached_urls().is_empty());
    }

    #[tokio::test]
    async fn test_ready_script_instantiates_and_memoizes_component() {
        let host = ScriptHost::new();
        let mut loader = RemoteModuleLoader::new(
            registry_with_plot_module(),
            ready_script(&host),
            "hydro_plugins",
            Some("./StreamflowPlot".to_string()),
            Some("https://example.com/remote.js".to_string()),
        );

        let state = loader.settle().await;
        let RemoteModuleState::Ready(first) = state else {
            panic!("expected ready state, got {:?}", state);
        };
        assert_eq!(first.name, "StreamflowPlot");

        // Subsequent observations return the same instance.
        let RemoteModuleState::Ready(second) = loader.state() else {
            panic!("expected ready state");
        };
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_failed_script_names_the_url_and_never_instantiates() {
        let host = ScriptHost::new();
        let url = "https://example.com/broken.js";
        let mut loader = RemoteModuleLoader::new(
            registry_with_plot_module(),
            failing_script(&host),
            "hydro_plugins",
            Some("./StreamflowPlot".to_string()),
            Some(url.to_string()),
        );

        let state = loader.settle().await;
        match state {
            RemoteModuleState::Failed(message) => assert!(message.contains(url)),
            other => panic!("expected failed state, got {:?}", other),
        }
        assert!(loader.component.is_none());
    }

    #[tokio::test]
    async fn test_scope_initialization_is_idempotent() {
        let scopes = registry_with_plot_module();
        assert!(!scopes.is_initialized("hydro_plugins"));
        assert!(scopes.initialize("hydro_plugins"));
        assert!(!scopes.initialize("hydro_plugins"));
        assert!(scopes.is_initialized("hydro_plugins"));
    }

    #[tokio::test]
    async fn test_missing_module_in_scope_fails_by_name() {
        let host = ScriptHost::new();
        let mut loader = RemoteModuleLoader::new(
            registry_with_plot_module(),
            ready_script(&host),
            "hydro_plugins",
            Some("./MissingWidget".to_string()),
            Some("https://example.com/remote.js".to_string()),
        );

        let state = loader.settle().await;
        match state {
            RemoteModuleState::Failed(message) => {
                assert!(message.contains("./MissingWidget"));
                assert!(message.contains("hydro_plugins"));
            }
            other => panic!("expected failed state, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_render_context_snapshot_is_reused_until_values_change() {
        let host = ScriptHost::new();
        let mut loader = RemoteModuleLoader::new(
            registry_with_plot_module(),
            ready_script(&host),
            "hydro_plugins",
            Some("./StreamflowPlot".to_string()),
            Some("https://example.com/remote.js".to_string()),
        );

        let mut values = HashMap::new();
        values.insert(
            "basin".to_string(),
            VariableValue::Text("yellowstone".to_string()),
        );
        let updater: Arc<dyn Fn(HashMap<String, VariableValue>) + Send + Sync> =
            Arc::new(|_| {});

        let first = loader.render_context(&values, updater.clone());
        let second = loader.render_context(&values, updater.clone());
        assert!(Arc::ptr_eq(
            &first.variable_input_values,
            &second.variable_input_values
        ));

        values.insert("reach".to_string(), VariableValue::Number(12.0));
        let third = loader.render_context(&values, updater);
        assert!(!Arc::ptr_eq(
            &first.variable_input_values,
            &third.variable_input_values
        ));
        assert_eq!(third.variable_input_values.len(), 2);
    }

    #[tokio::test]
    async fn test_updater_merges_partial_updates() {
        let shared: Arc<Mutex<HashMap<String, VariableValue>>> = Arc::new(Mutex::new(
            HashMap::from([("basin".to_string(), VariableValue::Text("a".to_string()))]),
        ));
        let sink = shared.clone();
        let updater: Arc<dyn Fn(HashMap<String, VariableValue>) + Send + Sync> =
            Arc::new(move |updates| {
                let mut map = sink.lock().unwrap();
                map.extend(updates);
            });

        let host = ScriptHost::new();
        let mut loader = RemoteModuleLoader::new(
            registry_with_plot_module(),
            ready_script(&host),
            "hydro_plugins",
            Some("./StreamflowPlot".to_string()),
            Some("https://example.com/remote.js".to_string()),
        );
        let values = shared.lock().unwrap().clone();
        let context = loader.render_context(&values, updater);

        context.update_variable_inputs(HashMap::from([(
            "reach".to_string(),
            VariableValue::Bool(true),
        )]));

        let map = shared.lock().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(
            map.get("basin"),
            Some(&VariableValue::Text("a".to_string()))
        );
    }
}
