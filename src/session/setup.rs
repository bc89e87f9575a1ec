//! Session setup and initialization

use super::dashboard::DashboardSession;
use crate::api::ApiClient;
use crate::consts::engine_consts::EVENT_QUEUE_SIZE;
use crate::environment::Environment;
use crate::error_classifier::{ErrorClassifier, LogLevel};
use crate::events::{Event, EventSender, EventType, SessionPhase};
use crate::grid_item::MAP_SOURCE;
use crate::loader::{
    HttpScriptFetcher, RemoteModuleLoader, RemoteModuleState, ScopeRegistry, ScriptHost,
    ScriptLoader,
};
use crate::resolver::{ModuleResolver, SourceDescriptor};
use crate::variables::{apply_variable_inputs, dependent_variable_inputs};
use serde_json::Value;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Session data for headless mode
pub struct SessionData {
    /// Event receiver for engine events
    pub event_receiver: mpsc::Receiver<Event>,
    /// Join handles for refresh ticker tasks
    pub join_handles: Vec<JoinHandle<()>>,
    /// Shutdown sender to stop the event loop
    pub shutdown_sender: broadcast::Sender<()>,
    /// The loaded dashboard session
    pub session: DashboardSession,
    /// Dashboard ID
    pub dashboard_id: u64,
}

/// Sets up a loaded dashboard session
///
/// This function handles the common setup for headless mode:
/// 1. Creates the event channel
/// 2. Creates the portal client and fetches the dashboard
/// 3. Resolves map layers and loads remote plugin bundles
/// 4. Starts refresh tickers for items that request auto-refresh
/// 5. Returns session data for mode-specific handling
pub async fn setup_session(
    dashboard_id: u64,
    env: Environment,
) -> Result<SessionData, Box<dyn Error>> {
    let (event_tx, event_receiver) = mpsc::channel(EVENT_QUEUE_SIZE);
    let event_sender = EventSender::new(event_tx);

    let api = Arc::new(ApiClient::new(env));
    let mut session = DashboardSession::new(api, dashboard_id, event_sender.clone());

    if session.load().await == SessionPhase::Failed {
        return Err(Box::from(format!(
            "Dashboard {} failed to load",
            dashboard_id
        )));
    }

    prime_visualizations(&session, &event_sender).await;

    let (shutdown_sender, _) = broadcast::channel(1);
    let join_handles = start_refresh_tickers(&session, event_sender);

    Ok(SessionData {
        event_receiver,
        join_handles,
        shutdown_sender,
        session,
        dashboard_id,
    })
}

/// Walks the loaded items once, resolving map layer configurations and
/// loading remote plugin bundles, so broken items surface at startup
/// instead of at first render.
async fn prime_visualizations(session: &DashboardSession, event_sender: &EventSender) {
    let resolver = ModuleResolver::new();
    let classifier = ErrorClassifier::new();
    let host = ScriptHost::new();
    let scopes = ScopeRegistry::new();
    let fetcher = Arc::new(HttpScriptFetcher::new());

    for (index, item) in session.registry().items().iter().enumerate() {
        let args = match item.args() {
            Ok(args) => args,
            Err(error) => {
                event_sender
                    .send_grid_event(
                        format!("Item {}: {}", item.i, error),
                        EventType::Error,
                        LogLevel::Error,
                    )
                    .await;
                continue;
            }
        };
        // Placeholders without a value render empty; say so up front.
        for name in dependent_variable_inputs(&item.args_string) {
            if !session.variable_input_values().contains_key(&name) {
                event_sender
                    .send_grid_event(
                        format!("Item {}: variable '{}' has no value yet", item.i, name),
                        EventType::Waiting,
                        LogLevel::Debug,
                    )
                    .await;
            }
        }
        let args = match apply_variable_inputs(&args, session.variable_input_values()) {
            Ok(args) => args,
            Err(error) => {
                event_sender
                    .send_grid_event(
                        format!("Item {}: {}", item.i, error),
                        EventType::Error,
                        LogLevel::Error,
                    )
                    .await;
                continue;
            }
        };

        if item.source == MAP_SOURCE {
            prime_map_layers(&resolver, &classifier, event_sender, &item.i, &args).await;
        } else if let Some((url, scope, module)) = remote_module_spec(&args) {
            event_sender
                .send_script_event(
                    index,
                    format!("Item {}: loading remote module from {}", item.i, url),
                    EventType::Waiting,
                    LogLevel::Debug,
                )
                .await;
            let script = ScriptLoader::new(host.clone(), fetcher.clone());
            let mut loader =
                RemoteModuleLoader::new(scopes.clone(), script, scope, Some(module), Some(url));
            match loader.settle().await {
                RemoteModuleState::Ready(component) => {
                    event_sender
                        .send_script_event(
                            index,
                            format!("Item {}: loaded remote module '{}'", item.i, component.name),
                            EventType::Success,
                            LogLevel::Info,
                        )
                        .await;
                }
                RemoteModuleState::Failed(message) => {
                    // A transport failure is degraded-widget territory; a
                    // missing scope or module is a configuration error.
                    let level = loader
                        .script_error()
                        .map(|error| classifier.classify_script_error(&error))
                        .unwrap_or(LogLevel::Error);
                    event_sender
                        .send_script_event(
                            index,
                            format!("Item {}: {}", item.i, message),
                            EventType::Error,
                            level,
                        )
                        .await;
                }
                RemoteModuleState::Loading | RemoteModuleState::NoModule => {}
            }
            loader.teardown();
        }
    }
}

/// Resolves each map layer's `configuration` descriptor into a module
/// instance, reporting failures without aborting the remaining layers.
async fn prime_map_layers(
    resolver: &ModuleResolver,
    classifier: &ErrorClassifier,
    event_sender: &EventSender,
    item_key: &str,
    args: &Value,
) {
    let Some(layers) = args.get("layers").and_then(Value::as_array) else {
        return;
    };
    for layer in layers {
        let Some(configuration) = layer.get("configuration") else {
            continue;
        };
        let Some(type_name) = configuration.get("type").and_then(Value::as_str) else {
            continue;
        };
        let descriptor = SourceDescriptor::new(type_name, configuration.get("props").cloned());
        match resolver.resolve(&descriptor).await {
            Ok(instance) => {
                event_sender
                    .send_event(Event::resolver_with_level(
                        format!("Item {}: resolved layer module '{}'", item_key, instance.kind),
                        EventType::Success,
                        LogLevel::Debug,
                    ))
                    .await;
            }
            Err(error) => {
                let level = classifier.classify_resolve_error(&error);
                event_sender
                    .send_event(Event::resolver_with_level(
                        format!("Item {}: {}", item_key, error),
                        EventType::Error,
                        level,
                    ))
                    .await;
            }
        }
    }
}

/// A remote plugin item carries the bundle URL plus the scope and module
/// names in its arguments.
fn remote_module_spec(args: &Value) -> Option<(String, String, String)> {
    let url = args.get("url")?.as_str()?;
    let scope = args.get("scope")?.as_str()?;
    let module = args.get("module")?.as_str()?;
    Some((url.to_string(), scope.to_string(), module.to_string()))
}

/// Spawns one ticker per grid item whose metadata requests auto-refresh.
/// Refresh rates are in minutes; 0 disables refreshing.
fn start_refresh_tickers(
    session: &DashboardSession,
    event_sender: EventSender,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    for item in session.registry().items() {
        let Ok(metadata) = item.metadata() else {
            continue;
        };
        if metadata.refresh_rate == 0 {
            continue;
        }
        let key = item.i.clone();
        let source = item.source.clone();
        let sender = event_sender.clone();
        let period = Duration::from_secs(metadata.refresh_rate.saturating_mul(60));
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately; the item was just rendered.
            interval.tick().await;
            loop {
                interval.tick().await;
                sender
                    .send_grid_event(
                        format!("Refreshing item {} ({})", key, source),
                        EventType::Refresh,
                        LogLevel::Debug,
                    )
                    .await;
            }
        }));
    }
    handles
}
