//! Dashboard load/save orchestration
//!
//! Drives a dashboard through its lifecycle: fetch from the portal, seed
//! variable input values from the placed items, hand the item sequence to
//! the grid registry, and reconcile saves against the server echo. The
//! original item snapshot backs discard-changes.

use crate::api::{DashboardApi, DashboardUpdate, UpdateDashboardResponse};
use crate::error_classifier::{ErrorClassifier, LogLevel};
use crate::events::{Event, EventSender, EventType, SessionPhase};
use crate::grid_item::{GridItem, VariableValue, validate_sequence};
use crate::layout::GridRegistry;
use std::collections::HashMap;
use std::sync::Arc;

pub struct DashboardSession {
    api: Arc<dyn DashboardApi>,
    dashboard_id: u64,
    phase: SessionPhase,
    name: String,
    editable: bool,
    notes: String,
    registry: GridRegistry,
    /// Items as last loaded or saved; reverting edits restores these.
    original_grid_items: Vec<GridItem>,
    variable_input_values: HashMap<String, VariableValue>,
    event_sender: EventSender,
    error_classifier: ErrorClassifier,
}

impl DashboardSession {
    pub fn new(api: Arc<dyn DashboardApi>, dashboard_id: u64, event_sender: EventSender) -> Self {
        DashboardSession {
            api,
            dashboard_id,
            phase: SessionPhase::Loading,
            name: String::new(),
            editable: false,
            notes: String::new(),
            registry: GridRegistry::new(false),
            original_grid_items: Vec::new(),
            variable_input_values: HashMap::new(),
            event_sender,
            error_classifier: ErrorClassifier::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn dashboard_id(&self) -> u64 {
        self.dashboard_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn editable(&self) -> bool {
        self.editable
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn registry(&self) -> &GridRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut GridRegistry {
        &mut self.registry
    }

    pub fn original_grid_items(&self) -> &[GridItem] {
        &self.original_grid_items
    }

    pub fn variable_input_values(&self) -> &HashMap<String, VariableValue> {
        &self.variable_input_values
    }

    /// Fetches the dashboard and moves the session to Loaded or Failed.
    /// Failed is terminal; callers start a new session to retry.
    pub async fn load(&mut self) -> SessionPhase {
        self.event_sender
            .send_event(Event::phase_change(
                SessionPhase::Loading,
                format!("Fetching dashboard {}", self.dashboard_id),
            ))
            .await;

        let response = match self.api.get_dashboard(self.dashboard_id).await {
            Ok(response) => response,
            Err(error) => {
                let level = self.error_classifier.classify_fetch_error(&error);
                self.fail(format!("Failed to fetch dashboard: {}", error), level)
                    .await;
                return self.phase;
            }
        };

        let dashboard = match (response.success, response.dashboard) {
            (true, Some(dashboard)) => dashboard,
            _ => {
                let message = response
                    .message
                    .unwrap_or_else(|| "Dashboard not found".to_string());
                self.fail(format!("Failed to fetch dashboard: {}", message), LogLevel::Error)
                    .await;
                return self.phase;
            }
        };

        if let Err(error) = validate_sequence(&dashboard.grid_items) {
            self.fail(format!("Rejected dashboard: {}", error), LogLevel::Error)
                .await;
            return self.phase;
        }

        self.name = dashboard.name;
        self.editable = dashboard.editable;
        self.notes = dashboard.notes;
        self.registry = GridRegistry::new(dashboard.unrestricted_placement);
        self.seed_variable_inputs(&dashboard.grid_items);
        self.registry.set_items(dashboard.grid_items.clone());
        self.original_grid_items = dashboard.grid_items;

        self.phase = SessionPhase::Loaded;
        self.event_sender
            .send_event(Event::phase_change(
                SessionPhase::Loaded,
                format!("Dashboard '{}' loaded", self.name),
            ))
            .await;
        self.event_sender
            .send_dashboard_event(
                format!(
                    "Loaded {} grid items for dashboard {}",
                    self.registry.items().len(),
                    self.dashboard_id
                ),
                EventType::Success,
                LogLevel::Info,
            )
            .await;
        self.phase
    }

    async fn fail(&mut self, message: String, level: LogLevel) {
        self.phase = SessionPhase::Failed;
        self.event_sender
            .send_dashboard_event(message.clone(), EventType::Error, level)
            .await;
        self.event_sender
            .send_event(Event::phase_change(SessionPhase::Failed, message))
            .await;
    }

    /// Replaces the working item sequence and seeds variable values for any
    /// newly added variable-input items. Existing values are never
    /// overwritten: a rename or re-add keeps whatever the user last picked.
    pub fn update_grid_items(&mut self, items: Vec<GridItem>) {
        self.seed_variable_inputs(&items);
        self.registry.set_items(items);
    }

    fn seed_variable_inputs(&mut self, items: &[GridItem]) {
        for item in items {
            let Some(args) = item.variable_input_args() else {
                continue;
            };
            if self.variable_input_values.contains_key(&args.variable_name) {
                continue;
            }
            let value = match (args.initial_value, args.variable_options_source.as_deref()) {
                (Some(value), _) => Some(value),
                // A checkbox with no recorded value is unchecked. Other
                // inputs without an initial value stay unseeded until the
                // user picks one; values cannot hold a JSON null, so a later
                // sequence carrying a real initial value will seed the key.
                (None, Some("checkbox")) => Some(VariableValue::Bool(false)),
                (None, _) => None,
            };
            if let Some(value) = value {
                self.variable_input_values.insert(args.variable_name, value);
            }
        }
    }

    pub fn set_variable_input(&mut self, name: impl Into<String>, value: VariableValue) {
        self.variable_input_values.insert(name.into(), value);
    }

    /// Discards working edits, restoring the last loaded/saved sequence.
    /// Runs through the normal update path so variable inputs for restored
    /// items are re-seeded.
    pub fn reset_grid_items(&mut self) {
        let original = self.original_grid_items.clone();
        self.update_grid_items(original);
    }

    /// Leaving edit mode also releases the movement lock.
    pub fn set_editing(&mut self, editing: bool) {
        self.registry.set_editing(editing);
        if !editing {
            self.registry.set_movement_locked(false);
        }
    }

    /// Persists the working item sequence. On success the server-echoed
    /// dashboard is authoritative: its items replace the working sequence
    /// and become the new original snapshot. On failure nothing changes
    /// locally.
    pub async fn save_layout(&mut self) -> Result<UpdateDashboardResponse, crate::api::error::ApiError> {
        let update = DashboardUpdate::with_grid_items(self.registry.items().to_vec());
        self.save_properties(update).await
    }

    /// Persists arbitrary dashboard properties; see [`Self::save_layout`]
    /// for echo handling.
    pub async fn save_properties(
        &mut self,
        update: DashboardUpdate,
    ) -> Result<UpdateDashboardResponse, crate::api::error::ApiError> {
        let response = match self.api.update_dashboard(self.dashboard_id, update).await {
            Ok(response) => response,
            Err(error) => {
                let level = self.error_classifier.classify_fetch_error(&error);
                self.event_sender
                    .send_dashboard_event(
                        format!("Failed to save dashboard: {}", error),
                        EventType::Error,
                        level,
                    )
                    .await;
                return Err(error);
            }
        };

        if !response.success {
            let message = response
                .message
                .clone()
                .unwrap_or_else(|| "Save rejected".to_string());
            self.event_sender
                .send_dashboard_event(
                    format!("Failed to save dashboard: {}", message),
                    EventType::Error,
                    LogLevel::Warn,
                )
                .await;
            return Ok(response);
        }

        if let Some(dashboard) = &response.updated_dashboard {
            self.name = dashboard.name.clone();
            self.notes = dashboard.notes.clone();
            self.seed_variable_inputs(&dashboard.grid_items);
            self.registry.set_items(dashboard.grid_items.clone());
            self.original_grid_items = dashboard.grid_items.clone();
        } else {
            // No echo: the sent sequence is the best known state.
            self.original_grid_items = self.registry.items().to_vec();
        }

        self.event_sender
            .send_dashboard_event(
                format!("Dashboard {} saved", self.dashboard_id),
                EventType::Success,
                LogLevel::Info,
            )
            .await;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ApiError;
    use crate::api::{Dashboard, GetDashboardResponse, MockDashboardApi};
    use crate::consts::engine_consts::EVENT_QUEUE_SIZE;
    use tokio::sync::mpsc;

    fn event_sender() -> (EventSender, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        (EventSender::new(tx), rx)
    }

    fn item(i: &str, source: &str, args: &str) -> GridItem {
        GridItem {
            i: i.to_string(),
            x: 0,
            y: 0,
            w: 10,
            h: 10,
            source: source.to_string(),
            args_string: args.to_string(),
            metadata_string: "{}".to_string(),
        }
    }

    fn dashboard_with(items: Vec<GridItem>) -> Dashboard {
        Dashboard {
            name: "Streamflow".to_string(),
            editable: true,
            grid_items: items,
            ..Default::default()
        }
    }

    fn session_with(api: MockDashboardApi) -> (DashboardSession, mpsc::Receiver<Event>) {
        let (sender, receiver) = event_sender();
        (DashboardSession::new(Arc::new(api), 42, sender), receiver)
    }

    #[tokio::test]
    async fn test_load_success_populates_registry_and_snapshot() {
        let mut api = MockDashboardApi::new();
        api.expect_get_dashboard().returning(|_| {
            Ok(GetDashboardResponse {
                success: true,
                dashboard: Some(dashboard_with(vec![item("a", "Text", "{}")])),
                message: None,
            })
        });
        let (mut session, _events) = session_with(api);

        assert_eq!(session.load().await, SessionPhase::Loaded);
        assert_eq!(session.name(), "Streamflow");
        assert!(session.editable());
        assert_eq!(session.registry().items().len(), 1);
        assert_eq!(session.original_grid_items().len(), 1);
    }

    #[tokio::test]
    async fn test_load_failure_response_is_terminal() {
        let mut api = MockDashboardApi::new();
        api.expect_get_dashboard().returning(|_| {
            Ok(GetDashboardResponse {
                success: false,
                dashboard: None,
                message: Some("no such dashboard".to_string()),
            })
        });
        let (mut session, mut events) = session_with(api);

        assert_eq!(session.load().await, SessionPhase::Failed);
        let mut saw_failure_phase = false;
        while let Ok(event) = events.try_recv() {
            if event.session_phase == Some(SessionPhase::Failed) {
                saw_failure_phase = true;
                assert!(event.msg.contains("no such dashboard"));
            }
        }
        assert!(saw_failure_phase);
    }

    #[tokio::test]
    async fn test_load_transport_error_is_terminal() {
        let mut api = MockDashboardApi::new();
        api.expect_get_dashboard().returning(|_| {
            Err(ApiError::Http {
                status: 503,
                message: "unavailable".to_string(),
            })
        });
        let (mut session, _events) = session_with(api);

        assert_eq!(session.load().await, SessionPhase::Failed);
        assert!(session.registry().items().is_empty());
    }

    #[tokio::test]
    async fn test_load_seeds_variable_input_values() {
        let mut api = MockDashboardApi::new();
        api.expect_get_dashboard().returning(|_| {
            Ok(GetDashboardResponse {
                success: true,
                dashboard: Some(dashboard_with(vec![
                    item(
                        "a",
                        "Variable Input",
                        "{\"variable_name\": \"basin\", \"initial_value\": \"yellowstone\"}",
                    ),
                    item(
                        "b",
                        "Variable Input",
                        "{\"variable_name\": \"show_labels\", \"variable_options_source\": \"checkbox\", \"initial_value\": null}",
                    ),
                ])),
                message: None,
            })
        });
        let (mut session, _events) = session_with(api);
        session.load().await;

        assert_eq!(
            session.variable_input_values().get("basin"),
            Some(&VariableValue::Text("yellowstone".to_string()))
        );
        assert_eq!(
            session.variable_input_values().get("show_labels"),
            Some(&VariableValue::Bool(false))
        );
    }

    #[tokio::test]
    async fn test_null_initial_value_stays_unseeded_until_one_appears() {
        let mut api = MockDashboardApi::new();
        api.expect_get_dashboard().returning(|_| {
            Ok(GetDashboardResponse {
                success: true,
                dashboard: Some(dashboard_with(vec![item(
                    "a",
                    "Variable Input",
                    "{\"variable_name\": \"basin\", \"initial_value\": null}",
                )])),
                message: None,
            })
        });
        let (mut session, _events) = session_with(api);
        session.load().await;
        assert!(session.variable_input_values().get("basin").is_none());

        session.update_grid_items(vec![item(
            "a",
            "Variable Input",
            "{\"variable_name\": \"basin\", \"initial_value\": \"snake\"}",
        )]);
        assert_eq!(
            session.variable_input_values().get("basin"),
            Some(&VariableValue::Text("snake".to_string()))
        );
    }

    #[tokio::test]
    async fn test_update_grid_items_never_overwrites_existing_values() {
        let mut api = MockDashboardApi::new();
        api.expect_get_dashboard().returning(|_| {
            Ok(GetDashboardResponse {
                success: true,
                dashboard: Some(dashboard_with(vec![item(
                    "a",
                    "Variable Input",
                    "{\"variable_name\": \"basin\", \"initial_value\": \"yellowstone\"}",
                )])),
                message: None,
            })
        });
        let (mut session, _events) = session_with(api);
        session.load().await;
        session.set_variable_input("basin", VariableValue::Text("snake".to_string()));

        session.update_grid_items(vec![item(
            "a",
            "Variable Input",
            "{\"variable_name\": \"basin\", \"initial_value\": \"yellowstone\"}",
        )]);
        assert_eq!(
            session.variable_input_values().get("basin"),
            Some(&VariableValue::Text("snake".to_string()))
        );
    }

    #[tokio::test]
    async fn test_reset_restores_original_items() {
        let mut api = MockDashboardApi::new();
        api.expect_get_dashboard().returning(|_| {
            Ok(GetDashboardResponse {
                success: true,
                dashboard: Some(dashboard_with(vec![item("a", "Text", "{}")])),
                message: None,
            })
        });
        let (mut session, _events) = session_with(api);
        session.load().await;

        session.update_grid_items(vec![item("b", "Text", "{}")]);
        assert_eq!(session.registry().items()[0].i, "b");

        session.reset_grid_items();
        assert_eq!(session.registry().items()[0].i, "a");
    }

    #[tokio::test]
    async fn test_save_adopts_server_echo() {
        let mut api = MockDashboardApi::new();
        api.expect_get_dashboard().returning(|_| {
            Ok(GetDashboardResponse {
                success: true,
                dashboard: Some(dashboard_with(vec![item("a", "Text", "{}")])),
                message: None,
            })
        });
        api.expect_update_dashboard().returning(|_, _| {
            let mut echoed = item("a", "Text", "{}");
            echoed.x = 7;
            Ok(UpdateDashboardResponse {
                success: true,
                updated_dashboard: Some(dashboard_with(vec![echoed])),
                message: None,
            })
        });
        let (mut session, _events) = session_with(api);
        session.load().await;

        let response = session.save_layout().await.unwrap();
        assert!(response.success);
        assert_eq!(session.registry().items()[0].x, 7);
        assert_eq!(session.original_grid_items()[0].x, 7);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_state_untouched() {
        let mut api = MockDashboardApi::new();
        api.expect_get_dashboard().returning(|_| {
            Ok(GetDashboardResponse {
                success: true,
                dashboard: Some(dashboard_with(vec![item("a", "Text", "{}")])),
                message: None,
            })
        });
        api.expect_update_dashboard().returning(|_, _| {
            Ok(UpdateDashboardResponse {
                success: false,
                updated_dashboard: None,
                message: Some("not editable".to_string()),
            })
        });
        let (mut session, _events) = session_with(api);
        session.load().await;

        let mut moved = item("a", "Text", "{}");
        moved.x = 50;
        session.update_grid_items(vec![moved]);

        let response = session.save_layout().await.unwrap();
        assert!(!response.success);
        // Working edits survive; the snapshot still holds the loaded state.
        assert_eq!(session.registry().items()[0].x, 50);
        assert_eq!(session.original_grid_items()[0].x, 0);
    }

    #[tokio::test]
    async fn test_leaving_edit_mode_clears_movement_lock() {
        let api = MockDashboardApi::new();
        let (mut session, _events) = session_with(api);

        session.set_editing(true);
        session.registry_mut().set_movement_locked(true);
        assert!(session.registry().is_movement_locked());

        session.set_editing(false);
        assert!(!session.registry().is_movement_locked());
    }
}
