//! Event System
//!
//! Types and implementations for engine events and logging

use crate::error_classifier::LogLevel;
use crate::logging::should_log_with_env;
use chrono::Local;
use std::fmt::Display;

#[derive(Debug, Copy, Clone, Eq, PartialEq, strum::Display)]
pub enum Component {
    /// Fetches dashboards from the portal and reconciles saves.
    DashboardLoader,
    /// Loads remote module scripts; identified by loader instance.
    ScriptLoader(usize),
    /// Resolves visualization type descriptors into instances.
    ModuleResolver,
    /// Owns grid item placement and z-order.
    GridEngine,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, strum::Display)]
pub enum EventType {
    Success,
    Error,
    Refresh,
    Waiting,
    StateChange,
}

/// Represents the current phase of a dashboard session
#[derive(Debug, Copy, Clone, Eq, PartialEq, strum::Display)]
pub enum SessionPhase {
    /// Fetching the dashboard from the portal
    Loading,
    /// Dashboard loaded and interactive
    Loaded,
    /// Dashboard failed to load (terminal)
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub component: Component,
    pub msg: String,
    pub timestamp: String,
    pub event_type: EventType,
    pub log_level: LogLevel,
    /// Optional phase information for state change events
    pub session_phase: Option<SessionPhase>,
}

impl Event {
    fn new(component: Component, msg: String, event_type: EventType, log_level: LogLevel) -> Self {
        Self {
            component,
            msg,
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            event_type,
            log_level,
            session_phase: None,
        }
    }

    pub fn phase_change(phase: SessionPhase, msg: String) -> Self {
        Self {
            component: Component::DashboardLoader,
            msg,
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            event_type: EventType::StateChange,
            log_level: LogLevel::Info,
            session_phase: Some(phase),
        }
    }

    pub fn dashboard_with_level(msg: String, event_type: EventType, log_level: LogLevel) -> Self {
        Self::new(Component::DashboardLoader, msg, event_type, log_level)
    }

    pub fn resolver_with_level(msg: String, event_type: EventType, log_level: LogLevel) -> Self {
        Self::new(Component::ModuleResolver, msg, event_type, log_level)
    }

    pub fn grid_with_level(msg: String, event_type: EventType, log_level: LogLevel) -> Self {
        Self::new(Component::GridEngine, msg, event_type, log_level)
    }

    pub fn script_loader_with_level(
        loader_id: usize,
        msg: String,
        event_type: EventType,
        log_level: LogLevel,
    ) -> Self {
        Self::new(Component::ScriptLoader(loader_id), msg, event_type, log_level)
    }

    pub fn should_display(&self) -> bool {
        // Always show success events and info level events
        if self.event_type == EventType::Success || self.log_level >= LogLevel::Info {
            return true;
        }
        // StateChange events should be handled separately (not displayed in logs)
        if self.event_type == EventType::StateChange {
            return false;
        }
        should_log_with_env(self.log_level)
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.event_type, self.timestamp, self.component, self.msg
        )
    }
}

/// Common event sending utilities for engine components
#[derive(Clone)]
pub struct EventSender {
    sender: tokio::sync::mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: tokio::sync::mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Send a generic event
    pub async fn send_event(&self, event: Event) {
        let _ = self.sender.send(event).await;
    }

    pub async fn send_dashboard_event(
        &self,
        message: String,
        event_type: EventType,
        log_level: LogLevel,
    ) {
        let _ = self
            .sender
            .send(Event::dashboard_with_level(message, event_type, log_level))
            .await;
    }

    pub async fn send_grid_event(
        &self,
        message: String,
        event_type: EventType,
        log_level: LogLevel,
    ) {
        let _ = self
            .sender
            .send(Event::grid_with_level(message, event_type, log_level))
            .await;
    }

    pub async fn send_script_event(
        &self,
        loader_id: usize,
        message: String,
        event_type: EventType,
        log_level: LogLevel,
    ) {
        let _ = self
            .sender
            .send(Event::script_loader_with_level(
                loader_id, message, event_type, log_level,
            ))
            .await;
    }
}
