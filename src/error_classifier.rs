use crate::api::error::ApiError;
use crate::loader::script::ScriptError;
use crate::resolver::ResolveError;
use log::LevelFilter;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_fetch_error(&self, error: &ApiError) -> LogLevel {
        match error {
            // Non-critical: Temporary server issues
            ApiError::Http { status, .. } if *status == 429 => LogLevel::Debug,
            ApiError::Http { status, .. } if (500..=599).contains(status) => LogLevel::Warn,

            // Critical: Auth, malformed responses
            ApiError::Http { status, .. } if *status == 401 => LogLevel::Error,
            ApiError::Http { status, .. } if *status == 403 => LogLevel::Error,
            ApiError::Decode(_) => LogLevel::Error,

            // Network issues - usually temporary
            _ => LogLevel::Warn,
        }
    }

    pub fn classify_script_error(&self, error: &ScriptError) -> LogLevel {
        match error {
            // Temporary transport issues, surfaced as a degraded widget state
            ScriptError::Fetch(_) => LogLevel::Warn,
            ScriptError::Timeout(_) => LogLevel::Warn,
        }
    }

    pub fn classify_resolve_error(&self, error: &ResolveError) -> LogLevel {
        match error {
            // Misconfiguration: the visualization catalog is wired wrong
            ResolveError::UnknownType(_) => LogLevel::Error,
            ResolveError::UnknownImporter(_) => LogLevel::Error,
            ResolveError::NotAConstructor(_) => LogLevel::Error,
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}
