//! Dynamic Script Loader
//!
//! Loads an external script resource exactly once per URL and tracks its
//! ready/failed state. The attached resource lives in a shared [`ScriptHost`]
//! (the stand-in for the document head); changing the URL or tearing the
//! loader down detaches the resource. Each load attempt carries a generation
//! token, and only the currently tracked generation may mutate state, so
//! completions from a replaced or removed script are ignored.

use crate::consts::engine_consts::script_loading;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;

#[cfg(test)]
use mockall::automock;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScriptError {
    #[error("Failed to fetch script: {0}")]
    Fetch(String),

    #[error("Timed out fetching script from {0}")]
    Timeout(String),
}

/// Transport for remote script bundles.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ScriptFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<(), ScriptError>;
}

/// Fetches script bundles over HTTP.
#[derive(Debug, Clone)]
pub struct HttpScriptFetcher {
    client: reqwest::Client,
}

impl HttpScriptFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::ClientBuilder::new()
                .timeout(script_loading::fetch_timeout())
                .build()
                .expect("Failed to create HTTP client"),
        }
    }
}

impl Default for HttpScriptFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ScriptFetcher for HttpScriptFetcher {
    async fn fetch(&self, url: &str) -> Result<(), ScriptError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ScriptError::Timeout(url.to_string())
                } else {
                    ScriptError::Fetch(e.to_string())
                }
            })?;
        response
            .error_for_status()
            .map_err(|e| ScriptError::Fetch(e.to_string()))?;
        Ok(())
    }
}

/// One attached script resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTag {
    pub id: u64,
    pub url: String,
}

/// Shared registry of attached script resources.
#[derive(Debug, Clone, Default)]
pub struct ScriptHost {
    tags: Arc<Mutex<Vec<ScriptTag>>>,
    next_id: Arc<AtomicU64>,
}

impl ScriptHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn attach(&self, url: &str) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut tags = self.tags.lock().expect("script host lock poisoned");
        tags.push(ScriptTag {
            id,
            url: url.to_string(),
        });
        id
    }

    fn detach(&self, id: u64) {
        let mut tags = self.tags.lock().expect("script host lock poisoned");
        tags.retain(|tag| tag.id != id);
    }

    /// URLs of every currently attached resource, in attach order.
    pub fn attached_urls(&self) -> Vec<String> {
        let tags = self.tags.lock().expect("script host lock poisoned");
        tags.iter().map(|tag| tag.url.clone()).collect()
    }
}

/// Observable load state of the tracked script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptStatus {
    pub ready: bool,
    pub failed: bool,
}

#[derive(Debug, Default)]
struct LoaderState {
    url: Option<String>,
    ready: bool,
    failed: bool,
    error: Option<ScriptError>,
    generation: u64,
    tag: Option<u64>,
}

pub struct ScriptLoader {
    host: ScriptHost,
    fetcher: Arc<dyn ScriptFetcher>,
    state: Arc<Mutex<LoaderState>>,
    task: Option<JoinHandle<()>>,
}

impl ScriptLoader {
    pub fn new(host: ScriptHost, fetcher: Arc<dyn ScriptFetcher>) -> Self {
        ScriptLoader {
            host,
            fetcher,
            state: Arc::new(Mutex::new(LoaderState::default())),
            task: None,
        }
    }

    /// Tracks a new URL. An empty or absent URL detaches any tracked script
    /// without starting a load. Changing to a different URL detaches the
    /// previous resource, resets state, and starts loading the new one.
    pub fn set_url(&mut self, url: Option<&str>) {
        let url = url.filter(|u| !u.is_empty());
        {
            let state = self.state.lock().expect("script loader lock poisoned");
            if state.url.as_deref() == url {
                return;
            }
        }

        self.cancel_current();

        let Some(url) = url else {
            let mut state = self.state.lock().expect("script loader lock poisoned");
            state.url = None;
            return;
        };

        let tag = self.host.attach(url);
        let generation = {
            let mut state = self.state.lock().expect("script loader lock poisoned");
            state.url = Some(url.to_string());
            state.tag = Some(tag);
            state.generation
        };

        let fetcher = self.fetcher.clone();
        let shared = self.state.clone();
        let owned_url = url.to_string();
        self.task = Some(tokio::spawn(async move {
            let result = fetcher.fetch(&owned_url).await;
            let mut state = shared.lock().expect("script loader lock poisoned");
            // A stale completion belongs to a script that has been replaced
            // or removed; it must have no observable effect.
            if state.generation != generation {
                return;
            }
            match result {
                Ok(()) => state.ready = true,
                Err(error) => {
                    state.failed = true;
                    state.error = Some(error);
                }
            }
        }));
    }

    pub fn status(&self) -> ScriptStatus {
        let state = self.state.lock().expect("script loader lock poisoned");
        ScriptStatus {
            ready: state.ready,
            failed: state.failed,
        }
    }

    pub fn url(&self) -> Option<String> {
        let state = self.state.lock().expect("script loader lock poisoned");
        state.url.clone()
    }

    /// The transport error behind a failed status, if any.
    pub fn error(&self) -> Option<ScriptError> {
        let state = self.state.lock().expect("script loader lock poisoned");
        state.error.clone()
    }

    /// Waits for the in-flight load, if any, to settle. Used by callers that
    /// drive the loader to completion rather than polling.
    pub async fn wait_for_completion(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Detaches the tracked script and invalidates any in-flight load.
    pub fn teardown(&mut self) {
        self.cancel_current();
        let mut state = self.state.lock().expect("script loader lock poisoned");
        state.url = None;
    }

    fn cancel_current(&mut self) {
        let tag = {
            let mut state = self.state.lock().expect("script loader lock poisoned");
            state.generation += 1;
            state.ready = false;
            state.failed = false;
            state.error = None;
            state.tag.take()
        };
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(tag) = tag {
            self.host.detach(tag);
        }
    }
}

impl Drop for ScriptLoader {
    fn drop(&mut self) {
        self.teardown();
    }
}
