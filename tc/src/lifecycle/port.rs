//! Automation port
//!
//! The external worker that drives the actual checkout automation and looks
//! up shipping rates. The core only ever talks to it through this trait, so
//! the worker can be swapped for a dry-run logger or a test fake.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{RateQuote, Site, Task};

/// Errors from the automation port
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("Automation worker unavailable: {0}")]
    Unavailable(String),

    #[error("Rate fetch failed: {0}")]
    FetchFailed(String),
}

/// Delays handed to the worker when tasks start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Delays {
    /// Milliseconds between monitor polls
    pub monitor_ms: u64,
    /// Milliseconds to wait after an error
    pub error_ms: u64,
}

/// Options sent with a start command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StartOptions {
    pub delays: Delays,
}

/// Shipping-rate lookup request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRequest {
    pub profile_id: String,
    pub site: Site,
    pub product: String,
}

/// Shipping-rate lookup response; either field may be missing on a partial fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RateResponse {
    #[serde(default)]
    pub rates: Vec<RateQuote>,
    #[serde(default)]
    pub selected_rate: Option<RateQuote>,
}

/// Capability to command the automation worker
///
/// Start and stop are fire-and-forget: returning Ok means the command was
/// handed over, not that the worker acted on it.
#[async_trait]
pub trait AutomationPort: Send + Sync {
    /// Register the proxy list used by subsequently started tasks
    fn register_proxies(&self, proxies: &[String]) -> Result<(), PortError>;

    /// Start the given tasks
    fn start(&self, tasks: &[Task], options: &StartOptions) -> Result<(), PortError>;

    /// Stop the given tasks
    fn stop(&self, tasks: &[Task]) -> Result<(), PortError>;

    /// Look up shipping rates for a profile at a site
    async fn fetch_shipping_rates(&self, request: RateRequest) -> Result<RateResponse, PortError>;
}

/// Dry-run port that only logs what it is asked to do
#[derive(Debug, Default)]
pub struct LoggingPort;

#[async_trait]
impl AutomationPort for LoggingPort {
    fn register_proxies(&self, proxies: &[String]) -> Result<(), PortError> {
        debug!(count = proxies.len(), "LoggingPort::register_proxies: called");
        Ok(())
    }

    fn start(&self, tasks: &[Task], options: &StartOptions) -> Result<(), PortError> {
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        info!(?ids, monitor_ms = options.delays.monitor_ms, error_ms = options.delays.error_ms, "Start requested");
        Ok(())
    }

    fn stop(&self, tasks: &[Task]) -> Result<(), PortError> {
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        info!(?ids, "Stop requested");
        Ok(())
    }

    async fn fetch_shipping_rates(&self, request: RateRequest) -> Result<RateResponse, PortError> {
        debug!(profile_id = %request.profile_id, site = %request.site.url, "LoggingPort::fetch_shipping_rates: called");
        Err(PortError::Unavailable("dry-run port does not fetch rates".to_string()))
    }
}

/// A command observed by [`RecordingPort`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortCall {
    RegisterProxies(Vec<String>),
    Start { ids: Vec<String>, options: StartOptions },
    Stop { ids: Vec<String> },
    Fetch(RateRequest),
}

/// In-memory port that records every command, for tests
///
/// Fetches pop scripted responses in order; with nothing scripted they fail.
#[derive(Debug, Default)]
pub struct RecordingPort {
    calls: Mutex<Vec<PortCall>>,
    responses: Mutex<VecDeque<Result<RateResponse, PortError>>>,
    offline: bool,
}

impl RecordingPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// A port whose start/stop/register commands all fail
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    /// Queue the result of the next fetch
    pub fn push_response(&self, response: Result<RateResponse, PortError>) {
        lock(&self.responses).push_back(response);
    }

    /// Everything recorded so far
    pub fn calls(&self) -> Vec<PortCall> {
        lock(&self.calls).clone()
    }

    /// Ids of every start command, in order
    pub fn started(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PortCall::Start { ids, .. } => Some(ids),
                _ => None,
            })
            .collect()
    }

    /// Ids of every stop command, in order
    pub fn stopped(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PortCall::Stop { ids } => Some(ids),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: PortCall) -> Result<(), PortError> {
        lock(&self.calls).push(call);
        if self.offline {
            return Err(PortError::Unavailable("offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AutomationPort for RecordingPort {
    fn register_proxies(&self, proxies: &[String]) -> Result<(), PortError> {
        self.record(PortCall::RegisterProxies(proxies.to_vec()))
    }

    fn start(&self, tasks: &[Task], options: &StartOptions) -> Result<(), PortError> {
        self.record(PortCall::Start {
            ids: tasks.iter().map(|t| t.id.clone()).collect(),
            options: options.clone(),
        })
    }

    fn stop(&self, tasks: &[Task]) -> Result<(), PortError> {
        self.record(PortCall::Stop {
            ids: tasks.iter().map(|t| t.id.clone()).collect(),
        })
    }

    async fn fetch_shipping_rates(&self, request: RateRequest) -> Result<RateResponse, PortError> {
        lock(&self.calls).push(PortCall::Fetch(request));
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Err(PortError::FetchFailed("no scripted response".to_string())))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
