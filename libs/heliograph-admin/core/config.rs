//! SDK configuration and credentials

use crate::traits::{FixedDelay, ReconnectionStrategy};
use serde::Serialize;
use std::time::Duration;

/// Default service endpoint for production deployments
pub const SDK_DOMAIN: &str = "wss://sync.heliograph.io";

/// Service endpoint used by a locally running Heliograph stack
pub const DEV_SDK_DOMAIN: &str = "ws://localhost:8002";

/// Project credentials sent once per physical connection as the
/// verification handshake payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCredentials {
    pub project_id: String,
    pub project_key: String,
}

impl AdminCredentials {
    pub fn new(project_id: impl Into<String>, project_key: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            project_key: project_key.into(),
        }
    }
}

/// Configuration for the admin session
///
/// The readiness gate defaults (500ms polls, 20 polls) give callers a 10
/// second ceiling while the session is mid-handshake. Both are tunable so
/// deployments behind slow links can stretch the ceiling.
pub struct SdkConfig {
    /// WebSocket endpoint of the Heliograph service (ws:// or wss://)
    pub domain: String,
    /// Send the admin flag as a connect query parameter so the service can
    /// distinguish this session type
    pub admin_connection: bool,
    /// Interval between readiness polls while the session is `Connecting`
    pub ready_poll_interval: Duration,
    /// Number of polls before the readiness gate forces `Failed`
    pub ready_poll_limit: u32,
    /// Re-dial policy after a physical disconnect
    pub reconnect_strategy: Box<dyn ReconnectionStrategy>,
    /// Extra delay applied after a disconnect, before the strategy delay
    pub reconnection_delay_offset: Duration,
}

impl SdkConfig {
    /// Configuration pointing at the production service
    pub fn new() -> Self {
        Self::with_domain(SDK_DOMAIN)
    }

    /// Configuration pointing at a local development stack
    pub fn development() -> Self {
        Self::with_domain(DEV_SDK_DOMAIN)
    }

    /// Configuration pointing at an arbitrary endpoint
    pub fn with_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            admin_connection: true,
            ready_poll_interval: Duration::from_millis(500),
            ready_poll_limit: 20,
            reconnect_strategy: Box::new(FixedDelay::new(Duration::from_secs(1), None)),
            reconnection_delay_offset: Duration::ZERO,
        }
    }

    pub fn ready_poll(mut self, interval: Duration, limit: u32) -> Self {
        self.ready_poll_interval = interval;
        self.ready_poll_limit = limit;
        self
    }

    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Box::new(strategy);
        self
    }

    pub fn reconnection_delay_offset(mut self, offset: Duration) -> Self {
        self.reconnection_delay_offset = offset;
        self
    }

    /// Full connect URL including the admin query parameter
    pub fn connect_url(&self) -> String {
        let base = self.domain.trim_end_matches('/');
        if !self.admin_connection {
            return base.to_string();
        }
        if base.contains('?') {
            format!("{base}&isAdmin=true")
        } else {
            format!("{base}/?isAdmin=true")
        }
    }
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self::new()
    }
}
