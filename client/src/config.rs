//! Configuration management for the workshop sync client.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use workshop_sync_core::backoff::ReconnectPolicy;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Workshop server REST API
    pub api: ApiConfig,
    /// Push channel
    pub push: PushConfig,
    /// Polling bridge
    pub polling: PollingConfig,
    /// Logging and metrics
    pub observability: ObservabilityConfig,
}

/// REST API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL, e.g. `http://localhost:8000/api`
    pub base_url: String,
    /// Bearer token sent with every request
    pub token: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Push channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// WebSocket URL
    pub url: String,
    /// Liveness probe period in seconds
    pub ping_interval_secs: u64,
    /// First reconnect delay in milliseconds
    pub reconnect_base_ms: u64,
    /// Reconnect delay ceiling in milliseconds
    pub reconnect_max_ms: u64,
    /// Reconnect attempts before giving up
    pub reconnect_max_attempts: u32,
    /// Jitter as a fraction of the delay
    pub reconnect_jitter: f64,
}

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Period of the full refresh in seconds
    pub interval_secs: u64,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `tracing` filter used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Prometheus exporter address; no exporter when unset
    pub metrics_addr: Option<String>,
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparseable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig {
                base_url: env::var("WORKSHOP_API_URL")
                    .unwrap_or_else(|_| "http://localhost:8000/api".to_string()),
                token: env::var("WORKSHOP_API_TOKEN").ok().filter(|t| !t.is_empty()),
                timeout_secs: env::var("WORKSHOP_API_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            push: PushConfig {
                url: env::var("WORKSHOP_WS_URL")
                    .unwrap_or_else(|_| "ws://localhost:8000/ws".to_string()),
                ping_interval_secs: env::var("PUSH_PING_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
                reconnect_base_ms: env::var("PUSH_RECONNECT_BASE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1_000),
                reconnect_max_ms: env::var("PUSH_RECONNECT_MAX_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30_000),
                reconnect_max_attempts: env::var("PUSH_RECONNECT_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
                reconnect_jitter: env::var("PUSH_RECONNECT_JITTER")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0.25),
            },
            polling: PollingConfig {
                interval_secs: env::var("POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            observability: ObservabilityConfig {
                log_filter: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "workshop_sync_client=info,workshop_sync_runtime=info,workshop_sync_core=info,workshop_watch=info".to_string()),
                metrics_addr: env::var("METRICS_ADDR").ok().filter(|a| !a.is_empty()),
            },
        }
    }

    /// Reconnect policy described by the push settings
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::builder()
            .initial_delay(Duration::from_millis(self.push.reconnect_base_ms))
            .max_delay(Duration::from_millis(self.push.reconnect_max_ms))
            .max_attempts(self.push.reconnect_max_attempts)
            .jitter_ratio(self.push.reconnect_jitter)
            .build()
    }

    /// Liveness probe period, at least one second
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.push.ping_interval_secs.max(1))
    }

    /// Full refresh period, at least one second
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_secs.max(1))
    }

    /// API request timeout
    #[must_use]
    pub const fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
