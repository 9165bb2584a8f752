use std::env;
#[cfg(test)]
use std::sync::Mutex;
use std::time::Duration;

/// Hottakes client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base address of the takes API (defaults to "http://127.0.0.1:8000")
    pub api_base: String,
    /// Page size requested from the takes listing
    pub page_size: u32,
    /// Optional pre-provisioned session token attached to requests
    pub session_token: Option<String>,
    /// Push-connection timing knobs
    pub connection: ConnectionConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let api_base = env::var("HOTTAKES_API_BASE")
            .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string());
        let session_token = env::var("HOTTAKES_SESSION_TOKEN")
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Self {
            api_base,
            session_token,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8000".to_string(),
            page_size: 20,
            session_token: None,
            connection: ConnectionConfig::default(),
        }
    }
}

/// Timing knobs for the push connection. Production values are fixed;
/// tests shrink them to keep runtimes short.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    pub heartbeat_interval: Duration,
    pub reconnect_base: Duration,
    pub max_reconnect_attempts: u32,
}

impl ConnectionConfig {
    /// Backoff before reconnect attempt number `attempt` (zero-based):
    /// `reconnect_base * 2^attempt`.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        self.reconnect_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            reconnect_base: Duration::from_millis(1000),
            max_reconnect_attempts: 5,
        }
    }
}
