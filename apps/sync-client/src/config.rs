use std::time::Duration;

/// Engine configuration, loaded from environment variables.
///
/// Every setting has a default suitable for a local deployment; the URLs are
/// the two knobs that change between environments.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Synapse REST API (e.g. `http://localhost:4000`).
    pub api_url: String,
    /// Base URL of the real-time gateway (e.g. `ws://localhost:4000/gateway`).
    pub gateway_url: String,
    /// Timeout applied to every REST request.
    pub request_timeout: Duration,
    /// How long the gateway handshake may take before it counts as a failure.
    pub handshake_timeout: Duration,
    /// Reconnect attempts after a failure or drop before giving up.
    pub reconnect_max_attempts: u32,
    /// Base delay between reconnect attempts (doubled per attempt, jittered).
    pub reconnect_base_delay: Duration,
    /// Interval between client heartbeats on the gateway connection.
    pub heartbeat_interval: Duration,
    /// A connection with no inbound traffic for this long is treated as dead.
    pub silent_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            api_url: env_or("SYNAPSE_API_URL", "http://localhost:4000"),
            gateway_url: env_or("SYNAPSE_GATEWAY_URL", "ws://localhost:4000/gateway"),
            request_timeout: env_secs("SYNAPSE_REQUEST_TIMEOUT_SECS", 10),
            handshake_timeout: env_secs("SYNAPSE_HANDSHAKE_TIMEOUT_SECS", 10),
            reconnect_max_attempts: env_parse("SYNAPSE_RECONNECT_ATTEMPTS", 5),
            reconnect_base_delay: env_millis("SYNAPSE_RECONNECT_DELAY_MS", 1000),
            heartbeat_interval: env_secs("SYNAPSE_HEARTBEAT_SECS", 30),
            silent_timeout: env_secs("SYNAPSE_SILENT_TIMEOUT_SECS", 90),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:4000".to_string(),
            gateway_url: "ws://localhost:4000/gateway".to_string(),
            request_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            reconnect_max_attempts: 5,
            reconnect_base_delay: Duration::from_millis(1000),
            heartbeat_interval: Duration::from_secs(30),
            silent_timeout: Duration::from_secs(90),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(env_parse(name, default))
}

fn env_millis(name: &str, default: u64) -> Duration {
    Duration::from_millis(env_parse(name, default))
}
