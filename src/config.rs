use serde::Deserialize;
use std::time::Duration;

use crate::connection::ConnectionConfig;
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::session::SessionConfig;
use crate::tracker::DEFAULT_COMMAND_TIMEOUT_MS;
use crate::view::DEFAULT_SELF_CONTAINER_MARKER;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionSettings {
    /// Server host and port, e.g. "localhost:8080".
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Use wss:// instead of ws://.
    #[serde(default)]
    pub secure: bool,
    /// Full endpoint URL; overrides host/path/secure when set.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Max session events buffered per observer (slow observers skip events).
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

fn default_host() -> String {
    "localhost:8080".into()
}

fn default_path() -> String {
    "/ws".into()
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_event_capacity() -> usize {
    64
}

fn default_command_capacity() -> usize {
    16
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            path: default_path(),
            secure: false,
            url: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            event_capacity: default_event_capacity(),
            command_capacity: default_command_capacity(),
        }
    }
}

impl ConnectionSettings {
    /// Endpoint URL: `url` if set, else `ws[s]://{host}{path}`.
    pub fn endpoint_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}{}", scheme, self.host, self.path)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Samples kept per trend series.
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandsConfig {
    /// How long a command stays pending without an observed state change.
    #[serde(default = "default_command_timeout_ms")]
    pub timeout_ms: u64,
    /// Name/image substring of the dashboard's own container (offered restart, never stop).
    #[serde(default = "default_self_container_marker")]
    pub self_container_marker: String,
}

fn default_command_timeout_ms() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_MS
}

fn default_self_container_marker() -> String {
    DEFAULT_SELF_CONTAINER_MARKER.into()
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_command_timeout_ms(),
            self_container_marker: default_self_container_marker(),
        }
    }
}

impl AppConfig {
    /// Load from `CONFIG_FILE` (default `config.toml`). A missing file means defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        match std::fs::read_to_string(&path) {
            Ok(s) => Self::load_from_str(&s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path, "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!("reading {}: {}", path, e)),
        }
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let conn = &self.connection;
        anyhow::ensure!(
            !conn.host.is_empty(),
            "connection.host must be non-empty"
        );
        anyhow::ensure!(
            conn.path.starts_with('/'),
            "connection.path must start with '/', got {:?}",
            conn.path
        );
        if let Some(url) = &conn.url {
            anyhow::ensure!(
                url.starts_with("ws://") || url.starts_with("wss://"),
                "connection.url must use ws:// or wss://, got {:?}",
                url
            );
        }
        anyhow::ensure!(
            cfg!(feature = "tls") || !conn.endpoint_url().starts_with("wss://"),
            "wss:// endpoints need the `tls` feature"
        );
        anyhow::ensure!(
            conn.reconnect_delay_ms > 0,
            "connection.reconnect_delay_ms must be > 0, got {}",
            conn.reconnect_delay_ms
        );
        anyhow::ensure!(
            conn.event_capacity > 0,
            "connection.event_capacity must be > 0, got {}",
            conn.event_capacity
        );
        anyhow::ensure!(
            conn.command_capacity > 0,
            "connection.command_capacity must be > 0, got {}",
            conn.command_capacity
        );
        anyhow::ensure!(
            self.history.capacity > 0,
            "history.capacity must be > 0, got {}",
            self.history.capacity
        );
        anyhow::ensure!(
            self.commands.timeout_ms > 0,
            "commands.timeout_ms must be > 0, got {}",
            self.commands.timeout_ms
        );
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            history_capacity: self.history.capacity,
            command_timeout_ms: self.commands.timeout_ms,
            reconnect_delay: Duration::from_millis(self.connection.reconnect_delay_ms),
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.connection.endpoint_url(),
            session: self.session_config(),
            event_capacity: self.connection.event_capacity,
            command_capacity: self.connection.command_capacity,
        }
    }
}
