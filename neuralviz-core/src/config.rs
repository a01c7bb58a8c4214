//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/neuralviz/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/neuralviz/` (~/.config/neuralviz/)
//! - State/Logs: `$XDG_STATE_HOME/neuralviz/` (~/.local/state/neuralviz/)
//!
//! A handful of environment variables override the file after loading
//! (`PORT`, `DEPLOY_MODE`, `NEURAL_VIZ_API_KEY`), see [`Config::apply_env`].

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// HTTP/WebSocket server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Local session-log watcher
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Force simulation constants
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Initial node placement
    #[serde(default)]
    pub placement: PlacementConfig,

    /// Content truncation limits
    #[serde(default)]
    pub content: ContentConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Remote bridge client
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Where the server runs, which decides whether ingest needs auth
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// Single-user machine; no bearer token checks, local watcher on
    #[default]
    Local,
    /// Publicly reachable; bearer token required, local watcher off
    Remote,
}

impl DeployMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployMode::Local => "local",
            DeployMode::Remote => "remote",
        }
    }
}

impl std::str::FromStr for DeployMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(DeployMode::Local),
            "remote" => Ok(DeployMode::Remote),
            other => Err(format!("unknown deploy mode: {}", other)),
        }
    }
}

impl std::fmt::Display for DeployMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub deploy_mode: DeployMode,

    /// Shared secret for `Authorization: Bearer` (remote mode)
    pub api_key: Option<String>,

    /// Directory holding the built viewer, served at `/`
    pub static_dir: Option<PathBuf>,

    /// Capacity of the viewer broadcast channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Seconds between WebSocket pings
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            deploy_mode: DeployMode::Local,
            api_key: None,
            static_dir: None,
            channel_capacity: default_channel_capacity(),
            ping_interval_secs: default_ping_interval(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4800
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_ping_interval() -> u64 {
    30
}

/// Local session-log watcher configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WatcherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Override for `~/.claude/projects`
    pub projects_path: Option<PathBuf>,

    /// Quiet period before a burst of writes is read
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Read files that already exist at startup from the beginning
    #[serde(default = "default_true")]
    pub replay_existing: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            projects_path: None,
            debounce_ms: default_debounce_ms(),
            replay_existing: true,
        }
    }
}

impl WatcherConfig {
    /// Resolved directory to watch
    pub fn projects_dir(&self) -> PathBuf {
        self.projects_path
            .clone()
            .unwrap_or_else(Config::default_projects_dir)
    }
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    300
}

/// Force simulation constants
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LayoutConfig {
    /// Milliseconds between layout ticks
    pub tick_ms: u64,
    /// Broadcast a positions frame every N ticks
    pub broadcast_every: u64,
    pub repulsion: f64,
    pub attraction: f64,
    pub gravity: f64,
    pub damping: f64,
    pub max_velocity: f64,
    pub min_distance: f64,
    pub orbit_radius: f64,
    pub containment: f64,
    /// Ticks between jitter kicks (0 disables)
    pub jitter_interval: u64,
    pub jitter_strength: f64,
    pub pulse_speed: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            tick_ms: 16,
            broadcast_every: 4,
            repulsion: 800.0,
            attraction: 0.01,
            gravity: 0.02,
            damping: 0.92,
            max_velocity: 4.0,
            min_distance: 20.0,
            orbit_radius: 80.0,
            containment: 0.03,
            jitter_interval: 120,
            jitter_strength: 0.3,
            pulse_speed: 0.008,
        }
    }
}

/// Initial node placement
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PlacementConfig {
    pub column_spacing: f64,
    pub sibling_spacing: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            column_spacing: 140.0,
            sibling_spacing: 60.0,
        }
    }
}

/// Content truncation limits
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ContentConfig {
    /// Max characters of node content before the ellipsis
    pub max_chars: usize,
    /// Max characters of an agent description in its label
    pub label_chars: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            max_chars: 2000,
            label_chars: 40,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,

    /// Also log to stderr
    #[serde(default = "default_true")]
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
            console: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Bridge client configuration
///
/// The bridge forwards local session-log lines to a remote server's
/// `/api/bridge` endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_url")]
    pub server_url: String,

    /// Bearer token for the remote server
    pub api_key: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_bridge_timeout")]
    pub timeout_secs: u64,

    /// Max retry attempts for transient failures
    #[serde(default = "default_bridge_max_retries")]
    pub max_retries: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            server_url: default_bridge_url(),
            api_key: None,
            timeout_secs: default_bridge_timeout(),
            max_retries: default_bridge_max_retries(),
        }
    }
}

fn default_bridge_url() -> String {
    "http://localhost:4800".to_string()
}

fn default_bridge_timeout() -> u64 {
    30
}

fn default_bridge_max_retries() -> usize {
    3
}

impl Config {
    /// Load configuration from the default path, then apply env overrides
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Apply `PORT`, `DEPLOY_MODE` and `NEURAL_VIZ_API_KEY`.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT") {
            match port.trim().parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid PORT"),
            }
        }

        if let Some(mode) = lookup("DEPLOY_MODE") {
            match mode.parse() {
                Ok(m) => self.server.deploy_mode = m,
                Err(e) => tracing::warn!(error = %e, "Ignoring invalid DEPLOY_MODE"),
            }
        }

        if let Some(key) = lookup("NEURAL_VIZ_API_KEY").filter(|k| !k.is_empty()) {
            self.server.api_key = Some(key);
        }
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.server.deploy_mode == DeployMode::Remote && self.server.api_key.is_none() {
            return Err(Error::Config(
                "server.api_key (or NEURAL_VIZ_API_KEY) is required in remote mode".to_string(),
            ));
        }
        if self.layout.tick_ms == 0 {
            return Err(Error::Config("layout.tick_ms must be positive".to_string()));
        }
        if !(self.layout.damping > 0.0 && self.layout.damping < 1.0) {
            return Err(Error::Config(
                "layout.damping must be between 0 and 1 (exclusive)".to_string(),
            ));
        }
        // Repulsion divides by the floored distance
        if !(self.layout.min_distance > 0.0) {
            return Err(Error::Config(
                "layout.min_distance must be positive".to_string(),
            ));
        }
        if !(self.layout.max_velocity > 0.0) {
            return Err(Error::Config(
                "layout.max_velocity must be positive".to_string(),
            ));
        }
        if !(self.layout.orbit_radius >= 0.0) {
            return Err(Error::Config(
                "layout.orbit_radius must not be negative".to_string(),
            ));
        }
        if self.server.channel_capacity == 0 {
            return Err(Error::Config(
                "server.channel_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/neuralviz/config.toml` (~/.config/neuralviz/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("neuralviz").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/neuralviz/` (~/.local/state/neuralviz/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("neuralviz")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/neuralviz/neuralviz.log` (~/.local/state/neuralviz/neuralviz.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("neuralviz.log")
    }

    /// Where Claude Code writes its session logs (`~/.claude/projects`)
    pub fn default_projects_dir() -> PathBuf {
        home_dir().join(".claude").join("projects")
    }
}
