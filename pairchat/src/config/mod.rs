//! Configuration for the `pairchat` binary.
//!
//! Values are layered with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/pairchat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chatlog::DEFAULT_CHAT_LOG_DIR;
use crate::session::{DEFAULT_TIMESTAMP_FORMAT, SessionConfig};
use crate::theme::{TextColor, UnknownColor};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// `[ui] color` names no known colour.
    #[error("invalid [ui] color: {0}")]
    InvalidColor(#[from] UnknownColor),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    user: UserFileConfig,
    session: SessionFileConfig,
    ui: UiFileConfig,
    chat_log: ChatLogFileConfig,
}

/// `[user]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UserFileConfig {
    name: Option<String>,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    poll_interval_ms: Option<u64>,
    drain_timeout_secs: Option<u64>,
    event_buffer: Option<usize>,
    input_buffer: Option<usize>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    timestamp_format: Option<String>,
    color: Option<String>,
}

/// `[chat_log]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatLogFileConfig {
    dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Username to log in as; prompted for when absent.
    pub username: Option<String>,

    // -- Session --
    /// Tick of every channel loop.
    pub poll_interval: Duration,
    /// Bound on how long removal waits for a contact's loops.
    pub drain_timeout: Duration,
    /// Capacity of the session event channel.
    pub event_buffer: usize,
    /// Capacity of the stdin line channel.
    pub input_buffer: usize,

    // -- UI --
    /// Timestamp format string (chrono) for sent and echoed lines.
    pub timestamp_format: String,
    /// Initial text colour.
    pub color: TextColor,

    // -- Chat log --
    /// Directory chat logs are saved to.
    pub chat_log_dir: PathBuf,

    /// Names of built-in peers that echo every message back.
    pub echo_peers: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            username: None,
            poll_interval: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(5),
            event_buffer: 256,
            input_buffer: 64,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            color: TextColor::default(),
            chat_log_dir: PathBuf::from(DEFAULT_CHAT_LOG_DIR),
            echo_peers: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. Otherwise the default path is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed,
    /// or if it names an unknown colour.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Separated from `load()` so it can be
    /// tested without CLI parsing.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let color = match &file.ui.color {
            Some(name) => name.parse()?,
            None => defaults.color,
        };

        Ok(Self {
            username: cli.username.clone().or_else(|| file.user.name.clone()),
            poll_interval: cli
                .poll_interval_ms
                .or(file.session.poll_interval_ms)
                .map_or(defaults.poll_interval, Duration::from_millis),
            drain_timeout: file
                .session
                .drain_timeout_secs
                .map_or(defaults.drain_timeout, Duration::from_secs),
            event_buffer: file
                .session
                .event_buffer
                .unwrap_or(defaults.event_buffer),
            input_buffer: file
                .session
                .input_buffer
                .unwrap_or(defaults.input_buffer),
            timestamp_format: cli
                .timestamp_format
                .clone()
                .or_else(|| file.ui.timestamp_format.clone())
                .unwrap_or(defaults.timestamp_format),
            color,
            chat_log_dir: cli
                .chat_log_dir
                .clone()
                .or_else(|| file.chat_log.dir.clone())
                .unwrap_or(defaults.chat_log_dir),
            echo_peers: cli.echo_peer.clone(),
        })
    }

    /// Session settings for a [`crate::session::SessionRegistry`].
    #[must_use]
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            poll_interval: self.poll_interval,
            drain_timeout: self.drain_timeout,
            event_buffer: self.event_buffer,
            timestamp_format: self.timestamp_format.clone(),
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Chat with several contacts over a shared topic bus")]
pub struct CliArgs {
    /// Username to log in as (prompted for if omitted).
    #[arg(short, long, env = "PAIRCHAT_USER")]
    pub username: Option<String>,

    /// Path to config file (default: `~/.config/pairchat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Channel loop tick in milliseconds.
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Timestamp format (chrono format string).
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Directory chat logs are saved to (default: `./ChatLogs`).
    #[arg(long)]
    pub chat_log_dir: Option<PathBuf>,

    /// Start a built-in peer with this name that echoes messages back.
    /// May be repeated.
    #[arg(long = "echo-peer", value_name = "NAME")]
    pub echo_peer: Vec<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "PAIRCHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/pairchat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    // No config dir available means defaults.
    let Some(path) = default_config_path() else {
        return Ok(ConfigFile::default());
    };
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pairchat").join("config.toml"))
}
