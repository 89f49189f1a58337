//! Configuration for the kanban client.
//!
//! Layered, highest priority first:
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/kanban/config.toml`)
//! 4. Compiled defaults
//!
//! A missing default config file is not an error. An explicit `--config`
//! path that doesn't exist is.

use std::path::PathBuf;
use std::time::Duration;

use crate::locks::LockConfig;
use crate::push::PushConfig;

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
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    session: SessionFileConfig,
    locks: LocksFileConfig,
    network: NetworkFileConfig,
}

/// `[server]`
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    api_url: Option<String>,
    push_url: Option<String>,
    request_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
}

/// `[session]`
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    token: Option<String>,
}

/// `[locks]`
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LocksFileConfig {
    lease_secs: Option<u64>,
    renew_secs: Option<u64>,
}

/// `[network]`
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NetworkFileConfig {
    channel_capacity: Option<usize>,
    reconnect_delay_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API, e.g. `http://localhost:8080/api`.
    pub api_url: String,
    /// WebSocket URL of the push channel.
    pub push_url: String,
    /// Bearer token from a previous login.
    pub token: Option<String>,
    /// Timeout for one REST request.
    pub request_timeout: Duration,
    /// Timeout for the push channel handshake.
    pub connect_timeout: Duration,
    /// Capacity of the push channel queues.
    pub channel_capacity: usize,
    /// First push reconnect delay.
    pub reconnect_delay: Duration,
    /// How long a remote edit lock stays live without renewal.
    pub lock_lease: Duration,
    /// How often open local editors are re-announced.
    pub lock_renew_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let locks = LockConfig::default();
        Self {
            api_url: "http://localhost:8080/api".to_string(),
            push_url: "ws://localhost:8080/ws".to_string(),
            token: None,
            request_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            channel_capacity: 256,
            reconnect_delay: Duration::from_secs(1),
            lock_lease: locks.lease,
            lock_renew_interval: locks.renew_interval,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read,
    /// or if any config file cannot be parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            api_url: cli
                .api_url
                .clone()
                .or_else(|| file.server.api_url.clone())
                .unwrap_or(defaults.api_url),
            push_url: cli
                .push_url
                .clone()
                .or_else(|| file.server.push_url.clone())
                .unwrap_or(defaults.push_url),
            token: cli.token.clone().or_else(|| file.session.token.clone()),
            request_timeout: file
                .server
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            connect_timeout: file
                .server
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            channel_capacity: file
                .network
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
            reconnect_delay: file
                .network
                .reconnect_delay_secs
                .map_or(defaults.reconnect_delay, Duration::from_secs),
            lock_lease: file
                .locks
                .lease_secs
                .map_or(defaults.lock_lease, Duration::from_secs),
            lock_renew_interval: file
                .locks
                .renew_secs
                .map_or(defaults.lock_renew_interval, Duration::from_secs),
        }
    }

    /// Lease timing for the edit-lock channel.
    #[must_use]
    pub const fn lock_config(&self) -> LockConfig {
        LockConfig {
            lease: self.lock_lease,
            renew_interval: self.lock_renew_interval,
        }
    }

    /// Push channel settings, carrying the session token.
    #[must_use]
    pub fn push_config(&self, token: Option<String>) -> PushConfig {
        PushConfig {
            url: self.push_url.clone(),
            token,
            connect_timeout: self.connect_timeout,
            channel_capacity: self.channel_capacity,
            reconnect_delay: self.reconnect_delay,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Collaborative kanban board client")]
pub struct CliArgs {
    /// Base URL of the board REST API.
    #[arg(long, env = "KANBAN_API_URL")]
    pub api_url: Option<String>,

    /// WebSocket URL of the push channel.
    #[arg(long, env = "KANBAN_PUSH_URL")]
    pub push_url: Option<String>,

    /// Bearer token from a previous login.
    #[arg(long, env = "KANBAN_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Path to config file (default: `~/.config/kanban/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "KANBAN_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/kanban.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands of the `kanban` binary.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create an account and print its token.
    Register {
        /// Display name.
        username: String,
        /// Account e-mail.
        email: String,
        /// Account password.
        #[arg(long, env = "KANBAN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Log in and print the issued token.
    Login {
        /// Account e-mail.
        email: String,
        /// Account password.
        #[arg(long, env = "KANBAN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Print your profile, or change name and e-mail.
    Profile {
        /// New display name.
        #[arg(long)]
        username: Option<String>,
        /// New e-mail.
        #[arg(long)]
        email: Option<String>,
    },
    /// List visible boards.
    Boards,
    /// Create a board.
    CreateBoard {
        /// Board title.
        title: String,
    },
    /// Print a board's columns and tasks.
    Show {
        /// Board id.
        board: String,
    },
    /// Append a column.
    AddColumn {
        /// Board id.
        board: String,
        /// Column title.
        title: String,
    },
    /// Rename a column.
    RenameColumn {
        /// Board id.
        board: String,
        /// Column id.
        column: String,
        /// New title.
        title: String,
    },
    /// Move a column to a new position.
    MoveColumn {
        /// Board id.
        board: String,
        /// Column id.
        column: String,
        /// Zero-based target position.
        index: usize,
    },
    /// Delete a column and its tasks.
    DeleteColumn {
        /// Board id.
        board: String,
        /// Column id.
        column: String,
    },
    /// Add a task at the end of a column.
    AddTask {
        /// Board id.
        board: String,
        /// Column id.
        column: String,
        /// Task title.
        title: String,
        /// Task description.
        #[arg(long, default_value = "")]
        description: String,
        /// low, medium or high.
        #[arg(long, default_value = "medium")]
        priority: String,
        /// Label; repeat for several.
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Edit a task's fields while holding its edit lock.
    EditTask {
        /// Board id.
        board: String,
        /// Task id.
        task: String,
        /// New title.
        #[arg(long)]
        title: Option<String>,
        /// New description.
        #[arg(long)]
        description: Option<String>,
        /// New priority (low, medium, high).
        #[arg(long)]
        priority: Option<String>,
        /// New card colour, e.g. `#F0EE96`.
        #[arg(long)]
        color: Option<String>,
    },
    /// Move a task to another column.
    MoveTask {
        /// Board id.
        board: String,
        /// Task id.
        task: String,
        /// Destination column id.
        to: String,
    },
    /// Move a task to a position within its column.
    ReorderTask {
        /// Board id.
        board: String,
        /// Task id.
        task: String,
        /// Zero-based target position.
        index: usize,
    },
    /// Delete a task.
    DeleteTask {
        /// Board id.
        board: String,
        /// Task id.
        task: String,
    },
    /// Find tasks in a column by title.
    Search {
        /// Board id.
        board: String,
        /// Column id.
        column: String,
        /// Case-insensitive title fragment.
        query: String,
    },
    /// Comment on a task.
    Comment {
        /// Board id.
        board: String,
        /// Task id.
        task: String,
        /// Comment text.
        text: String,
    },
    /// Toggle your like on a task.
    Like {
        /// Board id.
        board: String,
        /// Task id.
        task: String,
    },
    /// Toggle your dislike on a task.
    Dislike {
        /// Board id.
        board: String,
        /// Task id.
        task: String,
    },
    /// Share a board with another user.
    Share {
        /// Board id.
        board: String,
        /// Invitee e-mail.
        email: String,
    },
    /// Delete a board you own.
    DeleteBoard {
        /// Board id.
        board: String,
    },
    /// Follow edit-lock events until Ctrl-C.
    Watch,
}

/// Load and parse a TOML config file.
///
/// An explicit path must exist. Without one, the default path is tried and a
/// missing file yields an empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("kanban").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
