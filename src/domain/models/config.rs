use serde::{Deserialize, Serialize};

/// Main configuration structure for the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub matcher: MatcherConfig,

    #[serde(default)]
    pub sweeper: SweeperConfig,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub bot: BotConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            matcher: MatcherConfig::default(),
            sweeper: SweeperConfig::default(),
            backoff: BackoffConfig::default(),
            bot: BotConfig::default(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8070
}

const fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port(), enable_cors: default_true() }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".swarmd/swarmd.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_database_path(), max_connections: default_max_connections() }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format(), log_dir: None }
    }
}

/// Dimension-matcher tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MatcherConfig {
    /// Maximum candidate `TaskToRun` rows scanned per poll.
    #[serde(default = "default_fanout")]
    pub candidate_fanout: usize,
    /// Maximum dimensions a task request may carry.
    #[serde(default = "default_max_dimensions")]
    pub max_dimensions: usize,
}

const fn default_fanout() -> usize {
    50
}

const fn default_max_dimensions() -> usize {
    super::dimensions::MAX_DIMENSIONS
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self { candidate_fanout: default_fanout(), max_dimensions: default_max_dimensions() }
    }
}

/// Sweeper cadence and the bot-death timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SweeperConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_bot_death_timeout_secs")]
    pub bot_death_timeout_secs: u64,
}

const fn default_sweep_interval_secs() -> u64 {
    60
}

const fn default_bot_death_timeout_secs() -> u64 {
    300
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval_secs(),
            bot_death_timeout_secs: default_bot_death_timeout_secs(),
        }
    }
}

/// Bot poll backoff knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackoffConfig {
    #[serde(default = "default_base_secs")]
    pub base_secs: u64,
    #[serde(default = "default_max_secs")]
    pub max_secs: u64,
}

const fn default_base_secs() -> u64 {
    1
}

const fn default_max_secs() -> u64 {
    60
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self { base_secs: default_base_secs(), max_secs: default_max_secs() }
    }
}

/// Bot poll protocol knobs: the server's own protocol version (a
/// mismatch tells a bot to self-update before polling again) and the
/// maximum a bot may run before it's told to restart on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BotConfig {
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
}

fn default_protocol_version() -> String {
    "1".to_string()
}

const fn default_max_lifetime_secs() -> u64 {
    24 * 60 * 60
}

impl Default for BotConfig {
    fn default() -> Self {
        Self { protocol_version: default_protocol_version(), max_lifetime_secs: default_max_lifetime_secs() }
    }
}
