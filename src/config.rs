// ⚙️ Configuration
// TOML file with CLI overrides. A missing file means defaults; a malformed
// one is an error rather than a silent fallback.

use crate::backup::default_backup_path;
use crate::error::{LedgerError, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "pocket-ledger.toml";
pub const DEFAULT_DATABASE_FILE: &str = "one-finance.db";

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Pre-migration backup target. Defaults to `<path>.bak`.
    #[serde(default)]
    pub backup_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_database_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_FILE)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: default_database_path(),
            backup_path: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Read `path`, or fall back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(path, &contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(LedgerError::Config {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    fn parse(path: &Path, contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| LedgerError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// CLI values win over the file.
    pub fn with_overrides(mut self, database: Option<PathBuf>, log_level: Option<String>) -> Self {
        if let Some(database) = database {
            self.database.path = database;
        }
        if let Some(level) = log_level {
            self.logging.level = level;
        }
        self
    }

    pub fn backup_path(&self) -> PathBuf {
        self.database
            .backup_path
            .clone()
            .unwrap_or_else(|| default_backup_path(&self.database.path))
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| LedgerError::InvalidInput(format!("invalid listen address: {}", e)))
    }
}

/// Arguments of the HTTP server binary.
#[derive(Parser, Debug)]
#[command(name = "pocket-ledger-server", about = "Local HTTP API for the pocket ledger")]
pub struct ServerArgs {
    /// Path to config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Database file (overrides config file)
    #[arg(short, long)]
    pub database: Option<PathBuf>,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,
}

impl ServerArgs {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(&self.config)?
            .with_overrides(self.database.clone(), self.log_level.clone());
        if let Some(port) = self.port {
            config.server.port = port;
        }
        Ok(config)
    }
}
