//! Configuration management for Filebox
//!
//! Both halves read their settings from the environment (after `dotenvy`
//! has loaded any `.env` file). Unset variables fall back to defaults;
//! set-but-malformed ones are errors.

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::API_PREFIX;

/// Default size below which a file is sent in a single request
pub const DEFAULT_CHUNK_UPLOAD_THRESHOLD: u64 = 4 * 1024 * 1024;

/// Default chunk size for chunked uploads
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per user
    pub root: PathBuf,
    /// Staging directory for uploads in progress; `<root>/.uploads` when unset
    pub upload_dir: Option<PathBuf>,
    /// Populate new accounts with a starter tree
    pub provision_defaults: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Hours an idle chunked upload is kept
    pub session_expiry_hours: i64,
    /// Seconds between expired-session sweeps
    pub cleanup_interval_secs: u64,
    /// Largest accepted request body
    pub max_body_bytes: usize,
}

impl StorageConfig {
    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir
            .clone()
            .unwrap_or_else(|| self.root.join(".uploads"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
            },
            storage: StorageConfig {
                root: PathBuf::from("./filebox_data"),
                upload_dir: None,
                provision_defaults: false,
            },
            database: DatabaseConfig {
                url: "sqlite:./filebox.db".to_string(),
            },
            upload: UploadConfig {
                session_expiry_hours: 24,
                cleanup_interval_secs: 300,
                max_body_bytes: 16 * 1024 * 1024,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT")?.unwrap_or(defaults.server.port),
            },
            storage: StorageConfig {
                root: env::var("FILEBOX_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.root),
                upload_dir: env::var("FILEBOX_UPLOAD_DIR").ok().map(PathBuf::from),
                provision_defaults: parse_var("FILEBOX_PROVISION_DEFAULTS")?
                    .unwrap_or(defaults.storage.provision_defaults),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            upload: UploadConfig {
                session_expiry_hours: parse_var("UPLOAD_SESSION_EXPIRY_HOURS")?
                    .unwrap_or(defaults.upload.session_expiry_hours),
                cleanup_interval_secs: parse_var("UPLOAD_CLEANUP_INTERVAL_SECS")?
                    .unwrap_or(defaults.upload.cleanup_interval_secs),
                max_body_bytes: parse_var("MAX_BODY_BYTES")?
                    .unwrap_or(defaults.upload.max_body_bytes),
            },
        })
    }
}

/// Client-side settings
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the server, e.g. `http://localhost:5000`
    pub server_address: String,
    pub api_prefix: String,
    pub username: String,
    pub password: String,
    /// Local directory mirrored to the server
    pub sharing_path: PathBuf,
    pub chunk_upload_threshold: u64,
    pub chunk_size: u64,
    pub request_timeout: Duration,
    /// Where transfer tickets are kept; resumption is off when unset
    pub ticket_dir: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(
        server_address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        sharing_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            server_address: server_address.into(),
            api_prefix: API_PREFIX.to_string(),
            username: username.into(),
            password: password.into(),
            sharing_path: sharing_path.into(),
            chunk_upload_threshold: DEFAULT_CHUNK_UPLOAD_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_timeout: Duration::from_secs(30),
            ticket_dir: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let server_address =
            env::var("FILEBOX_SERVER").unwrap_or_else(|_| "http://localhost:5000".to_string());
        let username = env::var("FILEBOX_USER").map_err(|_| ConfigError::Missing("FILEBOX_USER"))?;
        let password =
            env::var("FILEBOX_PASSWORD").map_err(|_| ConfigError::Missing("FILEBOX_PASSWORD"))?;
        let sharing_path = env::var("FILEBOX_SHARING_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./filebox"));

        let mut config = Self::new(server_address, username, password, sharing_path);

        if let Ok(prefix) = env::var("FILEBOX_API_PREFIX") {
            config.api_prefix = prefix;
        }
        if let Some(threshold) = parse_var("FILEBOX_CHUNK_THRESHOLD")? {
            config.chunk_upload_threshold = threshold;
        }
        if let Some(size) = parse_var::<u64>("FILEBOX_CHUNK_SIZE")? {
            if size == 0 {
                return Err(ConfigError::Invalid {
                    name: "FILEBOX_CHUNK_SIZE",
                    value: size.to_string(),
                });
            }
            config.chunk_size = size;
        }
        if let Some(secs) = parse_var("FILEBOX_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        config.ticket_dir = env::var("FILEBOX_TICKET_DIR").ok().map(PathBuf::from);

        Ok(config)
    }
}

fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(None),
    }
}
