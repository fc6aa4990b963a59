//! Configuration shared by the station and the management CLI.
//!
//! Values come from an optional TOML file (`ROLLCALL_CONFIG`, or
//! `rollcall.toml` in the working directory if present), then `ROLLCALL_*`
//! environment variables override individual keys.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_ENV: &str = "ROLLCALL_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "rollcall.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid [{section}] section: {source}")]
    Section {
        section: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Parsed configuration file, or an empty table when there is none.
#[derive(Debug, Default, Clone)]
pub struct ConfigFile {
    table: toml::Table,
}

impl ConfigFile {
    /// Locate and parse the configuration file.
    ///
    /// An explicitly named file (`ROLLCALL_CONFIG`) must exist; the default
    /// `rollcall.toml` is optional.
    pub fn discover() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::read(Path::new(&path)),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::read(Path::new(DEFAULT_CONFIG_FILE)),
            None => Ok(Self::default()),
        }
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        Ok(Self {
            table: raw.parse::<toml::Table>()?,
        })
    }

    /// Deserialize one `[section]`; a missing section yields `T::default()`.
    pub fn section<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T, ConfigError> {
        match self.table.get(name) {
            Some(value) => value.clone().try_into().map_err(|source| ConfigError::Section {
                section: name.to_string(),
                source,
            }),
            None => Ok(T::default()),
        }
    }
}

/// `[database]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Realtime Database URL, e.g. `https://<project>-default-rtdb.firebaseio.com/`.
    pub url: String,
    /// Service-account key file.
    pub credentials: PathBuf,
    /// Node holding the student records.
    pub root: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            credentials: PathBuf::from("serviceAccountKey.json"),
            root: "Students".to_string(),
            timeout_secs: 10,
        }
    }
}

impl DatabaseConfig {
    /// File section, then `ROLLCALL_DATABASE_URL`, `ROLLCALL_CREDENTIALS`,
    /// `ROLLCALL_DATABASE_ROOT`, `ROLLCALL_DATABASE_TIMEOUT_SECS`.
    pub fn load(file: &ConfigFile) -> Result<Self, ConfigError> {
        let mut config: Self = file.section("database")?;
        if let Ok(url) = std::env::var("ROLLCALL_DATABASE_URL") {
            config.url = url;
        }
        if let Ok(path) = std::env::var("ROLLCALL_CREDENTIALS") {
            config.credentials = PathBuf::from(path);
        }
        if let Ok(root) = std::env::var("ROLLCALL_DATABASE_ROOT") {
            config.root = root;
        }
        config.timeout_secs = env_or("ROLLCALL_DATABASE_TIMEOUT_SECS", config.timeout_secs);
        Ok(config)
    }
}

/// Parse `key` from the environment, keeping `current` when unset or malformed.
pub fn env_or<T: std::str::FromStr>(key: &str, current: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(current)
}
