#![forbid(unsafe_code)]

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use dataroom_contracts::revision::PageId;
use dataroom_storage::{DataroomStore, InMemoryDataroomStore, SqliteDataroomStore, StorageError};

pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:3001";
pub const DEFAULT_STORE_PATH: &str = ".dataroom/dataroom.sqlite3";
pub const DEFAULT_API_PREFIX: &str = "/api";
pub const DEFAULT_LOG_FILTER: &str = "info";
pub const IN_MEMORY_STORE: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    InMemory,
    Sqlite(PathBuf),
}

impl StoreLocation {
    pub fn open(&self) -> Result<Box<dyn DataroomStore>, StorageError> {
        match self {
            StoreLocation::InMemory => Ok(Box::new(InMemoryDataroomStore::new_in_memory())),
            StoreLocation::Sqlite(path) => Ok(Box::new(SqliteDataroomStore::open(path)?)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub bind: SocketAddr,
    pub store: StoreLocation,
    pub page: PageId,
    /// Empty means routes mount at the root.
    pub api_prefix: String,
    pub seed_on_empty: bool,
    pub log_filter: String,
}

impl AdapterConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_var_map(|key| env::var(key).ok())
    }

    pub fn from_env_var_map<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_text = match (var("DATAROOM_HTTP_BIND"), var("PORT")) {
            (Some(bind), _) => bind,
            (None, Some(port)) => format!("0.0.0.0:{port}"),
            (None, None) => DEFAULT_HTTP_BIND.to_string(),
        };
        let bind = bind_text.parse::<SocketAddr>().map_err(|err| ConfigError {
            key: "DATAROOM_HTTP_BIND",
            reason: format!("'{bind_text}': {err}"),
        })?;

        let store = match var("DATAROOM_STORE_PATH") {
            Some(v) if v == IN_MEMORY_STORE => StoreLocation::InMemory,
            Some(v) => StoreLocation::Sqlite(PathBuf::from(v)),
            None => StoreLocation::Sqlite(PathBuf::from(DEFAULT_STORE_PATH)),
        };

        let page = match var("DATAROOM_PAGE") {
            Some(v) => PageId::new(v).map_err(|err| ConfigError {
                key: "DATAROOM_PAGE",
                reason: err.to_string(),
            })?,
            None => PageId::main(),
        };

        let api_prefix = normalize_api_prefix(
            get("DATAROOM_API_PREFIX")
                .as_deref()
                .unwrap_or(DEFAULT_API_PREFIX),
        );

        let seed_on_empty = match var("DATAROOM_SEED_ON_EMPTY") {
            Some(v) => !matches!(
                v.to_ascii_lowercase().as_str(),
                "0" | "false" | "off" | "no"
            ),
            None => true,
        };

        let log_filter = var("DATAROOM_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            bind,
            store,
            page,
            api_prefix,
            seed_on_empty,
            log_filter,
        })
    }
}

/// `"api/"` and `"/api"` both become `"/api"`; blank or `"/"` becomes `""`.
fn normalize_api_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
