use std::{fs, path::PathBuf};

use common::prelude::{SecretKey, ThreadToken};
use serde::{Deserialize, Serialize};
use url::Url;

pub const APP_NAME: &str = "threads";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEYS_FILE_NAME: &str = "keys.sqlite";
pub const IDENTITY_FILE_NAME: &str = "identity.pem";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Endpoint of the Threads network API
    #[serde(default = "default_host")]
    pub host: Url,
    /// Bearer token from the last `threads token`
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> Url {
    Url::parse("http://127.0.0.1:6006").expect("hardcoded URL must parse")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            token: None,
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    pub fn token(&self) -> Option<ThreadToken> {
        self.token.clone().map(ThreadToken::new)
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the threads directory (~/.threads)
    pub threads_dir: PathBuf,
    /// Path to the SQLite KeyBook
    pub keys_path: PathBuf,
    /// Path to the identity PEM file
    pub identity_path: PathBuf,
    pub config_path: PathBuf,
    pub config: AppConfig,
}

impl AppState {
    /// Get the threads directory path (custom or default ~/.threads)
    pub fn threads_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new threads directory with a fresh identity
    pub fn init(custom_path: Option<PathBuf>, config: AppConfig) -> Result<Self, StateError> {
        let threads_dir = Self::threads_dir(custom_path)?;
        if threads_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&threads_dir)?;

        let identity_path = threads_dir.join(IDENTITY_FILE_NAME);
        fs::write(&identity_path, SecretKey::generate().to_pem())?;

        let state = Self {
            keys_path: threads_dir.join(KEYS_FILE_NAME),
            config_path: threads_dir.join(CONFIG_FILE_NAME),
            identity_path,
            threads_dir,
            config,
        };
        state.save_config()?;
        Ok(state)
    }

    /// Load existing state from the threads directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let threads_dir = Self::threads_dir(custom_path)?;
        if !threads_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let identity_path = threads_dir.join(IDENTITY_FILE_NAME);
        let config_path = threads_dir.join(CONFIG_FILE_NAME);
        if !identity_path.exists() {
            return Err(StateError::MissingFile(IDENTITY_FILE_NAME.to_string()));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;
        Ok(Self {
            keys_path: threads_dir.join(KEYS_FILE_NAME),
            identity_path,
            config_path,
            threads_dir,
            config,
        })
    }

    pub fn save_config(&self) -> Result<(), StateError> {
        fs::write(&self.config_path, toml::to_string_pretty(&self.config)?)?;
        Ok(())
    }

    /// Load the identity used for the token handshake
    pub fn load_identity(&self) -> Result<SecretKey, StateError> {
        let pem = fs::read_to_string(&self.identity_path)?;
        SecretKey::from_pem(&pem).map_err(|e| StateError::InvalidKey(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("threads directory not initialized. Run 'threads init' first")]
    NotInitialized,

    #[error("threads directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threads");

        let state = AppState::init(Some(path.clone()), AppConfig::default()).unwrap();
        let identity = state.load_identity().unwrap();

        let loaded = AppState::load(Some(path.clone())).unwrap();
        assert_eq!(loaded.config, AppConfig::default());
        assert_eq!(loaded.load_identity().unwrap(), identity);

        assert!(matches!(
            AppState::init(Some(path), AppConfig::default()),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_token_saved() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = AppState::init(Some(dir.path().to_path_buf()), AppConfig::default()).unwrap();
        state.config.token = Some("tok".into());
        state.save_config().unwrap();

        let loaded = AppState::load(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(loaded.config.token(), Some(ThreadToken::new("tok")));
    }

    #[test]
    fn test_load_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = toml::from_str("log_level = \"debug\"").unwrap();
        assert_eq!(config.host, default_host());
        assert_eq!(config.log_level, "debug");
        assert!(config.token.is_none());
    }
}
