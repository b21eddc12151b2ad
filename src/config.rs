//! Configuration management for quadrect
//!
//! A JSON record read once at startup, naming the folder to pull photos
//! from and the folder rectified results are written to. There is no
//! default configuration: a missing or malformed file is fatal.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration file errors, all fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config field `{0}` must not be empty")]
    EmptyField(&'static str),
}

/// Web server bind address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8094
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Folder holding the photos waiting to be rectified
    pub source_folder: PathBuf,

    /// Folder the rectified results are written to
    pub destination_folder: PathBuf,

    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        if config.source_folder.as_os_str().is_empty() {
            return Err(ConfigError::EmptyField("source_folder"));
        }
        if config.destination_folder.as_os_str().is_empty() {
            return Err(ConfigError::EmptyField("destination_folder"));
        }

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source_folders.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_folder_pair() {
        let (_dir, path) = write_config(
            r#"{"source_folder": "/photos/in", "destination_folder": "/photos/out"}"#,
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.source_folder, PathBuf::from("/photos/in"));
        assert_eq!(config.destination_folder, PathBuf::from("/photos/out"));
        // server record is optional and defaults
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8094);
    }

    #[test]
    fn missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&dir.path().join("nope.json"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn missing_field_is_fatal() {
        let (_dir, path) = write_config(r#"{"source_folder": "/photos/in"}"#);
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn empty_folder_field_is_rejected() {
        let (_dir, path) =
            write_config(r#"{"source_folder": "", "destination_folder": "/photos/out"}"#);
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::EmptyField("source_folder"))
        ));
    }

    #[test]
    fn server_override_is_honored() {
        let (_dir, path) = write_config(
            r#"{
                "source_folder": "/photos/in",
                "destination_folder": "/photos/out",
                "server": {"host": "0.0.0.0", "port": 9000}
            }"#,
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
    }
}
