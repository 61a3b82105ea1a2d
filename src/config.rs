// ⚙️ Configuration - where the book lives on disk
//
// The database is a single SQLite file in a per-application data directory.
// `CHANCHO_DATA_DIR` overrides the platform default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "CHANCHO_DATA_DIR";
pub const DEFAULT_APP_DIR: &str = "chancho";
pub const DEFAULT_DATABASE_NAME: &str = "chancho.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookConfig {
    /// Directory holding the database file (created on first use)
    pub data_dir: PathBuf,

    /// File name of the database inside `data_dir`
    #[serde(default = "default_database_name")]
    pub database_name: String,
}

fn default_database_name() -> String {
    DEFAULT_DATABASE_NAME.to_string()
}

impl BookConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        BookConfig {
            data_dir: data_dir.into(),
            database_name: default_database_name(),
        }
    }

    /// Resolve the data directory from the environment, falling back to the
    /// platform data dir (e.g. `~/.local/share/chancho`).
    pub fn from_env() -> Self {
        if let Some(custom) = env::var_os(DATA_DIR_ENV) {
            return Self::new(PathBuf::from(custom));
        }
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join(DEFAULT_APP_DIR))
    }

    /// Load a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: BookConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_name)
    }

    /// Create the data directory if it does not exist yet.
    pub fn ensure_data_dir(&self) -> std::io::Result<()> {
        if !self.data_dir.exists() {
            tracing::info!(dir = %self.data_dir.display(), "creating application data directory");
            fs::create_dir_all(&self.data_dir)?;
        }
        Ok(())
    }
}

impl Default for BookConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path_joins_name() {
        let config = BookConfig::new("/tmp/chancho-test");
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/chancho-test/chancho.db")
        );
    }

    #[test]
    fn test_load_json_config_with_default_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.json");
        fs::write(&path, r#"{ "data_dir": "/var/lib/chancho" }"#).unwrap();

        let config = BookConfig::load(&path).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/chancho"));
        assert_eq!(config.database_name, DEFAULT_DATABASE_NAME);
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = BookConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("/definitely/not/here.json"));
    }

    #[test]
    fn test_ensure_data_dir_creates_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = BookConfig::new(dir.path().join("a").join("b"));

        config.ensure_data_dir().unwrap();

        assert!(config.data_dir.is_dir());
    }
}
