//! # Configuration
//!
//! Optional `armory.toml` with the database locations and log format.
//!
//! Precedence, lowest to highest: built-in defaults, the TOML file, then
//! command-line flags. `ARMORY_LOG_FORMAT` overrides the file's log format.

use armory_core::ArmoryError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "armory.toml";

/// Environment variable selecting the log format (`text` or `json`).
pub const LOG_FORMAT_ENV: &str = "ARMORY_LOG_FORMAT";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Parse an environment value. Anything but `json` means text.
    #[must_use]
    pub fn from_env_value(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArmoryConfig {
    /// redb file holding authored content.
    pub compendium: PathBuf,
    /// redb file holding imported, mutable entries.
    pub roster: PathBuf,
    /// Label used for the roster registry in logs.
    pub label: String,
    pub log_format: LogFormat,
}

impl Default for ArmoryConfig {
    fn default() -> Self {
        Self {
            compendium: PathBuf::from("compendium.redb"),
            roster: PathBuf::from("roster.redb"),
            label: "roster".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl ArmoryConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `armory.toml` in the working
    /// directory is read if present, and defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ArmoryError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        if !path.exists() {
            if required {
                return Err(ArmoryError::IoError(format!(
                    "Config file '{}' does not exist",
                    path.display()
                )));
            }
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| ArmoryError::IoError(format!("Read config: {}", e)))?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ArmoryError> {
        toml::from_str(contents)
            .map_err(|e| ArmoryError::SerializationError(format!("Invalid config: {}", e)))
    }

    /// Apply command-line overrides.
    #[must_use]
    pub fn with_overrides(mut self, compendium: Option<PathBuf>, roster: Option<PathBuf>) -> Self {
        if let Some(compendium) = compendium {
            self.compendium = compendium;
        }
        if let Some(roster) = roster {
            self.roster = roster;
        }
        self
    }

    /// Effective log format: the environment wins over the file.
    #[must_use]
    pub fn effective_log_format(&self) -> LogFormat {
        std::env::var(LOG_FORMAT_ENV)
            .map(|value| LogFormat::from_env_value(&value))
            .unwrap_or(self.log_format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_working_directory() {
        let config = ArmoryConfig::default();
        assert_eq!(config.compendium, PathBuf::from("compendium.redb"));
        assert_eq!(config.roster, PathBuf::from("roster.redb"));
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = ArmoryConfig::from_toml(
            r#"
            roster = "/var/lib/armory/roster.redb"
            log_format = "json"
            "#,
        )
        .expect("parse");
        assert_eq!(config.roster, PathBuf::from("/var/lib/armory/roster.redb"));
        assert_eq!(config.compendium, PathBuf::from("compendium.redb"));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ArmoryConfig::from_toml("databse = \"x\"").is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = ArmoryConfig::load(Some(Path::new("/nonexistent/armory.toml")));
        assert!(matches!(result, Err(ArmoryError::IoError(_))));
    }

    #[test]
    fn file_on_disk_is_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("armory.toml");
        std::fs::write(&path, "label = \"campaign\"\n").expect("write");

        let config = ArmoryConfig::load(Some(&path)).expect("load");
        assert_eq!(config.label, "campaign");
    }

    #[test]
    fn flags_override_file_values() {
        let config = ArmoryConfig::default()
            .with_overrides(Some(PathBuf::from("c.redb")), None);
        assert_eq!(config.compendium, PathBuf::from("c.redb"));
        assert_eq!(config.roster, PathBuf::from("roster.redb"));
    }

    #[test]
    fn env_value_parsing() {
        assert_eq!(LogFormat::from_env_value("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value("pretty"), LogFormat::Text);
    }
}
