use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }

    fn default_admin() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 8081,
        }
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Database {
    /// SQLite database file. `:memory:` keeps everything in memory.
    pub path: PathBuf,
}

/// Entity service configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    #[serde(default = "Listener::default_admin")]
    pub admin_listener: Listener,
    pub database: Database,
    /// Skips the osm id collision check on create.
    #[serde(default)]
    pub allow_duplicate_osm_id: bool,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.database.path.as_os_str().is_empty() {
            return Err(ValidationError::EmptyDatabasePath);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
listener:
    host: "127.0.0.1"
    port: 3000
admin_listener:
    host: "127.0.0.1"
    port: 3001
database:
    path: /var/lib/id2osm/entities.db
allow_duplicate_osm_id: true
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.listener.port, 3000);
        assert_eq!(config.admin_listener.port, 3001);
        assert_eq!(
            config.database.path,
            PathBuf::from("/var/lib/id2osm/entities.db")
        );
        assert!(config.allow_duplicate_osm_id);
    }

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str("database:\n    path: \":memory:\"\n").unwrap();
        assert_eq!(config.listener, Listener::default());
        assert_eq!(config.admin_listener.port, 8081);
        assert!(!config.allow_duplicate_osm_id);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config: Config = serde_yaml::from_str("database:\n    path: a.db\n").unwrap();

        config.admin_listener.port = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidPort));

        config.admin_listener.port = 8081;
        config.database.path = PathBuf::new();
        assert_eq!(config.validate(), Err(ValidationError::EmptyDatabasePath));
    }
}
