//! Application configuration.
//!
//! [`StoreConfig`] is the runtime value the store is built with.
//! [`Settings`] is its file/environment form, loaded with the `config` crate.

mod storage;
mod store;

pub use storage::{MongodbConfig, QuerySettings, StorageConfig, StorageType, StoreSettings};
pub use store::{
    QueryHook, QueryOptions, ReadConcernLevel, ReadConsistency, StoreConfig, StoreConfigBuilder,
    TimeRepresentation, TransactionSettings, WriteAcknowledgment,
};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "strand.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "STRAND_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "STRAND";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "STRAND_LOG";

use serde::Deserialize;

/// Top-level settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Backend selection and connection details.
    pub storage: StorageConfig,
    /// Store behaviour.
    pub store: StoreSettings,
}

impl Settings {
    /// Load settings from file and environment.
    ///
    /// Sources, later overriding earlier:
    /// 1. `strand.yaml` in the current directory (if it exists)
    /// 2. File given by `path` (if provided)
    /// 3. File named by `STRAND_CONFIG` (if set)
    /// 4. `STRAND__`-prefixed environment variables, `__` between levels
    pub fn load(path: Option<&str>) -> Result<Self, ::config::ConfigError> {
        use ::config::{Config, Environment, File, FileFormat};

        let mut builder = Config::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Runtime store configuration for these settings.
    pub fn store_config(&self) -> StoreConfig {
        self.store.to_store_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn write_yaml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.storage.storage_type, StorageType::Memory);
        assert!(settings.store.transactional_reads);
        assert_eq!(
            settings.store.time_representation,
            TimeRepresentation::Rfc3339String
        );
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let file = write_yaml(
            r#"
storage:
  type: mongodb
  mongodb:
    uri: mongodb://db:27017/?replicaSet=rs0
    database: games
store:
  time_representation: native_date
  transactional_reads: false
  transaction:
    read_concern: majority
    write_concern: majority
    journal: true
  query:
    batch_size: 200
"#,
        );

        let settings = Settings::load(file.path().to_str()).unwrap();
        assert_eq!(settings.storage.storage_type, StorageType::Mongodb);
        assert_eq!(settings.storage.mongodb.database, "games");
        assert_eq!(settings.storage.mongodb.events_collection, "events");
        assert_eq!(
            settings.store.transaction.read_concern,
            Some(ReadConcernLevel::Majority)
        );
        assert_eq!(
            settings.store.transaction.write_concern,
            Some(WriteAcknowledgment::Majority)
        );

        let config = settings.store_config();
        assert_eq!(config.time_representation(), TimeRepresentation::NativeDate);
        assert!(!config.transactional_reads());
        assert_eq!(
            config.shape_query(QueryOptions::default()).batch_size,
            Some(200)
        );
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let file = write_yaml("storage:\n  type: mongodb\n");
        std::env::set_var("STRAND__STORAGE__TYPE", "memory");
        std::env::set_var("STRAND__STORE__TRANSACTIONAL_READS", "false");

        let result = Settings::load(file.path().to_str());

        std::env::remove_var("STRAND__STORAGE__TYPE");
        std::env::remove_var("STRAND__STORE__TRANSACTIONAL_READS");

        let settings = result.unwrap();
        assert_eq!(settings.storage.storage_type, StorageType::Memory);
        assert!(!settings.store.transactional_reads);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Settings::load(Some("/nonexistent/strand-settings.yaml")).is_err());
    }
}
