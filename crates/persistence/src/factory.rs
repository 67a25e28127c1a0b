//! Backend selection.
//!
//! Backends are chosen through an explicit constructor map built at startup.
//! [`StorageFactory::with_defaults`] registers the backends compiled into
//! this crate; applications can register their own under any
//! [`BackendKind`] before calling [`StorageFactory::build`].
//!
//! ```
//! use mercator_persistence::core::BackendKind;
//! use mercator_persistence::factory::{StorageConfig, StorageFactory};
//!
//! let config = StorageConfig::from_json_str(r#"{ "backend": "memory" }"#).unwrap();
//! let storage = StorageFactory::with_defaults().build(&config).unwrap();
//! assert_eq!(storage.kind(), BackendKind::Memory);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::backends::memory::MemoryBackend;
use crate::core::{BackendKind, RecordStorage};
use crate::error::{BackendError, StorageError, StorageResult, ValidationError};

#[cfg(feature = "sqlite")]
use crate::backends::sqlite::{SqliteBackend, SqliteBackendConfig};

#[cfg(feature = "postgres")]
use crate::backends::postgres::{PostgresBackend, PostgresConfig};

/// Storage configuration consumed by [`StorageFactory::build`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which backend to construct.
    pub backend: BackendKind,

    /// SQLite database path, or `:memory:`.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// SQLite pool and connection settings.
    #[cfg(feature = "sqlite")]
    #[serde(default)]
    pub sqlite: SqliteBackendConfig,

    /// PostgreSQL connection settings.
    #[cfg(feature = "postgres")]
    #[serde(default)]
    pub postgres: PostgresConfig,
}

fn default_sqlite_path() -> String {
    ":memory:".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            sqlite_path: default_sqlite_path(),
            #[cfg(feature = "sqlite")]
            sqlite: SqliteBackendConfig::default(),
            #[cfg(feature = "postgres")]
            postgres: PostgresConfig::default(),
        }
    }
}

impl StorageConfig {
    /// Creates a configuration for `backend` with default settings.
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    /// Parses a JSON configuration document.
    pub fn from_json_str(s: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(s).map_err(|e| ValidationError::InvalidConfiguration {
            message: e.to_string(),
        })
    }

    /// Decodes a configuration from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        serde_json::from_value(value).map_err(|e| ValidationError::InvalidConfiguration {
            message: e.to_string(),
        })
    }
}

/// Constructs a backend from configuration.
pub type StorageConstructor =
    Box<dyn Fn(&StorageConfig) -> StorageResult<Arc<dyn RecordStorage>> + Send + Sync>;

/// Map from backend kind to constructor.
pub struct StorageFactory {
    constructors: HashMap<BackendKind, StorageConstructor>,
}

impl fmt::Debug for StorageFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageFactory")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl Default for StorageFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl StorageFactory {
    /// Creates a factory with no registered backends.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Creates a factory with every backend compiled into this crate.
    pub fn with_defaults() -> Self {
        let mut factory = Self::new();
        factory.register(BackendKind::Memory, |_| {
            Ok(Arc::new(MemoryBackend::new()) as Arc<dyn RecordStorage>)
        });

        #[cfg(feature = "sqlite")]
        factory.register(BackendKind::Sqlite, |config| {
            let backend = SqliteBackend::with_config(&config.sqlite_path, config.sqlite.clone())?;
            Ok(Arc::new(backend) as Arc<dyn RecordStorage>)
        });

        #[cfg(feature = "postgres")]
        factory.register(BackendKind::Postgres, |config| {
            let backend = PostgresBackend::from_config(config.postgres.clone())?;
            Ok(Arc::new(backend) as Arc<dyn RecordStorage>)
        });

        factory
    }

    /// Registers (or replaces) the constructor for `kind`.
    pub fn register<F>(&mut self, kind: BackendKind, constructor: F) -> &mut Self
    where
        F: Fn(&StorageConfig) -> StorageResult<Arc<dyn RecordStorage>> + Send + Sync + 'static,
    {
        self.constructors.insert(kind, Box::new(constructor));
        self
    }

    /// Returns true if a constructor is registered for `kind`.
    pub fn is_registered(&self, kind: BackendKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    /// Returns the registered kinds in name order.
    pub fn kinds(&self) -> Vec<BackendKind> {
        let mut kinds: Vec<BackendKind> = self.constructors.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// Constructs the backend named by `config.backend`.
    ///
    /// # Errors
    ///
    /// * `BackendError::NotRegistered` - no constructor for the kind
    /// * any error raised by the constructor
    pub fn build(&self, config: &StorageConfig) -> StorageResult<Arc<dyn RecordStorage>> {
        let constructor = self.constructors.get(&config.backend).ok_or_else(|| {
            StorageError::Backend(BackendError::NotRegistered {
                backend_name: config.backend.to_string(),
            })
        })?;
        let storage = constructor(config)?;
        info!(backend = %config.backend, "storage backend constructed");
        Ok(storage)
    }
}

/// Serde module for Duration with humantime format.
pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_register_compiled_backends() {
        let factory = StorageFactory::with_defaults();
        assert!(factory.is_registered(BackendKind::Memory));
        assert_eq!(
            factory.is_registered(BackendKind::Sqlite),
            cfg!(feature = "sqlite")
        );
        assert_eq!(
            factory.is_registered(BackendKind::Postgres),
            cfg!(feature = "postgres")
        );
    }

    #[test]
    fn test_build_unregistered_backend() {
        let factory = StorageFactory::new();
        assert!(matches!(
            factory.build(&StorageConfig::new(BackendKind::Memory)),
            Err(StorageError::Backend(BackendError::NotRegistered { .. }))
        ));
    }

    #[test]
    fn test_register_replaces_constructor() {
        let mut factory = StorageFactory::new();
        factory.register(BackendKind::Postgres, |_| {
            Ok(Arc::new(MemoryBackend::new()) as Arc<dyn RecordStorage>)
        });
        let storage = factory
            .build(&StorageConfig::new(BackendKind::Postgres))
            .unwrap();
        assert_eq!(storage.backend_name(), "memory");
        assert_eq!(factory.kinds(), vec![BackendKind::Postgres]);
    }

    #[test]
    fn test_config_from_value() {
        let config = StorageConfig::from_value(json!({ "backend": "sqlite" })).unwrap();
        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.sqlite_path, ":memory:");

        assert!(StorageConfig::from_json_str(r#"{ "backend": "oracle" }"#).is_err());
        assert!(StorageConfig::from_json_str("not json").is_err());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_durations_use_humantime() {
        let config = StorageConfig::from_value(json!({
            "backend": "sqlite",
            "sqlite": { "busy_timeout": "250ms", "connection_timeout": "2s" }
        }))
        .unwrap();
        assert_eq!(config.sqlite.busy_timeout, std::time::Duration::from_millis(250));
        assert_eq!(config.sqlite.connection_timeout, std::time::Duration::from_secs(2));
        assert_eq!(config.sqlite.max_connections, 10);
    }
}
