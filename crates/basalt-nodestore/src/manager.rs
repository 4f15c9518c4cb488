//! Backend factory registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::memory::{MemBackend, MEMORY_BACKEND_NAME};
#[cfg(feature = "rocksdb")]
use crate::backend::rocksdb::{RocksDbBackend, RocksDbConfig, ROCKSDB_BACKEND_NAME};
use crate::backend::Backend;
use crate::error::{BackendError, StoreError};

/// Options passed to a backend factory.
///
/// Stores that manage many backends (one per shard) clone the options and
/// re-point the path for each instance.
#[derive(Debug, Clone)]
pub struct BackendOptions {
    /// Factory name to open.
    pub backend_type: String,
    /// Directory the backend keeps its files under.
    pub path: PathBuf,
    /// Cap on open files for file-backed backends.
    pub max_open_files: i32,
}

impl BackendOptions {
    /// Creates options for the given factory and path.
    pub fn new<P: AsRef<Path>>(backend_type: &str, path: P) -> Self {
        Self {
            backend_type: backend_type.to_string(),
            path: path.as_ref().to_path_buf(),
            max_open_files: 1024,
        }
    }

    /// Returns a copy pointed at a different path.
    #[must_use]
    pub fn with_path<P: AsRef<Path>>(&self, path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..self.clone()
        }
    }
}

/// Creates backend instances of one type.
pub trait BackendFactory: Send + Sync {
    /// The name backends of this type are configured by.
    fn name(&self) -> &str;

    /// Opens a backend at the configured path.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the backend cannot be opened.
    fn open(&self, options: &BackendOptions) -> Result<Arc<dyn Backend>, BackendError>;
}

struct MemFactory;

impl BackendFactory for MemFactory {
    fn name(&self) -> &str {
        MEMORY_BACKEND_NAME
    }

    fn open(&self, _options: &BackendOptions) -> Result<Arc<dyn Backend>, BackendError> {
        let backend: Arc<dyn Backend> = MemBackend::new();
        Ok(backend)
    }
}

#[cfg(feature = "rocksdb")]
struct RocksDbFactory;

#[cfg(feature = "rocksdb")]
impl BackendFactory for RocksDbFactory {
    fn name(&self) -> &str {
        ROCKSDB_BACKEND_NAME
    }

    fn open(&self, options: &BackendOptions) -> Result<Arc<dyn Backend>, BackendError> {
        let config = RocksDbConfig {
            path: options.path.clone(),
            max_open_files: options.max_open_files,
            ..Default::default()
        };
        let backend: Arc<dyn Backend> = RocksDbBackend::open(config)?;
        Ok(backend)
    }
}

/// Registry of backend factories.
///
/// The built-in factories are registered at construction; embedders may
/// add their own before handing the manager to a store.
pub struct Manager {
    factories: HashMap<String, Arc<dyn BackendFactory>>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    /// Creates a manager with the built-in factories registered.
    #[must_use]
    pub fn new() -> Self {
        let mut manager = Self {
            factories: HashMap::new(),
        };
        manager.register(Arc::new(MemFactory));
        #[cfg(feature = "rocksdb")]
        manager.register(Arc::new(RocksDbFactory));
        manager
    }

    /// Registers a factory, replacing any previous one of the same name.
    pub fn register(&mut self, factory: Arc<dyn BackendFactory>) {
        self.factories.insert(factory.name().to_string(), factory);
    }

    /// Looks up a factory by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Arc<dyn BackendFactory>> {
        self.factories.get(name)
    }

    /// Opens a backend of the configured type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] for an unregistered type and
    /// [`StoreError::Backend`] if the factory fails to open.
    pub fn make_backend(&self, options: &BackendOptions) -> Result<Arc<dyn Backend>, StoreError> {
        let factory = self.find(&options.backend_type).ok_or_else(|| {
            crate::error::ConfigError::UnknownBackendType(options.backend_type.clone())
        })?;
        Ok(factory.open(options)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_memory_factory() {
        let manager = Manager::new();
        assert!(manager.find(MEMORY_BACKEND_NAME).is_some());

        let options = BackendOptions::new(MEMORY_BACKEND_NAME, "/nonexistent");
        let backend = manager.make_backend(&options).unwrap();
        assert_eq!(backend.name(), MEMORY_BACKEND_NAME);
        assert_eq!(backend.fd_limit(), 0);
    }

    #[test]
    fn test_unknown_type_is_config_error() {
        let manager = Manager::new();
        let options = BackendOptions::new("no-such-backend", "/tmp");
        assert!(matches!(
            manager.make_backend(&options),
            Err(StoreError::Config(
                crate::error::ConfigError::UnknownBackendType(_)
            ))
        ));
    }

    #[test]
    fn test_with_path_repoints() {
        let options = BackendOptions::new(MEMORY_BACKEND_NAME, "/a");
        let moved = options.with_path("/b");
        assert_eq!(moved.backend_type, options.backend_type);
        assert_eq!(moved.path, std::path::PathBuf::from("/b"));
    }

    #[cfg(feature = "rocksdb")]
    #[test]
    fn test_builtin_rocksdb_factory() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::new();
        let options = BackendOptions::new(ROCKSDB_BACKEND_NAME, dir.path());
        let backend = manager.make_backend(&options).unwrap();
        assert!(backend.fd_limit() > 0);
    }
}
