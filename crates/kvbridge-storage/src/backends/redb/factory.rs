//! Factory issuing redb-backed engines.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::engine::{BytewiseComparator, KeyComparator, KeyValueEngineFactory, StorageResult};

use super::config::EnvConfig;
use super::engine::RedbKvEngine;
use super::env::Environment;

/// Owns a redb environment and issues one [`RedbKvEngine`] per namespace.
///
/// The environment is opened on the first
/// [`create_namespace`](KeyValueEngineFactory::create_namespace) call and
/// shared by every engine issued afterwards. Engines keep it alive, so
/// dropping the factory before its engines is safe.
///
/// Every namespace issued by a factory is ordered by the comparator `C`.
///
/// # Example
///
/// ```ignore
/// use kvbridge_storage::{EnvConfig, KeyValueEngine, KeyValueEngineFactory, RedbEngineFactory};
///
/// let mut factory = RedbEngineFactory::new(EnvConfig::new().path("/var/lib/kv"));
/// let mut users = factory.create_namespace("users")?;
/// users.put(b"alice", b"admin")?;
/// ```
///
/// # Write Locking
///
/// The environment admits one write transaction at a time. An engine with
/// an open batch (or a live range iterator) holds it, and a write on any
/// other engine of the same factory blocks until that batch ends. A single
/// thread must therefore finish a batch before writing through a second
/// engine.
pub struct RedbEngineFactory<C: KeyComparator = BytewiseComparator> {
    config: EnvConfig,
    env: Option<Arc<Environment>>,
    _comparator: PhantomData<fn() -> C>,
}

impl RedbEngineFactory {
    /// Create a factory ordering keys bytewise.
    #[must_use]
    pub fn new(config: EnvConfig) -> Self {
        Self::with_comparator(config)
    }

    /// Create a factory over an in-memory environment.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(EnvConfig::in_memory())
    }
}

impl<C: KeyComparator> RedbEngineFactory<C> {
    /// Create a factory whose namespaces are ordered by `C`.
    #[must_use]
    pub fn with_comparator(config: EnvConfig) -> Self {
        Self { config, env: None, _comparator: PhantomData }
    }

    /// Create a factory from the server's flat property map.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a property is malformed.
    pub fn from_properties(props: &HashMap<String, String>) -> StorageResult<Self> {
        Ok(Self::with_comparator(EnvConfig::from_properties(props)?))
    }

    /// The configuration the environment is (or will be) opened with.
    #[must_use]
    pub const fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Whether the environment has been opened.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.env.is_some()
    }

    fn environment(&mut self) -> StorageResult<Arc<Environment>> {
        if let Some(env) = &self.env {
            return Ok(Arc::clone(env));
        }

        self.config.validate()?;
        let env = match Environment::open(&self.config) {
            Ok(env) => Arc::new(env),
            Err(e) => {
                error!(path = %self.config.dir().display(), "failed to open environment: {e}");
                return Err(e);
            }
        };
        self.env = Some(Arc::clone(&env));
        Ok(env)
    }
}

impl<C: KeyComparator> KeyValueEngineFactory for RedbEngineFactory<C> {
    type Engine = RedbKvEngine<C>;

    fn create_namespace(&mut self, name: &str) -> StorageResult<Self::Engine> {
        let env = self.environment()?;
        match RedbKvEngine::open(env, name) {
            Ok(engine) => {
                debug!(namespace = name, comparator = C::NAME, "created namespace");
                Ok(engine)
            }
            Err(e) => {
                error!(namespace = name, "failed to create namespace: {e}");
                Err(e)
            }
        }
    }

    fn close_namespace(&mut self, mut engine: Self::Engine) {
        engine.close_namespace();
    }

    fn destroy_namespace(&mut self, mut engine: Self::Engine) -> StorageResult<()> {
        let erased = engine.erase_all();
        if let Err(e) = &erased {
            warn!(namespace = engine.namespace(), "failed to erase namespace: {e}");
        }
        engine.close_namespace();
        erased
    }
}

impl<C: KeyComparator> Drop for RedbEngineFactory<C> {
    fn drop(&mut self) {
        if let Some(env) = self.env.take() {
            debug!(
                path = %self.config.dir().display(),
                engines = env.live_count(),
                "releasing factory"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{KeyValueEngine, StorageError};

    #[test]
    fn test_environment_opens_lazily() {
        let mut factory = RedbEngineFactory::in_memory();
        assert!(!factory.is_open());

        let engine = factory.create_namespace("lazy").expect("create");
        assert!(factory.is_open());
        factory.close_namespace(engine);
    }

    #[test]
    fn test_invalid_config_fails_on_first_create() {
        let mut factory = RedbEngineFactory::new(EnvConfig::in_memory().flush_threshold(0));
        let err = factory.create_namespace("any").err().expect("invalid config");
        assert!(matches!(err, StorageError::Config(_)));
        assert!(!factory.is_open());
    }

    #[test]
    fn test_engines_outlive_factory() {
        let mut factory = RedbEngineFactory::in_memory();
        let mut engine = factory.create_namespace("orphan").expect("create");
        drop(factory);

        engine.put(b"k", b"v").unwrap();
        assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_destroy_releases_claim() {
        let mut factory = RedbEngineFactory::in_memory();
        let mut engine = factory.create_namespace("gone").expect("create");
        engine.put(b"k", b"v").unwrap();
        factory.destroy_namespace(engine).expect("destroy");

        let engine = factory.create_namespace("gone").expect("recreate");
        assert_eq!(engine.get(b"k").unwrap(), None);
    }
}
