//! `KvBridge` Storage
//!
//! This crate adapts a transactional, ordered embedded store to the uniform
//! key-value engine contract an outer key-value server is written against.
//!
//! # Overview
//!
//! A factory owns one store environment and issues one engine per
//! namespace. Each engine offers point operations, nestable batch scopes
//! and bidirectional range scans. Keys and values are opaque byte strings,
//! ordered by a pluggable comparator.
//!
//! # Core Traits
//!
//! - [`KeyValueEngineFactory`] - Environment ownership and namespace lifecycle
//! - [`KeyValueEngine`] - Get/put/delete, batches and range scans
//! - [`EngineIterator`] - Positioned iteration bound to the engine's transaction
//! - [`KeyComparator`] - Key ordering installed on every namespace
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`], an alias for
//! `Result<T, StorageError>`. A missing key is not an error: lookups return
//! `Ok(None)`. [`StorageError::kind`] collapses every failure into one of
//! the [`ErrorKind`] categories the server reports.
//!
//! # Example
//!
//! ```ignore
//! use kvbridge_storage::{EnvConfig, KeyValueEngine, KeyValueEngineFactory, RedbEngineFactory};
//!
//! let mut factory = RedbEngineFactory::new(EnvConfig::new().path("/var/lib/kv"));
//! let mut users = factory.create_namespace("users")?;
//!
//! users.put(b"user:1", b"Alice")?;
//! assert_eq!(users.get(b"user:1")?, Some(b"Alice".to_vec()));
//!
//! factory.close_namespace(users);
//! ```
//!
//! # Modules
//!
//! - [`engine`] - Engine traits, comparators and errors
//! - [`backends`] - Concrete backend implementations

pub mod backends;
pub mod engine;

pub use backends::{EnvConfig, RedbEngineFactory, RedbIterator, RedbKvEngine};
pub use engine::{
    BytewiseComparator, EngineIterator, ErrorKind, KeyComparator, KeyValueEngine,
    KeyValueEngineFactory, ReverseBytewiseComparator, StorageError, StorageResult,
};
