//! Redb storage backend.
//!
//! This module adapts redb, a pure-Rust embedded transactional store, to the
//! engine contract. One redb database forms the environment shared by a
//! factory's engines, and every namespace is one redb table whose keys are
//! ordered by the factory's comparator.
//!
//! # Features
//!
//! - **Auto-commit writes**: outside a batch each write is its own transaction
//! - **Nested batches**: scopes share one transaction, flushed every
//!   `flush_threshold` writes
//! - **Scans inside the batch**: range iterators read through the engine's
//!   transaction and observe uncommitted batch writes
//! - **Bounded growth**: a write that grows the file past `map_size` bytes fails
//!   with a capacity error and only its transaction is rolled back
//! - **Relaxed durability**: commits skip the sync, with a durable checkpoint
//!   at the end of each batch, every `checkpoint_interval` commits and on close
//!
//! # Example
//!
//! ```ignore
//! use kvbridge_storage::backends::redb::{EnvConfig, RedbEngineFactory};
//! use kvbridge_storage::{EngineIterator, KeyValueEngine, KeyValueEngineFactory};
//!
//! let mut factory = RedbEngineFactory::new(EnvConfig::new().path("/var/lib/kv"));
//! let mut engine = factory.create_namespace("users")?;
//!
//! engine.begin_batch()?;
//! engine.put(b"user:1", b"Alice")?;
//! engine.put(b"user:2", b"Bob")?;
//! engine.commit_batch()?;
//!
//! let mut iter = engine.range_scan(b"user:")?;
//! while iter.valid() {
//!     println!("{:?}", iter.current());
//!     iter.next()?;
//! }
//! iter.release()?;
//! ```
//!
//! # In-Memory Environments
//!
//! For tests, an environment can live entirely in memory:
//!
//! ```ignore
//! let mut factory = RedbEngineFactory::in_memory();
//! ```

mod config;
mod engine;
mod env;
mod error;
mod factory;
mod iterator;
pub mod tables;

pub use config::{
    EnvConfig, DATA_FILE_NAME, DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_FLUSH_THRESHOLD,
    DEFAULT_MAP_SIZE, DEFAULT_MAX_DB,
};
pub use engine::RedbKvEngine;
pub use factory::RedbEngineFactory;
pub use iterator::RedbIterator;
