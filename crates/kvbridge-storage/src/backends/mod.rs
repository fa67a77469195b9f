//! Storage backend implementations.
//!
//! - [`redb`] - Engines over a redb environment

pub mod redb;

pub use self::redb::{EnvConfig, RedbEngineFactory, RedbIterator, RedbKvEngine};
