//! Engine contract and abstractions.
//!
//! This module defines the traits that storage backends must implement:
//!
//! - [`KeyValueEngineFactory`] - Environment owner issuing engines per namespace
//! - [`KeyValueEngine`] - Point operations, batch scopes and range scans
//! - [`EngineIterator`] - Bidirectional iteration bound to an engine's transaction
//! - [`KeyComparator`] - The key order installed into every namespace
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`] which is an alias for
//! `Result<T, StorageError>`. A lookup miss is `Ok(None)`, never an error.

mod comparator;
mod error;
mod traits;

pub use comparator::{BytewiseComparator, KeyComparator, ReverseBytewiseComparator};
pub use error::{ErrorKind, StorageError, StorageResult};
pub use traits::{EngineIterator, KeyValueEngine, KeyValueEngineFactory};
