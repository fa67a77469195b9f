//! Core engine contract.
//!
//! This module defines the capability set an outer key-value server is
//! written against:
//!
//! - [`KeyValueEngineFactory`] - Owns a store environment and issues engines per namespace
//! - [`KeyValueEngine`] - Point operations, batch scopes and range scans over one namespace
//! - [`EngineIterator`] - Bidirectional positioned view returned by a range scan
//!
//! Any backend implementing these traits can be selected at startup.

use super::StorageResult;

/// Issues namespace-scoped engines from one shared environment.
pub trait KeyValueEngineFactory {
    /// The engine type issued by this factory.
    type Engine: KeyValueEngine;

    /// Create (or open) the namespace `name` and return an engine bound to it.
    ///
    /// The first call opens the environment. On failure no engine is returned
    /// and the caller decides whether the failure is fatal.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment cannot be opened or the namespace
    /// cannot be initialized.
    fn create_namespace(&mut self, name: &str) -> StorageResult<Self::Engine>;

    /// Release an engine. The namespace's data is retained.
    fn close_namespace(&mut self, engine: Self::Engine);

    /// Erase every entry of the engine's namespace, then release the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace could not be erased. The engine is
    /// released either way.
    fn destroy_namespace(&mut self, engine: Self::Engine) -> StorageResult<()>;
}

/// A key-value engine over one namespace.
///
/// Without an open batch every write is its own auto-committed transaction.
/// Between [`begin_batch`](Self::begin_batch) and the matching
/// [`commit_batch`](Self::commit_batch) or [`discard_batch`](Self::discard_batch)
/// all operations share one transaction and observe each other's writes.
///
/// # Nesting
///
/// Batch scopes nest by reference count only. The shared transaction is
/// committed when the outermost scope commits, and a discard at any depth
/// rolls back everything written since the last flush, including writes made
/// by enclosing scopes. Nested scopes are not independently atomic.
///
/// # Thread Safety
///
/// An engine's batch state is not synchronized. Confine each engine to one
/// caller at a time; the `&mut self` receivers enforce this within safe code.
pub trait KeyValueEngine {
    /// The iterator type returned by [`range_scan`](Self::range_scan).
    type Iterator<'a>: EngineIterator
    where
        Self: 'a;

    /// Insert or replace `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Look up `key`.
    ///
    /// Returns `Ok(Some(value))` if found and `Ok(None)` if not.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself failed.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Remove `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the delete.
    fn delete(&mut self, key: &[u8]) -> StorageResult<()>;

    /// Open an iterator positioned at the first key `>= start_key`.
    ///
    /// The iterator joins (or opens) a batch scope that is closed when the
    /// iterator is released or dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction could be opened to host the cursor.
    fn range_scan(&mut self, start_key: &[u8]) -> StorageResult<Self::Iterator<'_>>;

    /// Open a batch scope, starting a transaction if none is active.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction could not be started.
    fn begin_batch(&mut self) -> StorageResult<()>;

    /// Close a batch scope, committing once the outermost scope closes.
    ///
    /// # Errors
    ///
    /// Returns an error if no batch is open or the commit failed.
    fn commit_batch(&mut self) -> StorageResult<()>;

    /// Close a batch scope, rolling back the shared transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no batch is open or the rollback failed.
    fn discard_batch(&mut self) -> StorageResult<()>;

    /// Commit the writes made so far inside the open batch and continue the
    /// batch on a fresh transaction. A no-op when nothing is pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit or the reopen failed.
    fn flush_batch(&mut self) -> StorageResult<()>;
}

/// A bidirectional cursor over one namespace.
///
/// Movement methods return the new validity. `key`, `value` and `current`
/// return `None` while the iterator is invalid.
pub trait EngineIterator {
    /// Position at the first key `>=` `key` under the namespace's comparator.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lookup failed.
    fn seek(&mut self, key: &[u8]) -> StorageResult<bool>;

    /// Position at the least key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lookup failed.
    fn seek_first(&mut self) -> StorageResult<bool>;

    /// Position at the greatest key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lookup failed.
    fn seek_last(&mut self) -> StorageResult<bool>;

    /// Advance one entry. An unpositioned iterator moves to the first entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lookup failed.
    fn next(&mut self) -> StorageResult<bool>;

    /// Retreat one entry. An unpositioned iterator moves to the last entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lookup failed.
    fn prev(&mut self) -> StorageResult<bool>;

    /// Whether the iterator references an existing entry.
    fn valid(&self) -> bool;

    /// The current key.
    fn key(&self) -> Option<&[u8]>;

    /// The current value.
    fn value(&self) -> Option<&[u8]>;

    /// The current entry.
    fn current(&self) -> Option<(&[u8], &[u8])>;

    /// Close the cursor and end the batch scope the scan opened.
    ///
    /// Dropping the iterator does the same but can only log a failed commit.
    ///
    /// # Errors
    ///
    /// Returns an error if closing the scope committed and the commit failed.
    fn release(self) -> StorageResult<()>
    where
        Self: Sized;
}
