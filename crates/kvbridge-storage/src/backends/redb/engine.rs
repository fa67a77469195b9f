//! Redb key-value engine implementation.
//!
//! This module provides [`RedbKvEngine`], the adapter between one namespace
//! of a shared [`Environment`] and the [`KeyValueEngine`] contract.
//!
//! # Transaction Discipline
//!
//! ```text
//!            begin_batch                     begin_batch
//!   ┌────────────────┐  depth 0 -> 1  ┌──────────────────────┐  depth += 1
//!   │ NoTransaction  │ ─────────────▶ │ TransactionOpen(d>0) │ ◀─────────┐
//!   └────────────────┘ ◀───────────── └──────────────────────┘ ──────────┘
//!            commit_batch / discard_batch at depth 1
//! ```
//!
//! - With no open batch every write runs in its own transaction and commits
//!   immediately. Reads use a short-lived snapshot.
//! - With an open batch, writes go to the shared transaction. Every
//!   `flush_threshold` writes the transaction is committed and replaced,
//!   which bounds its size. A flushed prefix survives a later discard.
//! - A write that grows the file past `map_size` fails with
//!   [`StorageError::CapacityExceeded`] and its transaction is rolled back.
//!   Inside a batch that loses the writes since the last flush; the batch
//!   itself stays open.
//! - Auto-commits and flushes skip the sync. The outermost batch commit,
//!   namespace creation and erasure are durable.

use std::marker::PhantomData;
use std::sync::Arc;

use redb::{ReadableTable, WriteTransaction};
use tracing::{debug, error, warn};

use crate::engine::{
    BytewiseComparator, ErrorKind, KeyComparator, KeyValueEngine, StorageError, StorageResult,
};

use super::env::Environment;
use super::iterator::RedbIterator;
use super::tables::{namespace_table, NamespaceTable};

/// An engine over one namespace of a redb environment.
///
/// Created by [`RedbEngineFactory`](super::RedbEngineFactory). The engine
/// keeps the environment alive through an `Arc`, and holds an exclusive
/// claim on its namespace until it is closed or dropped.
///
/// # Thread Safety
///
/// The batch state (depth, pending writes, active transaction) is owned by
/// the engine and mutated through `&mut self`. Share an engine between
/// threads only behind a mutex.
///
/// Redb admits one write transaction per environment at a time. While one
/// engine has a batch open, an auto-commit write or a new batch on another
/// engine of the same environment blocks until the batch ends.
pub struct RedbKvEngine<C: KeyComparator = BytewiseComparator> {
    env: Arc<Environment>,
    namespace: String,
    open: bool,
    txn: Option<WriteTransaction>,
    depth: usize,
    pending_writes: usize,
    flush_threshold: usize,
    _comparator: PhantomData<fn() -> C>,
}

impl<C: KeyComparator> RedbKvEngine<C> {
    /// Claim `name` in `env` and make sure its table exists with this
    /// engine's comparator.
    pub(crate) fn open(env: Arc<Environment>, name: &str) -> StorageResult<Self> {
        if name.is_empty() {
            return Err(StorageError::config("namespace name must not be empty"));
        }
        env.claim(name)?;

        let flush_threshold = env.config().flush_threshold;
        // From here on, Drop releases the claim if initialization fails.
        let engine = Self {
            env,
            namespace: name.to_string(),
            open: true,
            txn: None,
            depth: 0,
            pending_writes: 0,
            flush_threshold,
            _comparator: PhantomData,
        };
        engine.init()?;
        Ok(engine)
    }

    fn init(&self) -> StorageResult<()> {
        let txn = self.env.begin_write()?;
        self.env.check_capacity(&txn, &self.namespace)?;
        txn.open_table(self.table())?;
        self.env.check_growth()?;
        self.env.commit(txn, true)
    }

    /// The namespace this engine serves.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Current batch nesting depth. Zero when no batch is open.
    #[must_use]
    pub const fn batch_depth(&self) -> usize {
        self.depth
    }

    /// Writes issued against the active transaction since it was started.
    #[must_use]
    pub const fn pending_writes(&self) -> usize {
        self.pending_writes
    }

    /// Whether a batch scope is open.
    #[must_use]
    pub const fn in_batch(&self) -> bool {
        self.txn.is_some()
    }

    /// Whether the namespace handle has been closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        !self.open
    }

    /// Writes accumulated in a batch before it is flushed.
    #[must_use]
    pub const fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }

    pub(crate) fn table(&self) -> NamespaceTable<'_, C> {
        namespace_table::<C>(&self.namespace)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(StorageError::NamespaceClosed)
        }
    }

    /// The transaction hosting an iterator's cursor.
    pub(crate) fn scan_txn(&self) -> StorageResult<&WriteTransaction> {
        self.ensure_open()?;
        self.txn
            .as_ref()
            .ok_or_else(|| StorageError::invalid_state("cursor has no active transaction"))
    }

    /// Close the batch scope opened for an iterator.
    pub(crate) fn end_scan(&mut self) -> StorageResult<()> {
        self.commit_batch()
    }

    fn record_write(&mut self) -> StorageResult<()> {
        self.pending_writes += 1;
        if self.pending_writes >= self.flush_threshold {
            self.flush_batch()?;
        }
        Ok(())
    }

    /// Report a failed write inside a batch.
    ///
    /// A capacity failure leaves the transaction unusable, so it is rolled
    /// back and replaced while the scope stays open.
    fn fail_batched_write(&mut self, op: &str, err: StorageError) -> StorageResult<()> {
        error!(namespace = %self.namespace, "batched {op} failed: {err}");
        if err.kind() == ErrorKind::CapacityExceeded {
            if let Some(txn) = self.txn.take() {
                warn!(
                    namespace = %self.namespace,
                    depth = self.depth,
                    pending = self.pending_writes,
                    "rolling back unflushed batch writes"
                );
                if let Err(e) = txn.abort() {
                    error!(namespace = %self.namespace, "failed to roll back batch: {e}");
                }
            }
            // A failed reopen collapses the scope and is logged there.
            let _ = self.reopen();
        }
        Err(err)
    }

    /// Drop the active transaction without committing and leave batch mode.
    fn rollback_open_batch(&mut self, reason: &str) {
        if let Some(txn) = self.txn.take() {
            warn!(
                namespace = %self.namespace,
                depth = self.depth,
                pending = self.pending_writes,
                "{reason}: rolling back open batch"
            );
            if let Err(e) = txn.abort() {
                error!(namespace = %self.namespace, "failed to roll back batch: {e}");
            }
        }
        self.depth = 0;
        self.pending_writes = 0;
    }

    /// Start a replacement transaction for a scope that is still open.
    ///
    /// On failure the scope collapses to depth zero so that a positive depth
    /// always implies an active transaction.
    fn reopen(&mut self) -> StorageResult<()> {
        match self.env.begin_write() {
            Ok(txn) => {
                self.txn = Some(txn);
                self.pending_writes = 0;
                Ok(())
            }
            Err(e) => {
                error!(
                    namespace = %self.namespace,
                    depth = self.depth,
                    "failed to reopen batch transaction: {e}"
                );
                self.depth = 0;
                self.pending_writes = 0;
                Err(e)
            }
        }
    }

    /// Erase every entry of the namespace and close the handle.
    ///
    /// An open batch is rolled back first. A closed engine is left as is.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace could not be dropped. The handle
    /// stays open in that case.
    pub fn erase_all(&mut self) -> StorageResult<()> {
        if !self.open {
            return Ok(());
        }
        self.rollback_open_batch("erasing namespace");

        let txn = self.env.begin_write()?;
        txn.delete_table(self.table())?;
        self.env.commit(txn, true)?;
        debug!(namespace = %self.namespace, "erased namespace");

        self.close_namespace();
        Ok(())
    }

    /// Close the namespace handle. Idempotent.
    ///
    /// An open batch is rolled back. Data already committed is kept.
    pub fn close_namespace(&mut self) {
        if !self.open {
            return;
        }
        self.rollback_open_batch("closing namespace");
        self.env.release(&self.namespace);
        self.open = false;
        debug!(namespace = %self.namespace, "closed namespace");
    }
}

fn insert_into<C: KeyComparator>(
    env: &Environment,
    txn: &WriteTransaction,
    table: NamespaceTable<'_, C>,
    key: &[u8],
    value: &[u8],
) -> StorageResult<()> {
    {
        let mut table = txn.open_table(table)?;
        table.insert(key, value)?;
    }
    env.check_growth()
}

fn remove_from<C: KeyComparator>(
    env: &Environment,
    txn: &WriteTransaction,
    table: NamespaceTable<'_, C>,
    key: &[u8],
) -> StorageResult<()> {
    {
        let mut table = txn.open_table(table)?;
        table.remove(key)?;
    }
    env.check_growth()
}

fn read_from<T, C>(table: &T, key: &[u8]) -> StorageResult<Option<Vec<u8>>>
where
    T: ReadableTable<super::tables::OrderedKey<C>, &'static [u8]>,
    C: KeyComparator,
{
    let value = table.get(key)?.map(|guard| guard.value().to_vec());
    Ok(value)
}

impl<C: KeyComparator> KeyValueEngine for RedbKvEngine<C> {
    type Iterator<'a>
        = RedbIterator<'a, C>
    where
        Self: 'a;

    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.ensure_open()?;
        if let Some(txn) = &self.txn {
            if let Err(e) = insert_into(&self.env, txn, self.table(), key, value) {
                return self.fail_batched_write("put", e);
            }
            return self.record_write();
        }

        let txn = self.env.begin_write()?;
        let written = insert_into(&self.env, &txn, self.table(), key, value)
            .and_then(|()| self.env.commit(txn, false));
        if let Err(e) = &written {
            error!(namespace = %self.namespace, "put failed: {e}");
        }
        written
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.ensure_open()?;
        let found = if let Some(txn) = &self.txn {
            let table = txn.open_table(self.table())?;
            read_from(&table, key)
        } else {
            let txn = self.env.begin_read()?;
            let table = txn.open_table(self.table())?;
            read_from(&table, key)
        };
        if let Err(e) = &found {
            error!(namespace = %self.namespace, "get failed: {e}");
        }
        found
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<()> {
        self.ensure_open()?;
        if let Some(txn) = &self.txn {
            if let Err(e) = remove_from(&self.env, txn, self.table(), key) {
                return self.fail_batched_write("delete", e);
            }
            return self.record_write();
        }

        let txn = self.env.begin_write()?;
        let removed = remove_from(&self.env, &txn, self.table(), key)
            .and_then(|()| self.env.commit(txn, false));
        if let Err(e) = &removed {
            error!(namespace = %self.namespace, "delete failed: {e}");
        }
        removed
    }

    fn range_scan(&mut self, start_key: &[u8]) -> StorageResult<Self::Iterator<'_>> {
        if let Err(e) = self.begin_batch() {
            error!(namespace = %self.namespace, "failed to create cursor: {e}");
            return Err(StorageError::invalid_state(format!("cannot open cursor: {e}")));
        }
        let mut iter = RedbIterator::new(self);
        iter.seek_at(start_key)?;
        Ok(iter)
    }

    fn begin_batch(&mut self) -> StorageResult<()> {
        self.ensure_open()?;
        if self.txn.is_none() {
            let txn = self.env.begin_write()?;
            self.txn = Some(txn);
            self.pending_writes = 0;
        }
        self.depth += 1;
        Ok(())
    }

    fn commit_batch(&mut self) -> StorageResult<()> {
        if self.depth == 0 {
            return Err(StorageError::invalid_state("commit_batch called with no open batch"));
        }
        self.depth -= 1;
        if self.depth > 0 {
            return Ok(());
        }

        self.pending_writes = 0;
        if let Some(txn) = self.txn.take() {
            if let Err(e) = self.env.commit(txn, true) {
                error!(namespace = %self.namespace, "failed to commit batch: {e}");
                return Err(e);
            }
        }
        Ok(())
    }

    fn discard_batch(&mut self) -> StorageResult<()> {
        if self.depth == 0 {
            return Err(StorageError::invalid_state("discard_batch called with no open batch"));
        }
        self.depth -= 1;
        self.pending_writes = 0;

        // The transaction is shared by every level, so it goes regardless of depth.
        let aborted = match self.txn.take() {
            Some(txn) => txn.abort(),
            None => Ok(()),
        };
        if self.depth > 0 {
            warn!(
                namespace = %self.namespace,
                depth = self.depth,
                "nested discard rolled back the enclosing batch"
            );
            self.reopen()?;
        }
        if let Err(e) = aborted {
            error!(namespace = %self.namespace, "failed to roll back batch: {e}");
            return Err(e.into());
        }
        Ok(())
    }

    fn flush_batch(&mut self) -> StorageResult<()> {
        if self.pending_writes == 0 {
            return Ok(());
        }
        let Some(txn) = self.txn.take() else {
            self.pending_writes = 0;
            return Ok(());
        };

        let committed = self.env.commit(txn, false);
        self.reopen()?;
        if let Err(e) = committed {
            error!(namespace = %self.namespace, "failed to commit flushed batch: {e}");
            return Err(e);
        }
        debug!(namespace = %self.namespace, depth = self.depth, "flushed batch");
        Ok(())
    }
}

impl<C: KeyComparator> Drop for RedbKvEngine<C> {
    fn drop(&mut self) {
        self.close_namespace();
    }
}
