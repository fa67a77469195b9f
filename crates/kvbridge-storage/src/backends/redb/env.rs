//! The shared store environment.
//!
//! One [`Environment`] wraps one redb database and is shared by every engine
//! a factory issues. It applies the environment-wide policies: the map-size
//! ceiling, the namespace-count ceiling, commit durability and exclusive
//! namespace ownership.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use redb::backends::{FileBackend, InMemoryBackend};
use redb::{
    Database, Durability, ReadTransaction, StorageBackend, TableHandle, WriteTransaction,
};
use tracing::{debug, info, warn};

use crate::engine::{StorageError, StorageResult};

use super::config::EnvConfig;
use super::error::MapSizeExceeded;

/// Tracks growth of the data file against the map size.
///
/// Growth past the limit is allowed through to the store and only recorded:
/// an I/O error from the backend would poison the whole database. The
/// engine checks the record after each write and rolls back the offending
/// transaction, so the file overshoots the limit by at most one growth step.
#[derive(Debug)]
struct Ceiling {
    limit: u64,
    /// Largest size requested past `limit` by the current write transaction, or 0.
    refused: AtomicU64,
    syncs: AtomicU64,
}

impl Ceiling {
    const fn new(limit: u64) -> Self {
        Self { limit, refused: AtomicU64::new(0), syncs: AtomicU64::new(0) }
    }

    fn observe(&self, len: u64) {
        if len > self.limit {
            self.refused.fetch_max(len, Ordering::Relaxed);
        }
    }

    fn reset(&self) {
        self.refused.store(0, Ordering::Relaxed);
    }

    fn check(&self) -> StorageResult<()> {
        match self.refused.load(Ordering::Relaxed) {
            0 => Ok(()),
            requested => Err(StorageError::CapacityExceeded(
                MapSizeExceeded { requested, limit: self.limit }.to_string(),
            )),
        }
    }
}

/// A storage backend that reports its growth to a [`Ceiling`].
#[derive(Debug)]
struct BoundedBackend<B> {
    inner: B,
    ceiling: Arc<Ceiling>,
}

impl<B: StorageBackend> BoundedBackend<B> {
    const fn new(inner: B, ceiling: Arc<Ceiling>) -> Self {
        Self { inner, ceiling }
    }
}

impl<B: StorageBackend> StorageBackend for BoundedBackend<B> {
    fn len(&self) -> Result<u64, io::Error> {
        self.inner.len()
    }

    fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>, io::Error> {
        self.inner.read(offset, len)
    }

    fn set_len(&self, len: u64) -> Result<(), io::Error> {
        self.ceiling.observe(len);
        self.inner.set_len(len)
    }

    fn sync_data(&self, eventual: bool) -> Result<(), io::Error> {
        self.ceiling.syncs.fetch_add(1, Ordering::Relaxed);
        self.inner.sync_data(eventual)
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<(), io::Error> {
        self.inner.write(offset, data)
    }
}

/// A redb database shared by all namespaces of one factory.
pub struct Environment {
    db: Database,
    config: EnvConfig,
    ceiling: Arc<Ceiling>,
    /// Commits made without a sync since the last durable one.
    relaxed_commits: AtomicU64,
    /// Namespaces currently held by a live engine.
    live: Mutex<HashSet<String>>,
}

impl Environment {
    /// Open the environment described by `config`, creating its directory
    /// and data file if needed.
    pub(crate) fn open(config: &EnvConfig) -> StorageResult<Self> {
        let ceiling = Arc::new(Ceiling::new(config.map_size));
        let builder = Database::builder();
        let created = if config.in_memory {
            builder.create_with_backend(BoundedBackend::new(
                InMemoryBackend::new(),
                Arc::clone(&ceiling),
            ))
        } else {
            fs::create_dir_all(config.dir())
                .map_err(|e| StorageError::Open(format!("{}: {e}", config.dir().display())))?;
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(config.data_file())
                .map_err(|e| StorageError::Open(format!("{}: {e}", config.data_file().display())))?;
            let backend = FileBackend::new(file).map_err(open_error)?;
            builder.create_with_backend(BoundedBackend::new(backend, Arc::clone(&ceiling)))
        };
        let db = created.map_err(open_error)?;
        ceiling.check()?;

        info!(
            path = %config.dir().display(),
            in_memory = config.in_memory,
            max_db = config.max_db,
            map_size = config.map_size,
            sync_on_commit = config.sync_on_commit,
            "opened environment"
        );

        Ok(Self {
            db,
            config: config.clone(),
            ceiling,
            relaxed_commits: AtomicU64::new(0),
            live: Mutex::new(HashSet::new()),
        })
    }

    /// The configuration the environment was opened with.
    #[must_use]
    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Begin a write transaction.
    pub(crate) fn begin_write(&self) -> StorageResult<WriteTransaction> {
        let txn = self.db.begin_write()?;
        // One write transaction at a time, so the record belongs to this one.
        self.ceiling.reset();
        Ok(txn)
    }

    /// Begin a read-only snapshot.
    pub(crate) fn begin_read(&self) -> StorageResult<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    /// Fail if the current write transaction grew the file past `map_size`.
    /// The transaction must then be rolled back.
    pub(crate) fn check_growth(&self) -> StorageResult<()> {
        self.ceiling.check()
    }

    /// Commit `txn`.
    ///
    /// A commit is made durable when `checkpoint` is set, when
    /// `sync_on_commit` is configured, or once `checkpoint_interval` relaxed
    /// commits have accumulated. Other commits skip the sync: they survive a
    /// clean shutdown but may be lost on a crash.
    pub(crate) fn commit(&self, mut txn: WriteTransaction, checkpoint: bool) -> StorageResult<()> {
        let durable = checkpoint
            || self.config.sync_on_commit
            || self.relaxed_commits.load(Ordering::Relaxed) + 1 >= self.config.checkpoint_interval;
        txn.set_durability(if durable { Durability::Immediate } else { Durability::None });
        txn.commit()?;

        if durable {
            self.relaxed_commits.store(0, Ordering::Relaxed);
        } else {
            self.relaxed_commits.fetch_add(1, Ordering::Relaxed);
        }
        if let Err(e) = self.ceiling.check() {
            warn!(path = %self.config.dir().display(), "commit grew the data file: {e}");
        }
        Ok(())
    }

    /// Make every relaxed commit so far durable.
    pub(crate) fn checkpoint(&self) -> StorageResult<()> {
        let txn = self.begin_write()?;
        self.commit(txn, true)
    }

    /// Check, inside `txn`, that `name` may be created without exceeding
    /// `max_db`. Existing namespaces always pass.
    pub(crate) fn check_capacity(&self, txn: &WriteTransaction, name: &str) -> StorageResult<()> {
        let mut count: u64 = 0;
        for table in txn.list_tables()? {
            if table.name() == name {
                return Ok(());
            }
            count += 1;
        }
        if count >= u64::from(self.config.max_db) {
            return Err(StorageError::CapacityExceeded(format!(
                "environment already holds {count} namespaces (max_db = {})",
                self.config.max_db
            )));
        }
        Ok(())
    }

    /// Record that `name` is held by a live engine.
    pub(crate) fn claim(&self, name: &str) -> StorageResult<()> {
        if !self.live_namespaces().insert(name.to_string()) {
            return Err(StorageError::invalid_state(format!(
                "namespace '{name}' is already open in another engine"
            )));
        }
        Ok(())
    }

    /// Release a claim taken by [`claim`](Self::claim).
    pub(crate) fn release(&self, name: &str) {
        self.live_namespaces().remove(name);
    }

    /// Number of namespaces currently held by live engines.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live_namespaces().len()
    }

    #[cfg(test)]
    fn sync_count(&self) -> u64 {
        self.ceiling.syncs.load(Ordering::Relaxed)
    }

    fn live_namespaces(&self) -> MutexGuard<'_, HashSet<String>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if self.relaxed_commits.load(Ordering::Relaxed) > 0 {
            if let Err(e) = self.checkpoint() {
                warn!(path = %self.config.dir().display(), "final checkpoint failed: {e}");
            }
        }
        debug!(path = %self.config.dir().display(), "closing environment");
    }
}

fn open_error(err: redb::DatabaseError) -> StorageError {
    match StorageError::from(err) {
        StorageError::Io(msg) => StorageError::Open(msg),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ErrorKind;

    type RawTable = redb::TableDefinition<'static, &'static [u8], &'static [u8]>;

    const RAW: RawTable = redb::TableDefinition::new("raw");

    fn write_one(env: &Environment, key: &[u8]) -> WriteTransaction {
        let txn = env.begin_write().expect("begin");
        {
            let mut table = txn.open_table(RAW).expect("open table");
            table.insert(key, &b"value"[..]).expect("insert");
        }
        txn
    }

    #[test]
    fn test_ceiling_records_growth_without_failing() {
        let ceiling = Arc::new(Ceiling::new(4096));
        let backend = BoundedBackend::new(InMemoryBackend::new(), Arc::clone(&ceiling));
        backend.set_len(4096).expect("within limit");
        ceiling.check().expect("nothing refused yet");

        backend.set_len(8192).expect("growth is passed through");
        assert_eq!(backend.len().expect("len"), 8192);
        let err = ceiling.check().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert!(err.to_string().contains("8192"));

        ceiling.reset();
        ceiling.check().expect("reset clears the record");
    }

    #[test]
    fn test_relaxed_commits_skip_sync() {
        let env = Environment::open(&EnvConfig::in_memory()).expect("open");
        let baseline = env.sync_count();

        for i in 0..100u32 {
            let txn = write_one(&env, &i.to_be_bytes());
            env.commit(txn, false).expect("commit");
        }
        assert_eq!(env.sync_count(), baseline);

        env.checkpoint().expect("checkpoint");
        assert!(env.sync_count() > baseline);
    }

    #[test]
    fn test_checkpoint_interval_forces_sync() {
        let env = Environment::open(&EnvConfig::in_memory().checkpoint_interval(10)).expect("open");
        let baseline = env.sync_count();

        for i in 0..9u32 {
            let txn = write_one(&env, &i.to_be_bytes());
            env.commit(txn, false).expect("commit");
        }
        assert_eq!(env.sync_count(), baseline);

        let txn = write_one(&env, b"tenth");
        env.commit(txn, false).expect("commit");
        assert!(env.sync_count() > baseline);
    }

    #[test]
    fn test_sync_on_commit_syncs_every_commit() {
        let env = Environment::open(&EnvConfig::in_memory().sync_on_commit(true)).expect("open");
        let baseline = env.sync_count();

        for i in 0..10u32 {
            let txn = write_one(&env, &i.to_be_bytes());
            env.commit(txn, false).expect("commit");
        }
        assert!(env.sync_count() >= baseline + 10);
    }

    #[test]
    fn test_claims_are_exclusive() {
        let env = Environment::open(&EnvConfig::in_memory()).expect("open");
        env.claim("users").expect("first claim");
        let err = env.claim("users").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(env.live_count(), 1);

        env.release("users");
        env.claim("users").expect("claim after release");
    }

    #[test]
    fn test_capacity_counts_existing_tables() {
        let env = Environment::open(&EnvConfig::in_memory().max_db(1)).expect("open");
        let txn = env.begin_write().expect("begin");
        env.check_capacity(&txn, "raw").expect("room for one");
        txn.open_table(RAW).expect("create table");
        env.check_capacity(&txn, "raw").expect("existing namespace passes");
        let err = env.check_capacity(&txn, "second").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
    }
}
