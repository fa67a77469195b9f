//! Range iterator over a redb namespace.
//!
//! A [`RedbIterator`] borrows its engine mutably for as long as it lives, so
//! the batch scope it opened cannot be closed underneath it. Each movement
//! re-seeks the table inside the engine's transaction relative to the
//! current key, which keeps the cursor valid across flushes.
//!
//! Redb's guards borrow the table, which is opened per movement, so the
//! current entry is copied out. The copy lands in one of two buffers that
//! are swapped on every move: once they have grown, stepping allocates
//! nothing, and `key()`/`value()` borrow from the buffer without copying.
//! The cost is one tree search per step instead of a cursor advance.

use std::mem;
use std::ops::Bound;

use redb::{AccessGuard, ReadableTable};
use tracing::warn;

use crate::engine::{EngineIterator, KeyComparator, StorageResult};

use super::engine::RedbKvEngine;
use super::tables::OrderedKey;

type Entry = (Vec<u8>, Vec<u8>);

/// Where the next lookup should land.
#[derive(Debug, Clone, Copy)]
enum Position<'k> {
    First,
    Last,
    AtOrAfter(&'k [u8]),
    After(&'k [u8]),
    Before(&'k [u8]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No movement has been made yet.
    Unpositioned,
    /// `entry` holds the current key and value.
    At,
    /// Moved past either end; only a seek repositions it.
    Exhausted,
}

/// Bidirectional iterator returned by [`RedbKvEngine`]'s range scan.
///
/// Reads observe every write made in the engine's open batch, including
/// writes made before the scan started.
pub struct RedbIterator<'e, C: KeyComparator> {
    engine: &'e mut RedbKvEngine<C>,
    state: State,
    entry: Entry,
    /// Receives the next entry before it is swapped into `entry`.
    spare: Entry,
    released: bool,
}

fn fill<C: KeyComparator>(
    out: &mut Entry,
    (key, value): (AccessGuard<'_, OrderedKey<C>>, AccessGuard<'_, &'static [u8]>),
) {
    out.0.clear();
    out.0.extend_from_slice(key.value());
    out.1.clear();
    out.1.extend_from_slice(value.value());
}

/// Copy the entry at `position` into `out`. Returns whether one was found.
fn locate<C: KeyComparator>(
    engine: &RedbKvEngine<C>,
    position: Position<'_>,
    out: &mut Entry,
) -> StorageResult<bool> {
    let txn = engine.scan_txn()?;
    let table = txn.open_table(engine.table())?;
    let found = match position {
        Position::First => table.first()?,
        Position::Last => table.last()?,
        Position::AtOrAfter(key) => table
            .range::<&[u8]>((Bound::Included(key), Bound::Unbounded))?
            .next()
            .transpose()?,
        Position::After(key) => table
            .range::<&[u8]>((Bound::Excluded(key), Bound::Unbounded))?
            .next()
            .transpose()?,
        Position::Before(key) => table
            .range::<&[u8]>((Bound::Unbounded, Bound::Excluded(key)))?
            .next_back()
            .transpose()?,
    };
    let hit = match found {
        Some(pair) => {
            fill::<C>(out, pair);
            true
        }
        None => false,
    };
    Ok(hit)
}

impl<'e, C: KeyComparator> RedbIterator<'e, C> {
    /// Wrap an engine whose batch scope has already been joined.
    pub(crate) fn new(engine: &'e mut RedbKvEngine<C>) -> Self {
        Self {
            engine,
            state: State::Unpositioned,
            entry: Entry::default(),
            spare: Entry::default(),
            released: false,
        }
    }

    /// Position at the first key `>= key`.
    pub(crate) fn seek_at(&mut self, key: &[u8]) -> StorageResult<bool> {
        self.move_to(Position::AtOrAfter(key))
    }

    fn move_to(&mut self, position: Position<'_>) -> StorageResult<bool> {
        let found = locate(self.engine, position, &mut self.spare)?;
        Ok(self.settle(found))
    }

    fn settle(&mut self, found: bool) -> bool {
        if found {
            mem::swap(&mut self.entry, &mut self.spare);
            self.state = State::At;
        } else {
            self.state = State::Exhausted;
        }
        found
    }

    fn step(&mut self, forward: bool) -> StorageResult<bool> {
        let found = match (self.state, forward) {
            (State::Exhausted, _) => return Ok(false),
            (State::Unpositioned, true) => locate(self.engine, Position::First, &mut self.spare)?,
            (State::Unpositioned, false) => locate(self.engine, Position::Last, &mut self.spare)?,
            (State::At, true) => {
                locate(self.engine, Position::After(&self.entry.0), &mut self.spare)?
            }
            (State::At, false) => {
                locate(self.engine, Position::Before(&self.entry.0), &mut self.spare)?
            }
        };
        Ok(self.settle(found))
    }
}

impl<C: KeyComparator> EngineIterator for RedbIterator<'_, C> {
    fn seek(&mut self, key: &[u8]) -> StorageResult<bool> {
        self.seek_at(key)
    }

    fn seek_first(&mut self) -> StorageResult<bool> {
        self.move_to(Position::First)
    }

    fn seek_last(&mut self) -> StorageResult<bool> {
        self.move_to(Position::Last)
    }

    fn next(&mut self) -> StorageResult<bool> {
        self.step(true)
    }

    fn prev(&mut self) -> StorageResult<bool> {
        self.step(false)
    }

    fn valid(&self) -> bool {
        self.state == State::At
    }

    fn key(&self) -> Option<&[u8]> {
        self.current().map(|(key, _)| key)
    }

    fn value(&self) -> Option<&[u8]> {
        self.current().map(|(_, value)| value)
    }

    fn current(&self) -> Option<(&[u8], &[u8])> {
        match self.state {
            State::At => Some((self.entry.0.as_slice(), self.entry.1.as_slice())),
            State::Unpositioned | State::Exhausted => None,
        }
    }

    fn release(mut self) -> StorageResult<()> {
        self.released = true;
        self.engine.end_scan()
    }
}

impl<C: KeyComparator> Drop for RedbIterator<'_, C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.engine.end_scan() {
            warn!(namespace = %self.engine.namespace(), "failed to close scan scope: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::backends::redb::env::Environment;
    use crate::backends::redb::EnvConfig;
    use crate::engine::{BytewiseComparator, KeyValueEngine};

    use super::*;

    fn populated(keys: &[&str]) -> (Arc<Environment>, RedbKvEngine<BytewiseComparator>) {
        let env = Arc::new(Environment::open(&EnvConfig::in_memory()).expect("open env"));
        let mut engine = RedbKvEngine::open(Arc::clone(&env), "scan").expect("open namespace");
        for key in keys {
            engine.put(key.as_bytes(), key.to_uppercase().as_bytes()).unwrap();
        }
        (env, engine)
    }

    #[test]
    fn test_scan_joins_and_leaves_scope() {
        let (_env, mut engine) = populated(&["a", "b"]);
        {
            let iter = engine.range_scan(b"").unwrap();
            assert_eq!(iter.key(), Some(&b"a"[..]));
        }
        assert_eq!(engine.batch_depth(), 0);
        assert!(!engine.in_batch());

        engine.begin_batch().unwrap();
        let iter = engine.range_scan(b"a").unwrap();
        iter.release().unwrap();
        assert_eq!(engine.batch_depth(), 1);
        engine.commit_batch().unwrap();
    }

    #[test]
    fn test_exhausted_iterator_stays_invalid_until_seek() {
        let (_env, mut engine) = populated(&["a", "b"]);
        let mut iter = engine.range_scan(b"b").unwrap();
        assert!(iter.valid());
        assert!(!iter.next().unwrap());
        assert!(!iter.next().unwrap());
        assert!(!iter.prev().unwrap());
        assert_eq!(iter.current(), None);

        assert!(iter.seek(b"a").unwrap());
        assert_eq!(iter.value(), Some(&b"A"[..]));
    }

    #[test]
    fn test_scan_sees_uncommitted_batch_writes() {
        let (_env, mut engine) = populated(&["a"]);
        engine.begin_batch().unwrap();
        engine.put(b"b", b"B").unwrap();
        engine.delete(b"a").unwrap();

        let mut iter = engine.range_scan(b"").unwrap();
        assert_eq!(iter.current(), Some((&b"b"[..], &b"B"[..])));
        assert!(!iter.next().unwrap());
        drop(iter);

        engine.discard_batch().unwrap();
        assert_eq!(engine.get(b"a").unwrap(), Some(b"A".to_vec()));
        assert_eq!(engine.get(b"b").unwrap(), None);
    }

    #[test]
    fn test_entries_of_mixed_length_read_back_exactly() {
        let (_env, mut engine) = populated(&[]);
        engine.put(b"a-long-first-key", b"a fairly long first value").unwrap();
        engine.put(b"b", b"").unwrap();
        engine.put(b"c-mid", b"mid").unwrap();

        let mut iter = engine.range_scan(b"").unwrap();
        let mut forward = Vec::new();
        while let Some((k, v)) = iter.current() {
            forward.push((k.to_vec(), v.to_vec()));
            iter.next().unwrap();
        }
        assert_eq!(
            forward,
            vec![
                (b"a-long-first-key".to_vec(), b"a fairly long first value".to_vec()),
                (b"b".to_vec(), Vec::new()),
                (b"c-mid".to_vec(), b"mid".to_vec()),
            ]
        );

        assert!(iter.seek_last().unwrap());
        assert!(iter.prev().unwrap());
        assert_eq!(iter.current(), Some((&b"b"[..], &b""[..])));
        assert!(iter.prev().unwrap());
        assert_eq!(iter.key(), Some(&b"a-long-first-key"[..]));
        assert!(iter.next().unwrap());
        assert_eq!(iter.value(), Some(&b""[..]));
    }

    #[test]
    fn test_start_past_end_is_invalid() {
        let (_env, mut engine) = populated(&["a", "b"]);
        let mut iter = engine.range_scan(b"z").unwrap();
        assert!(!iter.valid());
        assert!(iter.seek_last().unwrap());
        assert_eq!(iter.key(), Some(&b"b"[..]));
        assert!(iter.prev().unwrap());
        assert_eq!(iter.key(), Some(&b"a"[..]));
        assert!(!iter.prev().unwrap());
    }
}
