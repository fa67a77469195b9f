//! Classification of redb errors.
//!
//! Every redb error type converts into [`StorageError`] through
//! [`redb::Error`], so backend code can use `?` directly on store calls.

use thiserror::Error;

use crate::engine::StorageError;

/// A write transaction grew the data file past the configured map size.
#[derive(Debug, Error)]
#[error("map size of {limit} bytes exceeded (requested {requested} bytes)")]
pub(crate) struct MapSizeExceeded {
    pub(crate) requested: u64,
    pub(crate) limit: u64,
}

impl From<redb::Error> for StorageError {
    fn from(err: redb::Error) -> Self {
        match err {
            redb::Error::Io(e) => Self::Io(e.to_string()),
            redb::Error::Corrupted(msg) => Self::Io(format!("corrupted: {msg}")),
            // The store itself is unhealthy, whatever the caller was doing.
            e @ (redb::Error::PreviousIo
            | redb::Error::LockPoisoned(_)
            | redb::Error::RepairAborted) => Self::Io(e.to_string()),
            redb::Error::ValueTooLarge(len) => {
                Self::CapacityExceeded(format!("value of {len} bytes is too large"))
            }
            redb::Error::TableTypeMismatch { table, .. } => {
                Self::ComparatorMismatch { namespace: table }
            }
            redb::Error::DatabaseAlreadyOpen => {
                Self::Open("data file is already open in this process".to_string())
            }
            other => Self::InvalidState(other.to_string()),
        }
    }
}

macro_rules! via_redb_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StorageError {
                fn from(err: $ty) -> Self {
                    redb::Error::from(err).into()
                }
            }
        )*
    };
}

via_redb_error!(
    redb::StorageError,
    redb::TableError,
    redb::TransactionError,
    redb::CommitError,
    redb::DatabaseError,
);
