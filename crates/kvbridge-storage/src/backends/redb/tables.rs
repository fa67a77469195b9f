//! Redb table definitions and the comparator-ordered key type.
//!
//! Every namespace is one redb table named after the namespace. Keys are raw
//! byte strings stored under [`OrderedKey`], a redb key type whose ordering
//! is delegated to the namespace's [`KeyComparator`]. Redb records the key
//! type name with the table, so a namespace reopened under a different
//! comparator is refused rather than read back misordered.

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;

use redb::{Key, TableDefinition, TypeName, Value};

use crate::engine::KeyComparator;

/// A raw byte key ordered by the comparator `C`.
pub struct OrderedKey<C>(PhantomData<C>);

impl<C> fmt::Debug for OrderedKey<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OrderedKey")
    }
}

impl<C: KeyComparator> Value for OrderedKey<C> {
    type SelfType<'a>
        = &'a [u8]
    where
        Self: 'a;

    type AsBytes<'a>
        = &'a [u8]
    where
        Self: 'a;

    fn fixed_width() -> Option<usize> {
        None
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        data
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'b,
    {
        value
    }

    fn type_name() -> TypeName {
        TypeName::new(C::NAME)
    }
}

impl<C: KeyComparator> Key for OrderedKey<C> {
    fn compare(data1: &[u8], data2: &[u8]) -> Ordering {
        C::compare(data1, data2)
    }
}

/// Table layout of a namespace ordered by `C`.
pub type NamespaceTable<'a, C> = TableDefinition<'a, OrderedKey<C>, &'static [u8]>;

/// The table definition for namespace `name`.
#[must_use]
pub const fn namespace_table<C: KeyComparator>(name: &str) -> NamespaceTable<'_, C> {
    TableDefinition::new(name)
}
