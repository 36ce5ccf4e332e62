//! C4/C5 — the two table backends that back every n-gram order above the
//! unigram array, plus the vocabulary's string-hash tables.
//!
//! Both backends implement the same [`Table`] contract so the scoring
//! engine (C9) can be generic over which one a given model was built
//! with — the re-architected equivalent of the teacher's templated
//! "MiddleModel" (§9 Design Notes).

pub mod probing;
pub mod sorted;

use crate::hash::Key64;

/// Shared lookup contract for C4 (probing) and C5 (sorted-uniform) table
/// views. Models are read-only after construction, so `find` takes `&self`
/// and returns owned (`Copy`) values rather than references into the
/// backing storage — the facade (C10) is the only thing that holds onto
/// the mmap.
pub trait Table<V: Copy> {
    fn find(&self, key: Key64) -> Option<V>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Error produced when a table cannot hold as many entries as the loader
/// claims it will need, given its configured sizing (§7 Capacity error).
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityError {
    #[error("probing table is full: {used} of {capacity} slots used, cannot insert more")]
    ProbingTableFull { used: usize, capacity: usize },
    #[error("probing multiplier must be > 1.0, got {0}")]
    InvalidProbingMultiplier(f32),
}

pub(crate) fn probing_capacity(n: usize, multiplier: f32) -> Result<usize, CapacityError> {
    if !(multiplier > 1.0) {
        return Err(CapacityError::InvalidProbingMultiplier(multiplier));
    }
    // At least 1 so a zero-entry table still has somewhere for `find` to
    // report "not found" without dividing by zero.
    Ok(((n as f64) * multiplier as f64).ceil() as usize).map(|c| c.max(1))
}

/// Dispatches between the two backends at the call site, replacing the
/// teacher's templated "MiddleModel" compile-time dispatch (§9 Design
/// Notes) with an enum the scoring engine can be generic over without a
/// trait object.
pub enum AnyTable<'a, V> {
    Probing(probing::ProbingTable<'a, V>),
    Sorted(sorted::SortedTable<'a, V>),
}

impl<'a, V: Copy> Table<V> for AnyTable<'a, V> {
    fn find(&self, key: Key64) -> Option<V> {
        match self {
            AnyTable::Probing(t) => t.find(key),
            AnyTable::Sorted(t) => t.find(key),
        }
    }

    fn len(&self) -> usize {
        match self {
            AnyTable::Probing(t) => t.len(),
            AnyTable::Sorted(t) => t.len(),
        }
    }
}
