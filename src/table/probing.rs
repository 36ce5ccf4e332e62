//! C4 — open-addressed probing hash table.
//!
//! Grounded on `divvun-bidiff/crates/bidiff/src/hashindex.rs`'s
//! `HashIndex`: linear probing over a flat slot array, sized as a multiple
//! of the expected entry count to keep probe chains short. Unlike that
//! hash index (which indexes fixed-size text blocks), this table stores
//! its own `(key, value)` pairs directly in the slot array, per §4.4.
//!
//! Key `0` is reserved to mean "empty slot". Since a hash can legitimately
//! collide with 0, every stored key is the caller's key shifted by one
//! (`key.wrapping_add(1)`) so a slot's raw key field is only ever zero
//! when it is actually unoccupied.

use crate::hash::Key64;
use crate::packed::Entry;
use crate::table::{probing_capacity, CapacityError, Table};

/// Default load factor, matching `lm::ngram::Config::probing_multiplier`
/// in the original source (§3.1 / `ngram_config.hh`).
pub const DEFAULT_PROBING_MULTIPLIER: f32 = 1.5;

fn shift(key: Key64) -> Key64 {
    key.wrapping_add(1)
}

fn unshift(raw: Key64) -> Key64 {
    raw.wrapping_sub(1)
}

/// Owning, mutable probing table used while a model is being built from an
/// ARPA file. Insertion is assumed unique by the caller (the loader
/// de-duplicates by key before inserting); a duplicate key silently
/// overwrites rather than probing further, since the loader's own hash
/// collision handling (§9) decides what "duplicate" should mean upstream.
pub struct ProbingTableBuilder<V> {
    entries: Vec<Entry<V>>,
    capacity: usize,
    used: usize,
}

impl<V: Copy + Default> ProbingTableBuilder<V> {
    pub fn with_expected_len(n: usize, multiplier: f32) -> Result<Self, CapacityError> {
        let capacity = probing_capacity(n, multiplier)?;
        Ok(Self {
            entries: vec![Entry::new(0, V::default()); capacity],
            capacity,
            used: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.used
    }

    /// Probe for `key`'s slot. Returns `Ok(index)` of the slot that either
    /// already holds this key or is the first empty slot following the
    /// probe sequence.
    fn probe(&self, key: Key64) -> Result<usize, CapacityError> {
        let raw = shift(key);
        let start = (key % self.capacity as u64) as usize;
        for offset in 0..self.capacity {
            let idx = (start + offset) % self.capacity;
            let slot_key = self.entries[idx].key;
            if slot_key == 0 || slot_key == raw {
                return Ok(idx);
            }
        }
        Err(CapacityError::ProbingTableFull {
            used: self.used,
            capacity: self.capacity,
        })
    }

    /// Insert `key -> value`. Returns whether this key was already present
    /// (in which case its value was overwritten, not added alongside).
    pub fn insert(&mut self, key: Key64, value: V) -> Result<bool, CapacityError> {
        let idx = self.probe(key)?;
        let existed = self.entries[idx].key != 0;
        if !existed {
            self.used += 1;
        }
        self.entries[idx] = Entry::new(shift(key), value);
        Ok(existed)
    }

    pub fn find(&self, key: Key64) -> Option<V> {
        let raw = shift(key);
        let start = (key % self.capacity as u64) as usize;
        for offset in 0..self.capacity {
            let idx = (start + offset) % self.capacity;
            let slot = &self.entries[idx];
            if slot.key == 0 {
                return None;
            }
            if slot.key == raw {
                return Some(slot.value);
            }
        }
        None
    }

    pub fn entries(&self) -> &[Entry<V>] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Entry<V>> {
        self.entries
    }
}

/// Read-only, possibly mmap-backed view over a finished probing table.
/// Borrows its backing bytes for its whole lifetime rather than owning
/// them, per the "single owner of the mmap" design note (§9).
pub struct ProbingTable<'a, V> {
    entries: &'a [Entry<V>],
}

impl<'a, V: Copy> ProbingTable<'a, V> {
    pub fn from_entries(entries: &'a [Entry<V>]) -> Self {
        Self { entries }
    }

    fn capacity(&self) -> usize {
        self.entries.len().max(1)
    }
}

impl<'a, V: Copy> Table<V> for ProbingTable<'a, V> {
    fn find(&self, key: Key64) -> Option<V> {
        if self.entries.is_empty() {
            return None;
        }
        let raw = shift(key);
        let capacity = self.capacity();
        let start = (key % capacity as u64) as usize;
        for offset in 0..capacity {
            let idx = (start + offset) % capacity;
            let slot = &self.entries[idx];
            if slot.key == 0 {
                return None;
            }
            if slot.key == raw {
                return Some(slot.value);
            }
        }
        None
    }

    fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.key != 0).count()
    }
}
