//! C3 — packed `(Key64, value)` record layouts shared by the probing (C4)
//! and sorted-uniform (C5) table backends, and by the on-disk format (C6).
//!
//! Every struct here is `#[repr(C, packed)]` with no padding, following
//! `src/headers/fixed_width_params.rs` and `src/headers/sanity.rs` in the
//! teacher crate: a byte-packed, compiler-independent layout is what makes
//! the binary model file portable and mmap-able without a decode step.

use zerocopy::{AsBytes, FromBytes};

use crate::hash::Key64;

/// Per-entry payload for every order except the longest: a log-probability
/// and the back-off weight to apply when a longer context doesn't match.
/// Both are natural-log (base e) values once loaded; ARPA stores log10 and
/// is converted on read (see `arpa::LN_10`).
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, FromBytes, AsBytes)]
pub struct ProbBackoff {
    pub prob: f32,
    pub backoff: f32,
}

impl ProbBackoff {
    pub const ZERO: ProbBackoff = ProbBackoff {
        prob: 0.0,
        backoff: 0.0,
    };
}

impl Default for ProbBackoff {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Per-entry payload for the longest order: no back-off slot. A back-off
/// value showing up for the highest order n-gram in an ARPA file is a hard
/// format error (§4.7 step 4), not merely ignored.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, FromBytes, AsBytes)]
pub struct Prob {
    pub prob: f32,
}

impl Default for Prob {
    fn default() -> Self {
        Prob { prob: 0.0 }
    }
}

/// A packed `(key, value)` table record. Equality and ordering are defined
/// by `key` alone — two records with the same key but different payloads
/// are still "equal" as far as the table backends (which only ever
/// maintain one entry per key) are concerned.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, FromBytes, AsBytes)]
pub struct Entry<V> {
    pub key: Key64,
    pub value: V,
}

impl<V: Copy> Entry<V> {
    pub fn new(key: Key64, value: V) -> Self {
        Self { key, value }
    }
}

impl<V> PartialEq for Entry<V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl<V> Eq for Entry<V> {}

impl<V> PartialOrd for Entry<V> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<V> Ord for Entry<V> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

pub const PROB_BACKOFF_ENTRY_SIZE: usize = std::mem::size_of::<Entry<ProbBackoff>>();
pub const PROB_ENTRY_SIZE: usize = std::mem::size_of::<Entry<Prob>>();
