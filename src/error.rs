//! Crate-wide error type (§7): one `enum Error` aggregating every
//! subsystem's own error enum.
//!
//! Grounded on the teacher's `src/lib.rs::Error` — a single `thiserror`
//! enum with `#[from]` variants per failure domain, rather than a
//! `Box<dyn Error>` or per-function bespoke error type.

use crate::arpa::ArpaError;
use crate::format::FormatError;
use crate::table::CapacityError;
use crate::vocab::VocabError;

/// Bad `Config` values caught before any file I/O happens (§7: "probing
/// multiplier ≤ 1, contradictory options"), as opposed to [`CapacityError`]
/// which is raised later, while actually sizing a table against real data.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    #[error("probing multiplier must be > 1.0, got {0}")]
    InvalidProbingMultiplier(f32),
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Arpa(#[from] ArpaError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Vocab(#[from] VocabError),
    #[error(transparent)]
    Capacity(#[from] CapacityError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
