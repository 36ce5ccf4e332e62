#![doc = include_str!("../README.md")]

pub mod arpa;
pub mod cli;
pub mod error;
pub mod format;
pub mod hash;
pub mod model;
pub mod packed;
pub mod scoring;
pub mod sorter;
pub mod state;
pub mod table;
pub mod vocab;

pub use error::Error;
pub use model::{Config, Model};
pub use scoring::Scored;
pub use state::State;
pub use vocab::{Vocabulary, WordIndex};
