//! `ModelBuilder`-equivalent construction path: turn an ARPA file into the
//! complete in-memory byte image of a binary model (§4.7/§4.8), in the
//! shape `format::Layout` expects.
//!
//! Grounded on the teacher's `model/builder.rs` (`ModelBuilder::build`: open
//! file, verify headers, hand off to the loaded model) for the overall
//! "builder owns the file, verifies, then constructs" shape, generalized
//! from "verify a C++-written file and wrap it" to "actually write the
//! file" since this crate has no upstream kenlm binary to delegate to.

use std::io::{BufReader, Write};
use std::path::Path;

use crate::arpa::{self, NGramRecord};
use crate::error::{ConfigError, Error};
use crate::format::{Backend, Header};
use crate::hash::chain_hash_one_shot;
use crate::packed::{Entry, Prob, ProbBackoff};
use crate::sorter;
use crate::table::probing::ProbingTableBuilder;
use crate::table::sorted::SortedTableBuilder;
use crate::vocab::Vocabulary;

use super::Config;

/// Build the full byte image of a binary model from an ARPA file: header,
/// vocab block, unigram array, middle tables, longest table, laid out
/// exactly as `format::Layout` computes it (so re-parsing the bytes we just
/// wrote yields the same ranges).
pub(crate) fn build_from_arpa(path: &Path, config: &Config) -> Result<(Header, Vec<u8>, Vocabulary), Error> {
    if config.backend == Backend::Probing && !(config.probing_multiplier > 1.0) {
        return Err(ConfigError::InvalidProbingMultiplier(config.probing_multiplier).into());
    }

    let file = std::fs::File::open(path)?;
    let parsed = arpa::read_arpa(BufReader::new(file))?;

    let order = parsed.order;
    // `<s>`'s provisional index, needed to force its unigram log-prob to
    // -inf (§4.2) after the permutation below has been applied. Peeked
    // before `finish_*` consumes `parsed.vocab`.
    let bos_provisional = parsed
        .vocab
        .peek_index("<s>")
        .expect("finish_* would have rejected a missing <s> before this point");

    let (vocab, permutation) = match config.backend {
        Backend::Probing => parsed
            .vocab
            .finish_probing(config.probing_multiplier, config.unknown_missing)?,
        Backend::Sorted => parsed.vocab.finish_sorted(config.unknown_missing)?,
    };

    // `vocab.len()` may be one larger than `parsed.unigrams.len()`:
    // `finish_probing`/`finish_sorted` always reserve final index 0 for
    // `<unk>`, synthesizing it when the ARPA never defined one.
    let word_count = vocab.len();
    let mut unigrams = vec![ProbBackoff::ZERO; word_count];
    for (provisional, &(prob, backoff)) in parsed.unigrams.iter().enumerate() {
        let final_idx = permutation[provisional] as usize;
        unigrams[final_idx] = ProbBackoff { prob, backoff };
    }
    if !vocab.unk_was_defined() {
        // Index 0 is reserved but has no row from the ARPA; give it the
        // configured fallback probability (§4.10 `unknown_missing_prob`)
        // instead of leaving `ProbBackoff::ZERO` there.
        unigrams[0] = ProbBackoff {
            prob: config.unknown_missing_prob,
            backoff: 0.0,
        };
    }
    unigrams[permutation[bos_provisional] as usize].prob = f32::NEG_INFINITY;

    let mut middle_sections = Vec::with_capacity(parsed.middle.len());
    for records in &parsed.middle {
        middle_sections.push(build_table_bytes::<ProbBackoff>(
            config,
            records,
            &permutation,
            |r| ProbBackoff { prob: r.prob, backoff: r.backoff },
        )?);
    }
    let longest_bytes = build_table_bytes::<Prob>(config, &parsed.longest, &permutation, |r| Prob { prob: r.prob })?;

    let mut counts = parsed.counts.clone();
    counts[0] = word_count;
    let header = Header {
        backend: config.backend,
        order: order as u8,
        unk_defined: vocab.unk_was_defined(),
        probing_multiplier: config.probing_multiplier,
        counts: counts.iter().map(|&c| c as u64).collect(),
    };

    let mut bytes = Vec::new();
    header.write_to(&mut bytes)?;
    vocab.write_to(&mut bytes)?;
    for u in &unigrams {
        bytes.write_all(u.as_bytes())?;
    }
    for section in &middle_sections {
        bytes.write_all(section)?;
    }
    bytes.write_all(&longest_bytes)?;

    Ok((header, bytes, vocab))
}

/// Remap `records` through `permutation`, hash each into a `(Key64, V)`
/// entry, and lay them out for `config.backend`: a full (capacity-sized)
/// probing table, or a key-ascending sorted array via the external sorter
/// (C8).
fn build_table_bytes<V>(
    config: &Config,
    records: &[NGramRecord],
    permutation: &[u32],
    to_value: impl Fn(&NGramRecord) -> V,
) -> Result<Vec<u8>, Error>
where
    V: Copy + Default + zerocopy::AsBytes + zerocopy::FromBytes,
{
    let entries: Vec<Entry<V>> = records
        .iter()
        .map(|r| {
            let remapped: Vec<u32> = r.words.iter().map(|&w| permutation[w as usize]).collect();
            let key = chain_hash_one_shot(&remapped);
            Entry::new(key, to_value(r))
        })
        .collect();

    match config.backend {
        Backend::Probing => {
            let mut builder: ProbingTableBuilder<V> =
                ProbingTableBuilder::with_expected_len(entries.len(), config.probing_multiplier)?;
            for entry in entries {
                let key = entry.key;
                if builder.insert(key, entry.value)? {
                    tracing::warn!(key, "n-gram chain-hash collision: overwriting the previous entry (§9)");
                }
            }
            let mut out = Vec::with_capacity(builder.entries().len() * std::mem::size_of::<Entry<V>>());
            for e in builder.entries() {
                out.extend_from_slice(e.as_bytes());
            }
            Ok(out)
        }
        Backend::Sorted => {
            let sorted = sorter::sort_entries(entries, config.sort_memory_budget)?;
            for pair in sorted.windows(2) {
                let (a, b) = (pair[0].key, pair[1].key);
                if a == b {
                    tracing::warn!(key = a, "n-gram chain-hash collision: duplicate key in sorted table (§9)");
                }
            }
            let built = SortedTableBuilder::from_sorted(sorted).into_entries();
            let mut out = Vec::with_capacity(built.len() * std::mem::size_of::<Entry<V>>());
            for e in &built {
                out.extend_from_slice(e.as_bytes());
            }
            Ok(out)
        }
    }
}
