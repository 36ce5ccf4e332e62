//! C10 — the `Model` facade: owns the backing bytes (mmap'd or built
//! in-memory), the header, the section layout, and the vocabulary, and is
//! the only thing in the crate that constructs [`AnyTable`] views.
//!
//! Grounded on the teacher's `model/mod.rs` (`Model` owning the backing
//! handle plus a cached header, `new_state`/`fill_state_with_bos_context`/
//! `fill_state_with_null_context`, `score_word_given_state`/
//! `score_index_given_state` naming) and `model/builder.rs`
//! (`ModelBuilder`'s "open, verify, construct" shape) — generalized from
//! "delegate everything past the header to the bridged C++ model" to "own
//! the n-gram tables natively and build `AnyTable` views per call".

mod builder;

use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use zerocopy::FromBytes;

use crate::error::Error;
use crate::format::{Backend, Header, Layout};
use crate::packed::{Entry, Prob, ProbBackoff};
use crate::scoring::{self, Scored};
use crate::state::State;
use crate::table::probing::DEFAULT_PROBING_MULTIPLIER;
use crate::table::AnyTable;
use crate::vocab::{UnknownMissing, Vocabulary, WordIndex};

/// Construction/runtime knobs, mirroring §4.10's table. Defaults pinned
/// from `lm/ngram_config.hh` in the original source (SPEC_FULL §3.1).
#[derive(Clone, Debug)]
pub struct Config {
    pub unknown_missing: UnknownMissing,
    pub unknown_missing_prob: f32,
    pub probing_multiplier: f32,
    /// Not part of the original `lm::ngram::Config` table: which table
    /// backend to build when constructing from an ARPA file. Required here
    /// because this crate (unlike the teacher) implements both backends
    /// itself rather than delegating backend choice to a pre-built binary.
    pub backend: Backend,
    pub write_mmap: Option<PathBuf>,
    pub prefault: bool,
    /// In-memory run size for the external sorter (C8) when building the
    /// sorted-uniform backend. No effect for `Backend::Probing`. Exposed by
    /// the CLI as `--memory` (§4.11).
    pub sort_memory_budget: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unknown_missing: UnknownMissing::Complain,
            unknown_missing_prob: 0.0,
            probing_multiplier: DEFAULT_PROBING_MULTIPLIER,
            backend: Backend::Probing,
            write_mmap: None,
            prefault: false,
            sort_memory_budget: 64 * 1024 * 1024,
        }
    }
}

enum Backing {
    Mmap(Mmap),
    Owned(Vec<u8>),
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Mmap(m) => &m[..],
            Backing::Owned(v) => &v[..],
        }
    }
}

/// Owns the backing file/mmap or in-memory byte buffer, a vocabulary, and
/// enough of the header/layout to slice out `AnyTable` views on demand.
/// Tables are never materialized as owned structures: every call to
/// [`Model::full_score`] builds lightweight borrowed views directly over
/// `backing`'s bytes, so opening a model touches only the vocabulary block
/// (§9 Design Notes — "no decoding step occurs at load" for the bulk
/// n-gram data; the vocab block alone is copied out, see DESIGN.md).
pub struct Model {
    backing: Backing,
    header: Header,
    layout: Layout,
    vocab: Vocabulary,
}

impl Model {
    /// Build a model from an ARPA file. If `config.write_mmap` is set, the
    /// resulting binary image is also persisted to that path (§4.10); the
    /// in-memory `Model` itself always owns its bytes directly either way.
    pub fn from_arpa(path: &Path, config: Config) -> Result<Self, Error> {
        let (header, bytes, vocab) = builder::build_from_arpa(path, &config)?;
        let (_, header_end) = Header::parse(&bytes)?;
        let layout = Layout::compute(&header, header_end)?;

        if let Some(out_path) = &config.write_mmap {
            std::fs::write(out_path, &bytes)?;
        }

        Ok(Model {
            backing: Backing::Owned(bytes),
            header,
            layout,
            vocab,
        })
    }

    /// Open a previously-built binary model, mmap'd read-only.
    pub fn from_binary(path: &Path, prefault: bool) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;
        let mut options = MmapOptions::new();
        if prefault {
            options.populate();
        }
        let mmap = unsafe { options.map(&file)? };

        let (header, header_end) = Header::parse(&mmap)?;
        let layout = Layout::compute(&header, header_end)?;
        let vocab = Vocabulary::read_from(
            header.backend,
            &mmap[layout.vocab.clone()],
            header.counts[0] as usize,
            header.unk_defined,
        );

        Ok(Model {
            backing: Backing::Mmap(mmap),
            header,
            layout,
            vocab,
        })
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn order(&self) -> u8 {
        self.header.order
    }

    /// The state at the start of a sentence, context `<s>` (§4.9). Seeded
    /// with `<s>`'s own real unigram back-off (`builder::build_from_arpa`
    /// only forces its `.prob` to `-inf`, never touches `.backoff`), so the
    /// first lookup that misses against this context accumulates the right
    /// value instead of silently treating `<s>`'s back-off as `0.0`.
    pub fn begin_sentence_state(&self) -> State {
        let bos = self.vocab.index("<s>");
        let backoff = self.unigrams().get(bos.as_u32() as usize).map(|u| u.backoff).unwrap_or(0.0);
        State::begin_sentence(bos, backoff)
    }

    /// The "no context" state, for scoring without a synthetic `<s>`.
    pub fn null_context_state(&self) -> State {
        State::null_context()
    }

    fn unigrams(&self) -> &[ProbBackoff] {
        ProbBackoff::slice_from(&self.backing.bytes()[self.layout.unigram.clone()])
            .expect("unigram section length is always a multiple of size_of::<ProbBackoff>()")
    }

    fn middle_tables(&self) -> Vec<AnyTable<'_, ProbBackoff>> {
        self.layout
            .middle
            .iter()
            .map(|range| view_table::<ProbBackoff>(self.header.backend, &self.backing.bytes()[range.clone()]))
            .collect()
    }

    fn longest_table(&self) -> AnyTable<'_, Prob> {
        view_table::<Prob>(self.header.backend, &self.backing.bytes()[self.layout.longest.clone()])
    }

    /// The primary scoring entry point, matching SPEC_FULL §6.1's public
    /// signature. `word` is assumed already resolved via [`Vocabulary::index`]:
    /// passing [`WordIndex::UNK`] here is treated as a regular `<unk>` hit
    /// (`matched_order = 1` if the model's unigram table has one), since a
    /// bare `WordIndex` carries no way to tell "the literal `<unk>` token"
    /// apart from "a word not in the vocabulary" (§9.1 Open Questions). Use
    /// [`Model::score_word`] instead when that distinction matters.
    pub fn full_score(&self, state: &State, word: WordIndex) -> (f32, u8, State) {
        let scored = self.full_score_with_oov(state, word, false);
        (scored.log_prob, scored.matched_order, scored.next_state)
    }

    /// Resolve `word` through the vocabulary first, so a genuinely
    /// out-of-vocabulary word (as opposed to a literal `<unk>` query that
    /// actually hits the model's own `<unk>` row) is scored with
    /// `matched_order = 0` per §4.9's own definition and the convention
    /// recorded in SPEC_FULL.md §9.1: a resolved `<unk>` only counts as a
    /// real hit if the source ARPA actually defined one.
    pub fn score_word(&self, state: &State, word: &str) -> Scored {
        let resolved = self.vocab.index(word);
        let is_oov = resolved == WordIndex::UNK && !(word == "<unk>" && self.vocab.unk_was_defined());
        self.full_score_with_oov(state, resolved, is_oov)
    }

    fn full_score_with_oov(&self, state: &State, word: WordIndex, word_is_oov: bool) -> Scored {
        let unigrams = self.unigrams();
        let middle = self.middle_tables();
        let longest = self.longest_table();
        scoring::full_score(
            self.header.order as usize,
            unigrams,
            &middle,
            &longest,
            state,
            word,
            word_is_oov,
        )
    }
}

fn view_table<V: Copy + zerocopy::FromBytes>(backend: Backend, bytes: &[u8]) -> AnyTable<'_, V> {
    let entries: &[Entry<V>] =
        Entry::<V>::slice_from(bytes).expect("table section length is always a multiple of size_of::<Entry<V>>()");
    match backend {
        Backend::Probing => AnyTable::Probing(crate::table::probing::ProbingTable::from_entries(entries)),
        Backend::Sorted => AnyTable::Sorted(crate::table::sorted::SortedTable::from_entries(entries)),
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    const TOY_ARPA: &str = "\\data\\
ngram 1=5
ngram 2=4
ngram 3=3

\\1-grams:
-1.0\t<unk>
-0.5\t<s>\t-0.3
-0.6\t</s>
-0.2\ta\t-0.1
-0.4\tb\t-0.2

\\2-grams:
-0.05\t<s> a\t-0.02
-0.07\ta b\t-0.01
-0.08\tb </s>
-0.09\ta a

\\3-grams:
-0.01\t<s> a b
-0.02\ta b </s>
-0.03\tb a a

\\end\\
";

    fn write_toy_arpa() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(TOY_ARPA.as_bytes()).unwrap();
        f
    }

    fn scores_for(model: &Model, sentence: &[&str]) -> Vec<(f32, u8)> {
        let mut state = model.begin_sentence_state();
        let mut out = Vec::with_capacity(sentence.len());
        for &word in sentence {
            let scored = model.score_word(&state, word);
            out.push((scored.log_prob, scored.matched_order));
            state = scored.next_state;
        }
        out
    }

    /// Every score a binary-reloaded model produces must match the model
    /// freshly built from the same ARPA file, for both table backends
    /// (§8's round-trip property, a small (~15-ngram) instance of it).
    #[test]
    fn roundtrip_through_binary_file_preserves_scores() {
        for backend in [Backend::Probing, Backend::Sorted] {
            let arpa_file = write_toy_arpa();
            let binary_file = tempfile::NamedTempFile::new().unwrap();
            let config = Config {
                backend,
                write_mmap: Some(binary_file.path().to_path_buf()),
                ..Config::default()
            };

            let built = Model::from_arpa(arpa_file.path(), config).unwrap();
            let reloaded = Model::from_binary(binary_file.path(), false).unwrap();

            let sentence = ["a", "b", "</s>"];
            assert_eq!(scores_for(&built, &sentence), scores_for(&reloaded, &sentence));
            assert_eq!(built.order(), reloaded.order());
            assert_eq!(built.vocab().len(), reloaded.vocab().len());
        }
    }

    /// Large-scale counterpart of the above (the 1M-entry / 10k-random-query
    /// property in §8), cordoned off behind `#[ignore]` since it is too slow
    /// for the default test run. TODO: generate a synthetic million-entry
    /// ARPA fixture once a corpus generator lands; until then this documents
    /// the property rather than exercising it at scale.
    #[test]
    #[ignore]
    fn roundtrip_stress() {
        for backend in [Backend::Probing, Backend::Sorted] {
            let arpa_file = write_toy_arpa();
            let binary_file = tempfile::NamedTempFile::new().unwrap();
            let config = Config {
                backend,
                write_mmap: Some(binary_file.path().to_path_buf()),
                ..Config::default()
            };
            let built = Model::from_arpa(arpa_file.path(), config).unwrap();
            let reloaded = Model::from_binary(binary_file.path(), false).unwrap();
            let sentence = ["a", "b", "</s>"];
            assert_eq!(scores_for(&built, &sentence), scores_for(&reloaded, &sentence));
        }
    }
}
