//! C2 — vocabulary: the bijection between byte strings and compact
//! [`WordIndex`] values, plus the distinguished `<s>`, `</s>`, `<unk>`
//! markers.
//!
//! Grounded on the teacher's `src/vocab.rs` (`BidiMapping`) and
//! `src/mapping/mod.rs` (`BidirectionalMapping` trait, enum dispatch over
//! backends) for the overall "insert-or-get plus reverse lookup" shape,
//! generalized to the two backends §4.2 actually specifies: a probing
//! table of string hashes (C4) and a sorted array of string hashes (C5).

use std::collections::HashMap;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use itertools::Itertools;
use zerocopy::{AsBytes, FromBytes};

use crate::format::Backend;
use crate::hash::string_hash64;
use crate::packed::Entry;
use crate::table::probing::{ProbingTable, ProbingTableBuilder};
use crate::table::sorted::{sorted_uniform_find, SortedTable};
use crate::table::{CapacityError, Table};

/// Compact integer identifier of a vocabulary entry. `<unk>` always
/// occupies index 0, by convention (§3 Data Model).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WordIndex(pub u32);

impl WordIndex {
    pub const UNK: WordIndex = WordIndex(0);

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VocabError {
    #[error("ARPA file never defines `<s>` (sentence-begin marker)")]
    MissingBeginSentence,
    #[error("ARPA file never defines `</s>` (sentence-end marker)")]
    MissingEndSentence,
    #[error("ARPA file has no `<unk>` entry and the unknown_missing policy is Throw")]
    MissingUnknown,
    #[error(transparent)]
    Capacity(#[from] CapacityError),
}

/// Policy for what to do when an ARPA file never defines `<unk>`,
/// mirroring `lm::ngram::Config::UnknownMissing` in the original source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnknownMissing {
    Throw,
    Complain,
    Silent,
}

impl Default for UnknownMissing {
    fn default() -> Self {
        UnknownMissing::Complain
    }
}

/// Accumulates strings seen while reading an ARPA file (or while
/// re-inserting a permutation's domain), assigning provisional word
/// indices in first-seen order and detecting string-hash collisions.
///
/// `<s>`, `</s>` and `<unk>` are ordinary tokens as far as the ARPA grammar
/// is concerned (§6); this builder just remembers which provisional index
/// each resolved to so `finish_loading` can check the invariants in §3.
pub struct VocabularyBuilder {
    strings: Vec<Box<str>>,
    by_hash: HashMap<u64, u32>,
    unk: Option<u32>,
    bos: Option<u32>,
    eos: Option<u32>,
}

impl Default for VocabularyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VocabularyBuilder {
    pub fn new() -> Self {
        Self {
            strings: Vec::new(),
            by_hash: HashMap::new(),
            unk: None,
            bos: None,
            eos: None,
        }
    }

    /// Insert-or-get, the way `BidiMapping::insert_or_get` works in the
    /// teacher crate, except keyed by string hash (as the probing
    /// vocabulary itself will be) rather than by the owned `String` —
    /// which is what lets us detect the hash collisions §9 calls for.
    pub fn insert(&mut self, word: &str) -> u32 {
        let hash = string_hash64(word.as_bytes());
        if let Some(&idx) = self.by_hash.get(&hash) {
            if self.strings[idx as usize].as_ref() != word {
                tracing::warn!(
                    existing = %self.strings[idx as usize],
                    incoming = %word,
                    hash,
                    "vocabulary hash collision: keeping the first entry"
                );
            }
            self.remember_special(word, idx);
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(word.into());
        self.by_hash.insert(hash, idx);
        self.remember_special(word, idx);
        idx
    }

    fn remember_special(&mut self, word: &str, idx: u32) {
        match word {
            "<unk>" => self.unk = Some(idx),
            "<s>" => self.bos = Some(idx),
            "</s>" => self.eos = Some(idx),
            _ => {}
        }
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Provisional index of a word already seen via [`insert`](Self::insert),
    /// without inserting it. Used by the loader to resolve references to
    /// words that must already be present (and by tests).
    pub fn peek_index(&self, word: &str) -> Option<u32> {
        let hash = string_hash64(word.as_bytes());
        self.by_hash.get(&hash).copied()
    }

    /// Finish loading for the probing backend: builds a probing table of
    /// `string_hash -> final WordIndex`, reserving final index 0 for
    /// `<unk>` unconditionally — synthesizing an entry for it if the ARPA
    /// never defined one — so it can never alias with a real word (final
    /// indices for every other word start at 1). Mirrors
    /// [`Self::finish_sorted`], which already did this; the identity
    /// permutation this used to return let whichever word was inserted
    /// first (typically `<s>`) silently take index 0 when `<unk>` was
    /// absent, aliasing it with the "not found" sentinel
    /// ([`WordIndex::UNK`]).
    pub fn finish_probing(
        self,
        probing_multiplier: f32,
        unknown_missing: UnknownMissing,
    ) -> Result<(Vocabulary, Vec<u32>), VocabError> {
        self.check_specials(unknown_missing)?;
        let original_count = self.strings.len();
        let unk_defined = self.unk.is_some();
        let word_count = if unk_defined { original_count } else { original_count + 1 };

        let mut permutation = vec![0u32; original_count];
        let mut next_final = 1u32;
        for provisional in 0..original_count as u32 {
            if Some(provisional) == self.unk {
                permutation[provisional as usize] = 0;
            } else {
                permutation[provisional as usize] = next_final;
                next_final += 1;
            }
        }

        let mut builder: ProbingTableBuilder<u32> =
            ProbingTableBuilder::with_expected_len(word_count, probing_multiplier)?;
        for (&hash, &provisional) in self.by_hash.iter() {
            builder.insert(hash, permutation[provisional as usize])?;
        }
        if !unk_defined {
            builder.insert(string_hash64(b"<unk>"), 0)?;
        }

        let mut strings: Vec<Box<str>> = vec!["".into(); word_count];
        for (provisional, s) in self.strings.into_iter().enumerate() {
            strings[permutation[provisional] as usize] = s;
        }
        if !unk_defined {
            strings[0] = "<unk>".into();
        }

        Ok((
            Vocabulary::Probing(ProbingVocab {
                entries: builder.into_entries(),
                strings,
                word_count,
                unk_seen: unk_defined,
            }),
            permutation,
        ))
    }

    /// Finish loading for the sorted backend. `<unk>` is excluded from the
    /// sorted hash array (it's always final index 0 by definition); every
    /// other string gets final index `sorted_position + 1`. Returns the
    /// permutation mapping provisional index -> final `WordIndex`, so the
    /// caller can reorder the unigram array (§4.7 step 3) to match.
    pub fn finish_sorted(
        self,
        unknown_missing: UnknownMissing,
    ) -> Result<(Vocabulary, Vec<u32>), VocabError> {
        self.check_specials(unknown_missing)?;
        let original_count = self.strings.len();
        let unk_provisional = self.unk;
        let unk_defined = unk_provisional.is_some();
        let word_count = if unk_defined { original_count } else { original_count + 1 };

        let hashed: Vec<(u64, u32)> = self
            .by_hash
            .iter()
            .filter(|&(_, &idx)| Some(idx) != unk_provisional)
            .map(|(&h, &idx)| (h, idx))
            .sorted_by_key(|&(h, _)| h)
            .collect();

        let mut permutation = vec![0u32; original_count];
        let mut hashes = Vec::with_capacity(hashed.len());
        for (final_minus_one, (hash, provisional)) in hashed.into_iter().enumerate() {
            let final_idx = final_minus_one as u32 + 1;
            permutation[provisional as usize] = final_idx;
            hashes.push(hash);
        }
        if let Some(unk_idx) = unk_provisional {
            permutation[unk_idx as usize] = 0;
        }

        // strings, reordered to match `permutation` so index lookups by
        // final WordIndex still resolve to the right text. Index 0 stays a
        // placeholder `<unk>` entry when the ARPA never defined one.
        let mut strings: Vec<Box<str>> = vec!["".into(); word_count];
        for (provisional, s) in self.strings.into_iter().enumerate() {
            strings[permutation[provisional] as usize] = s;
        }
        if !unk_defined {
            strings[0] = "<unk>".into();
        }

        Ok((
            Vocabulary::Sorted(SortedVocab {
                hashes,
                strings,
                word_count,
                unk_seen: unk_defined,
            }),
            permutation,
        ))
    }

    fn check_specials(&self, unknown_missing: UnknownMissing) -> Result<(), VocabError> {
        if self.bos.is_none() {
            return Err(VocabError::MissingBeginSentence);
        }
        if self.eos.is_none() {
            return Err(VocabError::MissingEndSentence);
        }
        if self.unk.is_none() {
            match unknown_missing {
                UnknownMissing::Throw => return Err(VocabError::MissingUnknown),
                UnknownMissing::Complain => {
                    tracing::warn!("ARPA file has no `<unk>` entry; substituting a fallback probability");
                }
                UnknownMissing::Silent => {}
            }
        }
        Ok(())
    }
}

pub struct ProbingVocab {
    entries: Vec<Entry<u32>>,
    strings: Vec<Box<str>>,
    /// Number of distinct words, independent of `strings` — which is empty
    /// after [`Vocabulary::read_from`] reconstructs a vocabulary from a
    /// binary file's vocab block alone (it stores no surface strings).
    word_count: usize,
    unk_seen: bool,
}

pub struct SortedVocab {
    hashes: Vec<u64>,
    strings: Vec<Box<str>>,
    word_count: usize,
    unk_seen: bool,
}

/// C2's two interchangeable backends. Both resolve unknown words to
/// [`WordIndex::UNK`] rather than erroring — `Index` is infallible by
/// design (§4.2).
pub enum Vocabulary {
    Probing(ProbingVocab),
    Sorted(SortedVocab),
}

impl Vocabulary {
    pub fn index(&self, word: &str) -> WordIndex {
        let hash = string_hash64(word.as_bytes());
        match self {
            Vocabulary::Probing(v) => {
                let table = ProbingTable::from_entries(&v.entries);
                match table.find(hash) {
                    Some(idx) => WordIndex(idx),
                    None => WordIndex::UNK,
                }
            }
            Vocabulary::Sorted(v) => match sorted_uniform_find(&v.hashes, hash) {
                Some(pos) => WordIndex(pos as u32 + 1),
                None => WordIndex::UNK,
            },
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Vocabulary::Probing(v) => v.word_count,
            Vocabulary::Sorted(v) => v.word_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn word(&self, idx: WordIndex) -> Option<&str> {
        let strings = match self {
            Vocabulary::Probing(v) => &v.strings,
            Vocabulary::Sorted(v) => &v.strings,
        };
        strings.get(idx.0 as usize).map(|s| s.as_ref())
    }

    /// Whether the ARPA source actually defined an `<unk>` unigram, as
    /// opposed to one synthesized by the `unknown_missing` policy. Used by
    /// the scoring engine to decide the `<unk>` `matched_order` convention
    /// (SPEC_FULL.md §9.1).
    pub fn unk_was_defined(&self) -> bool {
        match self {
            Vocabulary::Probing(v) => v.unk_seen,
            Vocabulary::Sorted(v) => v.unk_seen,
        }
    }

    /// Serialize the vocab block exactly as §6 lays it out: the probing
    /// backend's full (capacity-sized, including empty slots) entry array,
    /// or the sorted backend's ascending hash array — in either case, no
    /// surface strings. A binary model file is a lookup structure, not a
    /// dictionary; `word()` is only meaningful for a vocabulary still
    /// holding the strings it was built from.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Vocabulary::Probing(v) => {
                for entry in &v.entries {
                    w.write_all(entry.as_bytes())?;
                }
            }
            Vocabulary::Sorted(v) => {
                for &hash in &v.hashes {
                    w.write_u64::<LittleEndian>(hash)?;
                }
            }
        }
        Ok(())
    }

    /// Reconstruct a vocabulary from a vocab block's raw bytes (sliced out
    /// of an mmap per [`crate::format::Layout::vocab`]) plus the word count
    /// from the file header's `counts[0]` and whether the source ARPA
    /// defined `<unk>` (the file header's own `unk_defined` bit — see
    /// [`crate::format::Header`] — so this answers
    /// [`Vocabulary::unk_was_defined`] consistently with the model that was
    /// originally built, per §8 round-trip property 3). No strings are
    /// recovered — only `index()` and `len()` are meaningful until/unless
    /// the caller has some other source of the surface forms.
    pub fn read_from(backend: Backend, bytes: &[u8], word_count: usize, unk_defined: bool) -> Vocabulary {
        match backend {
            Backend::Probing => {
                let entry_size = std::mem::size_of::<Entry<u32>>();
                let entries: Vec<Entry<u32>> = bytes
                    .chunks_exact(entry_size)
                    .map(|chunk| Entry::<u32>::read_from(chunk).expect("chunk is exactly one Entry<u32>"))
                    .collect();
                Vocabulary::Probing(ProbingVocab {
                    entries,
                    strings: Vec::new(),
                    word_count,
                    unk_seen: unk_defined,
                })
            }
            Backend::Sorted => {
                let mut hashes = Vec::with_capacity(bytes.len() / 8);
                let mut cursor = bytes;
                while !cursor.is_empty() {
                    hashes.push(
                        cursor
                            .read_u64::<LittleEndian>()
                            .expect("bytes.len() is a multiple of 8"),
                    );
                }
                Vocabulary::Sorted(SortedVocab {
                    hashes,
                    strings: Vec::new(),
                    word_count,
                    unk_seen: unk_defined,
                })
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn populated_builder() -> VocabularyBuilder {
        let mut b = VocabularyBuilder::new();
        for w in ["<unk>", "<s>", "</s>", "a", "b", "c"] {
            b.insert(w);
        }
        b
    }

    #[test]
    fn unk_is_always_index_zero_for_probing() {
        let (vocab, _) = populated_builder()
            .finish_probing(1.5, UnknownMissing::Complain)
            .unwrap();
        assert_eq!(vocab.index("<unk>"), WordIndex::UNK);
        assert_eq!(vocab.index("totally-unseen-word"), WordIndex::UNK);
    }

    #[test]
    fn unk_is_always_index_zero_for_sorted() {
        let (vocab, _) = populated_builder()
            .finish_sorted(UnknownMissing::Complain)
            .unwrap();
        assert_eq!(vocab.index("<unk>"), WordIndex::UNK);
        assert_eq!(vocab.index("totally-unseen-word"), WordIndex::UNK);
    }

    #[test]
    fn known_words_roundtrip_through_probing() {
        let (vocab, _) = populated_builder()
            .finish_probing(1.5, UnknownMissing::Complain)
            .unwrap();
        for w in ["a", "b", "c", "<s>", "</s>"] {
            let idx = vocab.index(w);
            assert_ne!(idx, WordIndex::UNK);
            assert_eq!(vocab.word(idx), Some(w));
        }
    }

    #[test]
    fn known_words_roundtrip_through_sorted() {
        let (vocab, _) = populated_builder()
            .finish_sorted(UnknownMissing::Complain)
            .unwrap();
        for w in ["a", "b", "c", "<s>", "</s>"] {
            let idx = vocab.index(w);
            assert_ne!(idx, WordIndex::UNK);
            assert_eq!(vocab.word(idx), Some(w));
        }
    }

    #[test]
    fn missing_begin_sentence_is_an_error() {
        let mut b = VocabularyBuilder::new();
        b.insert("<unk>");
        b.insert("</s>");
        let err = b.finish_probing(1.5, UnknownMissing::Complain).unwrap_err();
        assert_eq!(err, VocabError::MissingBeginSentence);
    }

    #[test]
    fn missing_end_sentence_is_an_error() {
        let mut b = VocabularyBuilder::new();
        b.insert("<unk>");
        b.insert("<s>");
        let err = b.finish_probing(1.5, UnknownMissing::Complain).unwrap_err();
        assert_eq!(err, VocabError::MissingEndSentence);
    }

    #[test]
    fn missing_unknown_obeys_policy() {
        let mut b = VocabularyBuilder::new();
        b.insert("<s>");
        b.insert("</s>");
        assert!(matches!(
            b.finish_probing(1.5, UnknownMissing::Throw),
            Err(VocabError::MissingUnknown)
        ));

        let mut b = VocabularyBuilder::new();
        b.insert("<s>");
        b.insert("</s>");
        assert!(b.finish_probing(1.5, UnknownMissing::Silent).is_ok());
    }

    /// When the ARPA never defines `<unk>` (legal under `Complain`/`Silent`),
    /// `finish_probing` must still reserve index 0 exclusively for it
    /// instead of letting the first real word inserted (here `<s>`) alias
    /// with [`WordIndex::UNK`].
    #[test]
    fn missing_unk_does_not_alias_a_real_word_for_probing() {
        let mut b = VocabularyBuilder::new();
        b.insert("<s>");
        b.insert("</s>");
        b.insert("a");
        let (vocab, _) = b.finish_probing(1.5, UnknownMissing::Silent).unwrap();

        assert!(!vocab.unk_was_defined());
        assert_eq!(vocab.index("totally-unseen-word"), WordIndex::UNK);
        assert_ne!(vocab.index("<s>"), WordIndex::UNK);
        assert_ne!(vocab.index("</s>"), WordIndex::UNK);
        assert_ne!(vocab.index("a"), WordIndex::UNK);
        assert_eq!(vocab.len(), 4); // 3 real words + the synthesized <unk>
    }

    #[test]
    fn probing_vocab_roundtrips_through_bytes() {
        let (vocab, _) = populated_builder()
            .finish_probing(1.5, UnknownMissing::Complain)
            .unwrap();
        let mut buf = Vec::new();
        vocab.write_to(&mut buf).unwrap();

        let reloaded = Vocabulary::read_from(crate::format::Backend::Probing, &buf, vocab.len(), true);
        assert_eq!(reloaded.len(), vocab.len());
        for w in ["a", "b", "c", "<s>", "</s>"] {
            assert_eq!(reloaded.index(w), vocab.index(w));
        }
        assert_eq!(reloaded.index("never-seen"), WordIndex::UNK);
        // strings are not part of the binary vocab block
        assert_eq!(reloaded.word(vocab.index("a")), None);
        assert!(reloaded.unk_was_defined());
    }

    #[test]
    fn sorted_vocab_roundtrips_through_bytes() {
        let (vocab, _) = populated_builder()
            .finish_sorted(UnknownMissing::Complain)
            .unwrap();
        let mut buf = Vec::new();
        vocab.write_to(&mut buf).unwrap();

        let reloaded = Vocabulary::read_from(crate::format::Backend::Sorted, &buf, vocab.len(), true);
        assert_eq!(reloaded.len(), vocab.len());
        for w in ["a", "b", "c", "<s>", "</s>"] {
            assert_eq!(reloaded.index(w), vocab.index(w));
        }
        assert_eq!(reloaded.index("<unk>"), WordIndex::UNK);
    }

    #[test]
    fn sorted_permutation_reorders_unk_to_zero() {
        let (_vocab, permutation) = populated_builder()
            .finish_sorted(UnknownMissing::Complain)
            .unwrap();
        // <unk> was inserted first (provisional index 0); must map to
        // final WordIndex 0 too.
        assert_eq!(permutation[0], 0);
    }
}
