//! C9 — the scoring engine: `FullScore(state, word) -> (prob, matched_order, next_state)`.
//!
//! No teacher file implements this (the teacher delegates scoring to the
//! bridged C++ library via `model/mod.rs::score_word_given_state`); this is
//! built directly from §4.9's algorithm using this crate's own
//! [`ChainHash`] and [`Table`] trait. The in/out-state naming in
//! `crate::model` mirrors the teacher's public method shape.

use crate::hash::ChainHash;
use crate::packed::{Prob, ProbBackoff};
use crate::state::State;
use crate::table::{AnyTable, Table};
use crate::vocab::WordIndex;

/// Result of scoring one word against a state, per §4.9's public contract.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scored {
    /// Natural-log probability.
    pub log_prob: f32,
    pub matched_order: u8,
    pub next_state: State,
}

/// `word_is_oov` is `true` when the caller resolved `word` to
/// [`WordIndex::UNK`] because it was not in the vocabulary at all — as
/// opposed to `word` genuinely being the `<unk>` token, which has a real
/// table entry. This is how `matched_order = 0` is distinguished from a
/// real (score-bearing) `<unk>` hit (§9.1 Open Questions).
pub fn full_score(
    order: usize,
    unigram: &[ProbBackoff],
    middle: &[AnyTable<'_, ProbBackoff>],
    longest: &AnyTable<'_, Prob>,
    state: &State,
    word: WordIndex,
    word_is_oov: bool,
) -> Scored {
    let new_word = word.as_u32();
    let context = state.context();
    let cached_backoffs = state.backoffs();

    // keys[i] is the chain-hash key of the (i + 2)-gram `[new_word,
    // context[0], .., context[i]]`: both the candidate key for scoring
    // `new_word` at order `i + 2`, and (read the other way) the key of the
    // history context the *next* scoring call will need, since `new_word`
    // becomes the newest context word once this call returns.
    let mut chain = ChainHash::new(new_word);
    let max_context = context.len().min(order.saturating_sub(1));
    let mut keys = Vec::with_capacity(max_context);
    for &w in &context[..max_context] {
        keys.push(chain.extend(w));
    }

    let mut accumulated_backoff = 0.0f32;
    let mut matched_order = 0usize;
    let mut log_prob = 0.0f32;

    // try from longest feasible order down to bigram
    for m in (2..=max_context + 1).rev() {
        let key = keys[m - 2];
        let hit = if m == order {
            longest.find(key).map(|p| p.prob)
        } else {
            middle.get(m - 2).and_then(|t| t.find(key)).map(|e| e.prob)
        };
        if let Some(prob) = hit {
            matched_order = m;
            log_prob = prob + accumulated_backoff;
            break;
        }
        // miss: back off through the (m - 1)-length history context
        // (`context[..m-2]`), cached in `state.backoffs()` from when this
        // state was produced.
        if let Some(&b) = cached_backoffs.get(m - 2) {
            accumulated_backoff += b;
        }
    }

    if matched_order == 0 {
        let unigram_prob = unigram.get(new_word as usize).map(|u| u.prob).unwrap_or(f32::NEG_INFINITY);
        log_prob = unigram_prob + accumulated_backoff;
        matched_order = if word_is_oov { 0 } else { 1 };
    }

    // Cache the back-offs of the contexts the *next* call will need:
    // length 1 is `[new_word]` alone (the unigram's own back-off); length
    // `i + 1` for `i >= 1` is `[new_word, context[0..i-1]]`, keyed by
    // `keys[i - 1]` and looked up in the corresponding middle table.
    let new_len = (max_context + 1).min(order.saturating_sub(1)).min(crate::state::MAX_ORDER - 1);
    let mut next_backoffs = vec![0.0f32; new_len];
    if new_len > 0 {
        next_backoffs[0] = unigram.get(new_word as usize).map(|u| u.backoff).unwrap_or(0.0);
    }
    for i in 1..new_len {
        let length = i + 1;
        next_backoffs[i] = middle
            .get(length - 2)
            .and_then(|t| t.find(keys[i - 1]))
            .map(|e| e.backoff)
            .unwrap_or(0.0);
    }

    let next_state = state.advance(new_word, &next_backoffs, order);
    Scored {
        log_prob,
        matched_order: matched_order as u8,
        next_state,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packed::Entry;
    use crate::table::sorted::SortedTable;

    fn sorted<'a, V: Copy>(entries: &'a [Entry<V>]) -> AnyTable<'a, V> {
        AnyTable::Sorted(SortedTable::from_entries(entries))
    }

    #[test]
    fn unigram_fallback_with_no_context() {
        let unigram = vec![
            ProbBackoff { prob: -5.0, backoff: 0.0 }, // <unk>
            ProbBackoff { prob: -1.0, backoff: 0.0 },
        ];
        let middle: Vec<AnyTable<ProbBackoff>> = vec![];
        let longest_entries: Vec<Entry<Prob>> = vec![];
        let longest = sorted(&longest_entries);
        let state = State::null_context();

        let scored = full_score(2, &unigram, &middle, &longest, &state, WordIndex(1), false);
        assert_eq!(scored.matched_order, 1);
        approx::assert_abs_diff_eq!(scored.log_prob, -1.0, epsilon = f32::EPSILON);
    }

    #[test]
    fn oov_word_has_matched_order_zero() {
        let unigram = vec![ProbBackoff { prob: -5.0, backoff: 0.0 }];
        let middle: Vec<AnyTable<ProbBackoff>> = vec![];
        let longest_entries: Vec<Entry<Prob>> = vec![];
        let longest = sorted(&longest_entries);
        let state = State::null_context();

        let scored = full_score(2, &unigram, &middle, &longest, &state, WordIndex::UNK, true);
        assert_eq!(scored.matched_order, 0);
    }

    /// The literal toy-ARPA scenario and expected outputs from §8, word by
    /// word: `<unk>=0, <s>=1, </s>=2, a=3, b=4`, order 3. ARPA log10 values
    /// converted to natural log the same way `arpa::read_arpa` does
    /// (`* LN_10`); `<s>`'s unigram prob is forced to `-inf` on load, its
    /// backoff (`0.0` here) is left alone.
    #[test]
    fn toy_arpa_scenario_matches_documented_outputs() {
        use crate::arpa::LN_10;

        let unigram = vec![
            ProbBackoff { prob: -2.0 * LN_10, backoff: 0.0 },       // <unk>
            ProbBackoff { prob: f32::NEG_INFINITY, backoff: 0.0 }, // <s>
            ProbBackoff { prob: -1.0 * LN_10, backoff: 0.0 },       // </s>
            ProbBackoff { prob: -0.5 * LN_10, backoff: -0.2 * LN_10 }, // a
            ProbBackoff { prob: -0.7 * LN_10, backoff: -0.3 * LN_10 }, // b
        ];

        let bigram_entries = vec![
            Entry::new(
                crate::hash::chain_hash_one_shot(&[3, 1]), // "<s> a"
                ProbBackoff { prob: -0.1 * LN_10, backoff: -0.05 * LN_10 },
            ),
            Entry::new(
                crate::hash::chain_hash_one_shot(&[2, 3]), // "a </s>"
                ProbBackoff { prob: -0.2 * LN_10, backoff: 0.0 },
            ),
            Entry::new(
                crate::hash::chain_hash_one_shot(&[4, 3]), // "a b"
                ProbBackoff { prob: -0.3 * LN_10, backoff: -0.1 * LN_10 },
            ),
        ];
        let middle: Vec<AnyTable<ProbBackoff>> = vec![sorted(&bigram_entries)];

        let longest_entries = vec![Entry::new(
            crate::hash::chain_hash_one_shot(&[4, 3, 1]), // "<s> a b"
            Prob { prob: -0.25 * LN_10 },
        )];
        let longest = sorted(&longest_entries);

        let s0 = State::begin_sentence(WordIndex(1), 0.0); // backoff(<s>) = 0 in this scenario

        // score(s0, a) -> prob = -0.1 * ln10, matched_order = 2
        let scored = full_score(3, &unigram, &middle, &longest, &s0, WordIndex(3), false);
        approx::assert_abs_diff_eq!(scored.log_prob, -0.1 * LN_10, epsilon = f32::EPSILON);
        assert_eq!(scored.matched_order, 2);
        let s1 = scored.next_state;

        // score(s1, b) -> prob = -0.25 * ln10, matched_order = 3
        let scored = full_score(3, &unigram, &middle, &longest, &s1, WordIndex(4), false);
        approx::assert_abs_diff_eq!(scored.log_prob, -0.25 * LN_10, epsilon = f32::EPSILON);
        assert_eq!(scored.matched_order, 3);

        // score(s0, <unk>) -> prob = -2.0 * ln10 + backoff(<s>)*ln10 = -2.0 * ln10;
        // <unk> is explicitly defined in this ARPA, so it is a real hit
        // (matched_order = 1), per SPEC_FULL.md §9.1's resolved convention.
        let scored = full_score(3, &unigram, &middle, &longest, &s0, WordIndex(0), false);
        approx::assert_abs_diff_eq!(scored.log_prob, -2.0 * LN_10, epsilon = f32::EPSILON);
        assert_eq!(scored.matched_order, 1);

        // score(begin, </s>) -> prob = -1.0 * ln10 + backoff(<s>)*ln10 = -1.0 * ln10
        let scored = full_score(3, &unigram, &middle, &longest, &s0, WordIndex(2), false);
        approx::assert_abs_diff_eq!(scored.log_prob, -1.0 * LN_10, epsilon = f32::EPSILON);
        assert_eq!(scored.matched_order, 1);
    }

    #[test]
    fn bigram_hit_short_circuits_unigram() {
        use crate::hash::chain_hash_one_shot;
        let unigram = vec![
            ProbBackoff { prob: -9.0, backoff: 0.0 },
            ProbBackoff { prob: -1.0, backoff: -0.2 },
            ProbBackoff { prob: -2.0, backoff: -0.3 },
        ];
        // bigram "a b" -> new_word=2 (b), context=[1] (a)
        let key = chain_hash_one_shot(&[2, 1]);
        let longest_entries = vec![Entry::new(key, Prob { prob: -0.5 })];
        let longest = sorted(&longest_entries);
        let middle: Vec<AnyTable<ProbBackoff>> = vec![];

        let mut state = State::empty();
        // manually construct a 1-word context state without backoff caching
        let state_with_ctx = state.advance(1, &[0.0], 2);
        state = state_with_ctx;

        let scored = full_score(2, &unigram, &middle, &longest, &state, WordIndex(2), false);
        assert_eq!(scored.matched_order, 2);
        approx::assert_abs_diff_eq!(scored.log_prob, -0.5, epsilon = f32::EPSILON);
    }
}
