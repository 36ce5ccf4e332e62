//! C1 — hash primitives.
//!
//! Two distinct hashes are used throughout the crate and must never be
//! confused: [`string_hash64`] turns vocabulary strings into the keys used
//! by the probing and sorted vocabularies, while [`ChainHash`] combines a
//! sequence of [`WordIndex`](crate::vocab::WordIndex) values into the
//! [`Key64`] used by the n-gram tables (C4/C5). Both must be computed
//! identically by the ARPA loader and the scorer, or every lookup misses.

/// 64-bit n-gram table key. Just a `u64` newtype so it can't be mixed up
/// with a string hash or a raw word id at the type level.
pub type Key64 = u64;

/// Stable 64-bit hash of a byte string (MurmurHash64A family). Endianness
/// of the input is always interpreted as little-endian regardless of host
/// architecture, so the same bytes hash to the same value on every
/// platform — binary files must be portable across compilers and machines.
pub fn string_hash64(data: &[u8]) -> u64 {
    const SEED: u64 = 0xe17a_1465;
    const M: u64 = 0xc6a4_a793_5bd1_e995;
    const R: u32 = 47;

    let mut h: u64 = SEED ^ (data.len() as u64).wrapping_mul(M);

    let chunks = data.chunks_exact(8);
    let tail = chunks.remainder();
    for chunk in chunks {
        let mut k = u64::from_le_bytes(chunk.try_into().unwrap());
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h ^= k;
        h = h.wrapping_mul(M);
    }

    if !tail.is_empty() {
        let mut buf = [0u8; 8];
        buf[..tail.len()].copy_from_slice(tail);
        h ^= u64::from_le_bytes(buf);
        h = h.wrapping_mul(M);
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;
    h
}

/// Odd 64-bit constants near `2**64 * phi` and `2**64 / sqrt(2)`, used to
/// combine word ids into an n-gram key. Fixed across the crate (and across
/// every compiler build of it) so that `A`/`B` never drift between a
/// writer and a reader.
const CHAIN_A: u64 = 0x9E37_79B9_7F4A_7C15;
const CHAIN_B: u64 = 0xBF58_476D_1CE4_E5B9;

/// Combine a word id sequence into a single [`Key64`] in one call.
///
/// `words` must be ordered *newest first*: the word being predicted comes
/// first, then its immediate left-context neighbour, and so on further
/// into history. This is the order the ARPA reader tokenises a line in
/// (§4.7 reads right-to-left) and the order the scorer walks a [`State`]
/// (§4.9): both must agree, or `find` calls in C4/C5 miss entries that are
/// actually present.
///
/// [`State`]: crate::state::State
pub fn chain_hash_one_shot(words: &[u32]) -> Key64 {
    let mut iter = words.iter();
    let first = *iter
        .next()
        .expect("chain_hash_one_shot requires at least one word");
    let mut current = first as u64;
    for &w in iter {
        current = current.wrapping_mul(CHAIN_A) ^ (w as u64).wrapping_mul(CHAIN_B);
    }
    current
}

/// Incremental chain hash: emits one key per additional word appended,
/// without recomputing the prefix. Used by the scorer to cache the keys
/// for every candidate order as it walks from the predicted word outward
/// into the retained context, and by the ARPA/sorter pipeline building
/// n-gram records order by order.
#[derive(Clone, Copy, Debug)]
pub struct ChainHash {
    current: u64,
    len: usize,
}

impl ChainHash {
    /// Start a chain with a single word (order 1). The order-1 "key" is
    /// never itself used to index a table — unigrams are looked up by
    /// direct array index — but it is the seed for every longer chain.
    pub fn new(first_word: u32) -> Self {
        Self {
            current: first_word as u64,
            len: 1,
        }
    }

    /// Extend the chain by one more (older) word, returning the key for
    /// the resulting (longer) order.
    pub fn extend(&mut self, next_word: u32) -> Key64 {
        self.current = self.current.wrapping_mul(CHAIN_A) ^ (next_word as u64).wrapping_mul(CHAIN_B);
        self.len += 1;
        self.current
    }

    pub fn key(&self) -> Key64 {
        self.current
    }

    /// Number of words folded into the chain so far (the order it
    /// currently represents).
    pub fn order(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn string_hash_is_deterministic() {
        assert_eq!(string_hash64(b"hello"), string_hash64(b"hello"));
        assert_ne!(string_hash64(b"hello"), string_hash64(b"world"));
    }

    #[test]
    fn string_hash_handles_empty_and_short_tails() {
        // exercise the tail branch for every remainder length 0..=7
        let mut prev = None;
        for len in 0..16 {
            let data = vec![7u8; len];
            let h = string_hash64(&data);
            if let Some(p) = prev {
                assert_ne!(h, p, "hash collided for length {len}");
            }
            prev = Some(h);
        }
    }

    #[test]
    fn chain_hash_one_shot_matches_incremental() {
        let words = [10u32, 20, 30, 40];
        let one_shot = chain_hash_one_shot(&words);

        let mut chain = ChainHash::new(words[0]);
        let mut last = chain.key();
        for &w in &words[1..] {
            last = chain.extend(w);
        }
        assert_eq!(one_shot, last);
        assert_eq!(chain.order(), words.len());
    }

    #[test]
    fn chain_hash_is_order_sensitive() {
        let a = chain_hash_one_shot(&[1, 2, 3]);
        let b = chain_hash_one_shot(&[3, 2, 1]);
        assert_ne!(a, b);
    }

    #[test]
    fn chain_hash_prefixes_are_cached_not_recomputed() {
        // The key for the 2-word prefix [1, 2] must equal chain_hash_one_shot([1, 2])
        // even when it was produced partway through a longer extension.
        let mut chain = ChainHash::new(1);
        let prefix_key = chain.extend(2);
        assert_eq!(prefix_key, chain_hash_one_shot(&[1, 2]));
        let _ = chain.extend(3);
        assert_eq!(prefix_key, chain_hash_one_shot(&[1, 2]));
    }
}
