use super::*;

// A small fixture for exercising the reader's plumbing (counts, section
// boundaries, log10->ln conversion, word ordering) — same shape as §8's toy
// model (counts [5, 4, 3], vocabulary `{<unk>, <s>, </s>, a, b}`) but with
// its own made-up probabilities, not the literal §8 scenario. The literal
// scenario and its documented expected scores live in
// `scoring.rs::toy_arpa_scenario_matches_documented_outputs`.
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

#[test]
fn parses_counts_and_order() {
    let model = read_arpa(TOY_ARPA.as_bytes()).unwrap();
    assert_eq!(model.order, 3);
    assert_eq!(model.counts, vec![5, 4, 3]);
    assert_eq!(model.unigrams.len(), 5);
    assert_eq!(model.middle.len(), 1);
    assert_eq!(model.middle[0].len(), 4);
    assert_eq!(model.longest.len(), 3);
}

#[test]
fn converts_log10_to_ln() {
    let model = read_arpa(TOY_ARPA.as_bytes()).unwrap();
    let unk_idx = model.vocab_index("<unk>");
    let (prob, _backoff) = model.unigrams[unk_idx as usize];
    approx::assert_abs_diff_eq!(prob, -1.0 * LN_10, epsilon = f32::EPSILON);
}

#[test]
fn words_are_reversed_for_chain_hash_order() {
    let model = read_arpa(TOY_ARPA.as_bytes()).unwrap();
    let a = model.vocab_index("a");
    let b = model.vocab_index("b");
    // "a b" (order matters: predicted word "b" first, then context "a")
    let rec = model
        .middle[0]
        .iter()
        .find(|r| r.words == vec![b, a])
        .expect("bigram `a b` should be present in reversed order");
    approx::assert_abs_diff_eq!(rec.prob, -0.07 * LN_10, epsilon = f32::EPSILON);
}

#[test]
fn missing_data_header_is_rejected() {
    let bad = "\\1-grams:\n-1.0\t<unk>\n\n\\end\\\n";
    let err = read_arpa(bad.as_bytes()).unwrap_err();
    assert!(matches!(err, ArpaError::DataHeaderMissing { .. }));
}

#[test]
fn missing_end_sentinel_is_rejected() {
    let bad = "\\data\\\nngram 1=1\n\n\\1-grams:\n-1.0\t<unk>\n\n";
    let err = read_arpa(bad.as_bytes()).unwrap_err();
    assert!(matches!(err, ArpaError::MissingEndSentinel { .. }));
}

#[test]
fn backoff_on_longest_order_is_rejected() {
    let bad = "\\data\\\nngram 1=2\nngram 2=1\n\n\\1-grams:\n-1.0\t<unk>\n-0.5\ta\n\n\\2-grams:\n-0.1\t<unk> a\t-0.2\n\n\\end\\\n";
    let err = read_arpa(bad.as_bytes()).unwrap_err();
    assert!(matches!(err, ArpaError::BackoffOnLongestOrder { .. }));
}

#[test]
fn section_boundary_missing_is_rejected() {
    let bad = "\\data\\\nngram 1=1\n\n\\1-grams:\n-1.0\t<unk>\n\\end\\\n";
    let err = read_arpa(bad.as_bytes()).unwrap_err();
    assert!(matches!(err, ArpaError::SectionBoundaryMissing { .. }));
}

#[test]
fn count_mismatch_is_rejected() {
    let bad = "\\data\\\nngram 1=2\n\n\\1-grams:\n-1.0\t<unk>\n\n\\end\\\n";
    let err = read_arpa(bad.as_bytes()).unwrap_err();
    assert!(matches!(err, ArpaError::CountMismatch { .. }));
}

impl ArpaModel {
    // test-only convenience: resolve a token to its provisional WordIndex
    // via a private reach-in, mirroring how `model::builder` will look
    // words up during permutation.
    fn vocab_index(&self, word: &str) -> u32 {
        self.vocab.peek_index(word).expect("word must have been inserted while parsing")
    }
}
