//! C7 — ARPA reader.
//!
//! Grounded on the teacher's `src/reader/arpa/mod.rs` (`ArpaReader`,
//! section-by-section state machine, `matches_ngram_section_header`,
//! backoff vs. no-backoff line parsing) but rewritten around this crate's
//! own vocabulary (C2) instead of `Mappings`, and producing fully resolved
//! n-gram records (word ids already in chain-hash order) instead of a
//! generic `NGramProcessor::Output` — the teacher's FST indexing path and
//! experimental `State`/`Scores` types have no counterpart here; scoring
//! lives in `crate::scoring` instead.

use std::io::BufRead;

use crate::vocab::VocabularyBuilder;

#[cfg(test)]
mod test;

/// Converts a base-10 logarithm (how ARPA stores probabilities) to a
/// natural logarithm (how this crate stores and scores them).
pub const LN_10: f32 = std::f32::consts::LN_10;

#[derive(thiserror::Error, Debug)]
pub enum ArpaError {
    #[error("line {line}: missing `\\data\\` header")]
    DataHeaderMissing { line: usize },
    #[error("line {line}: malformed `ngram N=C` count line: {text:?}")]
    MalformedCountLine { line: usize, text: String },
    #[error("line {line}: no `ngram N=C` lines found in the `\\data\\` section")]
    NoCounts { line: usize },
    #[error("line {line}: expected section header `{expected}`, found {found:?}")]
    SectionHeaderMismatch {
        line: usize,
        expected: String,
        found: String,
    },
    #[error("line {line}: expected a `{order}`-gram line, found {text:?}")]
    MalformedNGramLine {
        line: usize,
        order: usize,
        text: String,
    },
    #[error("line {line}: section claims {expected} n-grams but {found} were read")]
    CountMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: expected a blank line between sections, found {text:?}")]
    SectionBoundaryMissing { line: usize, text: String },
    #[error("line {line}: back-off field present on the highest n-gram order")]
    BackoffOnLongestOrder { line: usize },
    #[error("expected `\\end\\` sentinel, found {found:?}")]
    MissingEndSentinel { found: Option<String> },
    #[error(transparent)]
    Vocab(#[from] crate::vocab::VocabError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A parsed n-gram line, words already resolved to provisional
/// [`crate::vocab::WordIndex`] values and already reordered newest-word-first
/// (§4.7 step 4 / [`crate::hash::ChainHash`]'s word-order contract).
#[derive(Clone, Debug, PartialEq)]
pub struct NGramRecord {
    pub words: Vec<u32>,
    pub prob: f32,
    pub backoff: f32,
}

pub struct ArpaModel {
    pub order: usize,
    pub counts: Vec<usize>,
    pub vocab: VocabularyBuilder,
    /// Unigram probability/backoff, indexed by provisional `WordIndex`
    /// (i.e. first-seen order; not yet permuted for the sorted backend).
    pub unigrams: Vec<(f32, f32)>,
    /// `middle[i]` holds the order `i + 2` records, for `i` in `0..order-2`.
    pub middle: Vec<Vec<NGramRecord>>,
    /// The highest order's records; no back-off field.
    pub longest: Vec<NGramRecord>,
}

struct LineCounter<B> {
    lines: std::io::Lines<B>,
    line_no: usize,
}

impl<B: BufRead> LineCounter<B> {
    fn new(inner: B) -> Self {
        Self {
            lines: inner.lines(),
            line_no: 0,
        }
    }

    fn next(&mut self) -> Result<Option<String>, std::io::Error> {
        match self.lines.next() {
            None => Ok(None),
            Some(line) => {
                self.line_no += 1;
                line.map(Some)
            }
        }
    }

    fn line_no(&self) -> usize {
        self.line_no
    }
}

/// Reads a complete ARPA file into an [`ArpaModel`]. `<s>`, `</s>`,
/// `<unk>` are ordinary tokens as far as this function is concerned; the
/// vocabulary invariants (§3) are checked later by `vocab::finish_*`.
pub fn read_arpa<B: BufRead>(reader: B) -> Result<ArpaModel, ArpaError> {
    let mut lines = LineCounter::new(reader);
    let counts = read_counts(&mut lines)?;
    let order = counts.len();

    let mut vocab = VocabularyBuilder::new();
    let unigrams = read_unigram_section(&mut lines, counts[0])?;
    // every string must be registered before higher orders reference it by
    // provisional index, so seed the builder here rather than inline below.
    let unigrams: Vec<(f32, f32)> = {
        let mut resolved = vec![(0.0f32, 0.0f32); counts[0]];
        for (word, prob, backoff) in unigrams {
            let idx = vocab.insert(&word);
            resolved[idx as usize] = (prob, backoff);
        }
        resolved
    };

    let mut middle = Vec::new();
    for k in 2..order {
        let section = read_ngram_section(&mut lines, k, counts[k - 1], true, &mut vocab)?;
        middle.push(section);
    }
    let longest = read_ngram_section(&mut lines, order, counts[order - 1], false, &mut vocab)?;

    match lines.next()? {
        Some(line) if line.trim() == "\\end\\" => {}
        other => {
            return Err(ArpaError::MissingEndSentinel { found: other });
        }
    }

    Ok(ArpaModel {
        order,
        counts,
        vocab,
        unigrams,
        middle,
        longest,
    })
}

fn read_counts<B: BufRead>(lines: &mut LineCounter<B>) -> Result<Vec<usize>, ArpaError> {
    match lines.next()? {
        Some(line) if line.trim() == "\\data\\" => {}
        _ => {
            return Err(ArpaError::DataHeaderMissing {
                line: lines.line_no(),
            })
        }
    }

    let mut counts = Vec::new();
    loop {
        let line = lines.next()?.unwrap_or_default();
        if line.trim().is_empty() {
            break;
        }
        let suffix = line.strip_prefix("ngram ").ok_or_else(|| ArpaError::MalformedCountLine {
            line: lines.line_no(),
            text: line.clone(),
        })?;
        let (_order_str, count_str) = suffix.split_once('=').ok_or_else(|| ArpaError::MalformedCountLine {
            line: lines.line_no(),
            text: line.clone(),
        })?;
        let count: usize = count_str.trim().parse().map_err(|_| ArpaError::MalformedCountLine {
            line: lines.line_no(),
            text: line.clone(),
        })?;
        counts.push(count);
    }
    if counts.is_empty() {
        return Err(ArpaError::NoCounts {
            line: lines.line_no(),
        });
    }
    Ok(counts)
}

fn read_unigram_section<B: BufRead>(
    lines: &mut LineCounter<B>,
    expected: usize,
) -> Result<Vec<(String, f32, f32)>, ArpaError> {
    expect_section_header(lines, 1)?;
    let mut rows = Vec::with_capacity(expected);
    for _ in 0..expected {
        let line = require_line(lines)?;
        let mut pieces = line.split_ascii_whitespace();
        let prob = parse_log10(&mut pieces, lines.line_no(), 1, &line)?;
        let word = pieces.next().ok_or_else(|| ArpaError::MalformedNGramLine {
            line: lines.line_no(),
            order: 1,
            text: line.clone(),
        })?;
        let backoff: f32 = match pieces.next() {
            Some(b) => b.parse().map_err(|_| ArpaError::MalformedNGramLine {
                line: lines.line_no(),
                order: 1,
                text: line.clone(),
            })?,
            None => 0.0,
        };
        rows.push((word.to_string(), prob, backoff * LN_10));
    }
    if rows.len() != expected {
        return Err(ArpaError::CountMismatch {
            line: lines.line_no(),
            expected,
            found: rows.len(),
        });
    }
    expect_blank(lines)?;
    Ok(rows)
}

fn read_ngram_section<B: BufRead>(
    lines: &mut LineCounter<B>,
    order: usize,
    expected: usize,
    has_backoff: bool,
    vocab: &mut VocabularyBuilder,
) -> Result<Vec<NGramRecord>, ArpaError> {
    expect_section_header(lines, order)?;
    let mut rows = Vec::with_capacity(expected);
    for _ in 0..expected {
        let line = require_line(lines)?;
        let pieces: Vec<&str> = line.split_ascii_whitespace().collect();
        if pieces.is_empty() {
            return Err(ArpaError::MalformedNGramLine {
                line: lines.line_no(),
                order,
                text: line.clone(),
            });
        }
        let prob: f32 = pieces[0].parse().map_err(|_| ArpaError::MalformedNGramLine {
            line: lines.line_no(),
            order,
            text: line.clone(),
        })?;
        let prob = prob * LN_10;

        let (words_slice, backoff) = if has_backoff && pieces.len() == order + 2 {
            // trailing back-off column present (optional per §4.7)
            let last = pieces.len() - 1;
            let backoff: f32 = pieces[last].parse().map_err(|_| ArpaError::MalformedNGramLine {
                line: lines.line_no(),
                order,
                text: line.clone(),
            })?;
            (&pieces[1..last], backoff * LN_10)
        } else if has_backoff && pieces.len() == order + 1 {
            (&pieces[1..], 0.0)
        } else {
            if pieces.len() == order + 2 {
                return Err(ArpaError::BackoffOnLongestOrder {
                    line: lines.line_no(),
                });
            }
            if pieces.len() != order + 1 {
                return Err(ArpaError::MalformedNGramLine {
                    line: lines.line_no(),
                    order,
                    text: line.clone(),
                });
            }
            (&pieces[1..], 0.0)
        };

        if words_slice.len() != order {
            return Err(ArpaError::MalformedNGramLine {
                line: lines.line_no(),
                order,
                text: line.clone(),
            });
        }

        // newest (last, predicted) word first, then context going
        // backward — matches ChainHash's word-order contract.
        let words: Vec<u32> = words_slice
            .iter()
            .rev()
            .map(|w| vocab.insert(w))
            .collect();

        rows.push(NGramRecord { words, prob, backoff });
    }
    if rows.len() != expected {
        return Err(ArpaError::CountMismatch {
            line: lines.line_no(),
            expected,
            found: rows.len(),
        });
    }
    expect_blank(lines)?;
    Ok(rows)
}

fn expect_section_header<B: BufRead>(lines: &mut LineCounter<B>, order: usize) -> Result<(), ArpaError> {
    let expected = format!("\\{order}-grams:");
    let line = require_line(lines)?;
    if line.trim() != expected {
        return Err(ArpaError::SectionHeaderMismatch {
            line: lines.line_no(),
            expected,
            found: line,
        });
    }
    Ok(())
}

fn expect_blank<B: BufRead>(lines: &mut LineCounter<B>) -> Result<(), ArpaError> {
    match lines.next()? {
        Some(line) if line.trim().is_empty() => Ok(()),
        Some(line) => Err(ArpaError::SectionBoundaryMissing {
            line: lines.line_no(),
            text: line,
        }),
        None => Err(ArpaError::SectionBoundaryMissing {
            line: lines.line_no(),
            text: String::new(),
        }),
    }
}

fn require_line<B: BufRead>(lines: &mut LineCounter<B>) -> Result<String, ArpaError> {
    lines.next()?.ok_or_else(|| ArpaError::MalformedNGramLine {
        line: lines.line_no(),
        order: 0,
        text: String::new(),
    })
}

fn parse_log10<'a>(
    pieces: &mut impl Iterator<Item = &'a str>,
    line_no: usize,
    order: usize,
    text: &str,
) -> Result<f32, ArpaError> {
    let raw: f32 = pieces
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| ArpaError::MalformedNGramLine {
            line: line_no,
            order,
            text: text.to_string(),
        })?;
    Ok(raw * LN_10)
}
