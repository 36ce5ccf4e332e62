//! C6 — on-disk binary layout: the fixed-size header plus the byte ranges
//! of every section that follows it.
//!
//! Grounded on the teacher's `src/headers/{sanity,fixed_width_params,counts}.rs`
//! for the "packed header read via zerocopy, explicit little-endian counts
//! via byteorder" idiom, collapsed into a single header (no separate
//! sanity-tag struct, since this crate has no C++ ABI to cross-check
//! against) and extended with the section-size bookkeeping C6 needs so the
//! model facade (C10) can slice a single mmap into vocab/unigram/middle/
//! longest regions without a decode pass.

use std::io::{self, Read, Write};
use std::ops::Range;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use zerocopy::{AsBytes, FromBytes};

use crate::packed::{Entry, Prob, ProbBackoff, PROB_ENTRY_SIZE};
use crate::table::probing_capacity;

pub const MAGIC: [u8; 8] = *b"kenlmbin";
pub const VERSION: u32 = 1;

/// Byte size of the vocabulary's `(string_hash, WordIndex)` probing
/// records: `Entry<u32>`, 8 + 4 = 12 bytes, no padding.
pub const VOCAB_ENTRY_SIZE: usize = std::mem::size_of::<Entry<u32>>();

#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("not a recognized model file: bad magic bytes")]
    BadMagic,
    #[error("model file format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("unrecognized backend tag {0}: expected 1 (probing) or 2 (sorted)")]
    InvalidBackendTag(u8),
    #[error("order in header is 0, which is not a valid model")]
    ZeroOrder,
    #[error("header claims order {order} but file is too short to hold that many counts")]
    TruncatedCounts { order: u8 },
    #[error("back-off field present on the highest n-gram order, which must not have one")]
    BackoffOnLongestOrder,
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Probing,
    Sorted,
}

impl Backend {
    fn tag(self) -> u8 {
        match self {
            Backend::Probing => 1,
            Backend::Sorted => 2,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, FormatError> {
        match tag {
            1 => Ok(Backend::Probing),
            2 => Ok(Backend::Sorted),
            other => Err(FormatError::InvalidBackendTag(other)),
        }
    }
}

/// The fixed-size prefix of the file, byte-for-byte per §6:
/// `magic[8] version:u32 backend_tag:u8 order:u8 unk_defined:u8 _pad[1]
/// probing_mul:f32`. 20 bytes (`0x14`), after which the `counts` vector
/// follows as `order` little-endian `u64`s.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, FromBytes, AsBytes)]
struct RawFixedHeader {
    magic: [u8; 8],
    version: u32,
    backend_tag: u8,
    order: u8,
    unk_defined: u8,
    _pad: u8,
    probing_multiplier: f32,
}

const FIXED_HEADER_SIZE: usize = std::mem::size_of::<RawFixedHeader>();

#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    pub backend: Backend,
    pub order: u8,
    /// Whether the source ARPA actually defined `<unk>`'s unigram, as
    /// opposed to one synthesized by the `unknown_missing` policy. Persisted
    /// here (rather than left to be re-derived) so a model reloaded from its
    /// binary file answers [`crate::vocab::Vocabulary::unk_was_defined`] the
    /// same way the freshly-built model did (§8 round-trip property 3).
    pub unk_defined: bool,
    pub probing_multiplier: f32,
    pub counts: Vec<u64>,
}

impl Header {
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), FormatError> {
        let raw = RawFixedHeader {
            magic: MAGIC,
            version: VERSION,
            backend_tag: self.backend.tag(),
            order: self.order,
            unk_defined: self.unk_defined as u8,
            _pad: 0,
            probing_multiplier: self.probing_multiplier,
        };
        w.write_all(raw.as_bytes())?;
        for &c in &self.counts {
            w.write_u64::<LittleEndian>(c)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, FormatError> {
        let mut buf = [0u8; FIXED_HEADER_SIZE];
        r.read_exact(&mut buf)?;
        let raw = RawFixedHeader::read_from(buf.as_slice()).ok_or(FormatError::BadMagic)?;
        if raw.magic != MAGIC {
            return Err(FormatError::BadMagic);
        }
        if raw.version != VERSION {
            return Err(FormatError::UnsupportedVersion {
                found: raw.version,
                expected: VERSION,
            });
        }
        if raw.order == 0 {
            return Err(FormatError::ZeroOrder);
        }
        let backend = Backend::from_tag(raw.backend_tag)?;
        let mut counts = Vec::with_capacity(raw.order as usize);
        for _ in 0..raw.order {
            counts.push(
                r.read_u64::<LittleEndian>()
                    .map_err(|_| FormatError::TruncatedCounts { order: raw.order })?,
            );
        }
        Ok(Header {
            backend,
            order: raw.order,
            unk_defined: raw.unk_defined != 0,
            probing_multiplier: raw.probing_multiplier,
            counts,
        })
    }

    /// Parse from an already-mapped byte slice (the mmap-direct path: no
    /// copy, no decode beyond this header). Returns the header and the
    /// offset of the first byte following it.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize), FormatError> {
        let mut cursor = bytes;
        let header = Self::read_from(&mut cursor)?;
        let consumed = bytes.len() - cursor.len();
        Ok((header, consumed))
    }

    fn vocab_entry_count(&self) -> Result<usize, FormatError> {
        let n = self.counts[0] as usize;
        match self.backend {
            Backend::Probing => probing_capacity(n, self.probing_multiplier)
                .map_err(|_| FormatError::ZeroOrder),
            // stores every non-<unk> string hash
            Backend::Sorted => Ok(n.saturating_sub(1)),
        }
    }

    fn table_entry_count(&self, order_k: usize) -> Result<usize, FormatError> {
        let n = self.counts[order_k - 1] as usize;
        match self.backend {
            Backend::Probing => {
                probing_capacity(n, self.probing_multiplier).map_err(|_| FormatError::ZeroOrder)
            }
            Backend::Sorted => Ok(n),
        }
    }
}

/// Byte ranges (relative to the start of the file/mmap) of every section
/// after the header, per the layout in §6.
#[derive(Clone, Debug)]
pub struct Layout {
    pub vocab: Range<usize>,
    pub unigram: Range<usize>,
    /// One range per order in `2..order` (inclusive), i.e. `order - 2`
    /// entries, indexed from 0 for order 2.
    pub middle: Vec<Range<usize>>,
    pub longest: Range<usize>,
    pub total_len: usize,
}

impl Layout {
    pub fn compute(header: &Header, header_end: usize) -> Result<Self, FormatError> {
        let mut pos = header_end;

        let vocab_bytes = header.vocab_entry_count()? * VOCAB_ENTRY_SIZE;
        let vocab = pos..pos + vocab_bytes;
        pos = vocab.end;

        let unigram_bytes = header.counts[0] as usize * std::mem::size_of::<ProbBackoff>();
        let unigram = pos..pos + unigram_bytes;
        pos = unigram.end;

        let entry_size = std::mem::size_of::<Entry<ProbBackoff>>();
        let mut middle = Vec::new();
        for k in 2..header.order as usize {
            let n = header.table_entry_count(k)?;
            let range = pos..pos + n * entry_size;
            pos = range.end;
            middle.push(range);
        }

        let longest_n = header.table_entry_count(header.order as usize)?;
        let longest = pos..pos + longest_n * PROB_ENTRY_SIZE;
        pos = longest.end;

        Ok(Layout {
            vocab,
            unigram,
            middle,
            longest,
            total_len: pos,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_header(backend: Backend) -> Header {
        Header {
            backend,
            order: 3,
            unk_defined: true,
            probing_multiplier: 1.5,
            counts: vec![5, 4, 3],
        }
    }

    #[test]
    fn header_roundtrips_through_bytes() {
        for backend in [Backend::Probing, Backend::Sorted] {
            let header = sample_header(backend);
            let mut buf = Vec::new();
            header.write_to(&mut buf).unwrap();
            let (read_back, consumed) = Header::parse(&buf).unwrap();
            assert_eq!(read_back, header);
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = vec![0u8; FIXED_HEADER_SIZE + 24];
        buf[0..8].copy_from_slice(b"notamagc");
        assert!(matches!(Header::parse(&buf), Err(FormatError::BadMagic)));
    }

    #[test]
    fn rejects_unsupported_version() {
        let header = sample_header(Backend::Probing);
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        buf[8..12].copy_from_slice(&999u32.to_le_bytes());
        assert!(matches!(
            Header::parse(&buf),
            Err(FormatError::UnsupportedVersion { found: 999, .. })
        ));
    }

    #[test]
    fn layout_sections_are_contiguous_and_nonoverlapping() {
        let header = sample_header(Backend::Sorted);
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        let (parsed, end) = Header::parse(&buf).unwrap();
        let layout = Layout::compute(&parsed, end).unwrap();
        assert_eq!(layout.vocab.start, end);
        assert_eq!(layout.vocab.end, layout.unigram.start);
        assert_eq!(layout.unigram.end, layout.middle[0].start);
        assert_eq!(layout.middle[0].end, layout.middle[1].start);
        assert_eq!(layout.middle[1].end, layout.longest.start);
        assert_eq!(layout.longest.end, layout.total_len);
    }

    #[test]
    fn probing_layout_reserves_capacity_above_count() {
        let header = sample_header(Backend::Probing);
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        let (parsed, end) = Header::parse(&buf).unwrap();
        let layout = Layout::compute(&parsed, end).unwrap();
        let vocab_entries = layout.vocab.len() / VOCAB_ENTRY_SIZE;
        assert!(vocab_entries > header.counts[0] as usize);
    }
}
