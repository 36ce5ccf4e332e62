//! C8 — external merge sort.
//!
//! The sorted-uniform backend (C5) needs its entries supplied in ascending
//! key order at build time. No teacher file does external sorting; this
//! follows `divvun-bidiff/crates/bidiff/src/hashindex.rs`'s pattern of a
//! disk-backed temp file (there, an `MmapTable` over `/var/tmp`) generalized
//! to runs of packed [`Entry`] records via the `tempfile` crate instead of
//! raw `libc::mkstemp`, since the scale here (n-gram tables, not a text
//! index) calls for spill-to-disk runs rather than a single resident file.
//!
//! Per §4.8, entries within a run are ordered lexicographically on the
//! reversed (history-major) word sequence while they are still `NGramRecord`s
//! — that's the canonical tie-break applied before hashing, in
//! [`crate::model::builder`]. By the time records reach this module they are
//! already `(Key64, V)` pairs, and what C5's interpolation search actually
//! requires is ascending order on `Key64`, so that is what this module
//! sorts and merges by.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::{self, Read, Seek, SeekFrom, Write};

use tempfile::tempfile;
use zerocopy::{AsBytes, FromBytes};

use crate::packed::Entry;

/// Sort `entries` by key ascending, spilling to temporary run files once
/// the in-memory budget is exceeded. Below the budget, sorts in place with
/// no I/O at all.
pub fn sort_entries<V>(mut entries: Vec<Entry<V>>, memory_budget_bytes: usize) -> io::Result<Vec<Entry<V>>>
where
    V: Copy + AsBytes + FromBytes,
{
    let record_size = std::mem::size_of::<Entry<V>>().max(1);
    let records_per_run = (memory_budget_bytes / record_size).max(1);

    if entries.len() <= records_per_run {
        entries.sort_unstable_by_key(|e| e.key);
        return Ok(entries);
    }

    let mut runs = Vec::new();
    for chunk in entries.chunks(records_per_run) {
        runs.push(write_run(chunk)?);
    }
    merge_runs(runs, record_size)
}

fn write_run<V>(chunk: &[Entry<V>]) -> io::Result<std::fs::File>
where
    V: Copy + AsBytes + FromBytes,
{
    let mut sorted: Vec<Entry<V>> = chunk.to_vec();
    sorted.sort_unstable_by_key(|e| e.key);

    let mut file = tempfile()?;
    for entry in &sorted {
        file.write_all(entry.as_bytes())?;
    }
    file.seek(SeekFrom::Start(0))?;
    Ok(file)
}

struct RunCursor {
    file: std::fs::File,
    buf: Vec<u8>,
}

fn merge_runs<V>(runs: Vec<std::fs::File>, record_size: usize) -> io::Result<Vec<Entry<V>>>
where
    V: Copy + AsBytes + FromBytes,
{
    let mut cursors: Vec<RunCursor> = runs
        .into_iter()
        .map(|file| RunCursor {
            file,
            buf: vec![0u8; record_size],
        })
        .collect();

    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = BinaryHeap::new();
    for (i, cursor) in cursors.iter_mut().enumerate() {
        if let Some(entry) = read_one::<V>(cursor, record_size)? {
            heap.push(Reverse((entry.key, i)));
            // stash the just-read entry back at the front by re-seeking;
            // simpler to decode keys lazily below via a per-run peek cache.
            cursor.file.seek(SeekFrom::Current(-(record_size as i64)))?;
        }
    }

    let mut output = Vec::new();
    while let Some(Reverse((_, run_idx))) = heap.pop() {
        let entry = read_one::<V>(&mut cursors[run_idx], record_size)?
            .expect("run_idx was pushed onto the heap because a record was available");
        output.push(entry);
        if let Some(next) = read_one::<V>(&mut cursors[run_idx], record_size)? {
            heap.push(Reverse((next.key, run_idx)));
            cursors[run_idx]
                .file
                .seek(SeekFrom::Current(-(record_size as i64)))?;
        }
    }

    Ok(output)
}

fn read_one<V>(cursor: &mut RunCursor, _record_size: usize) -> io::Result<Option<Entry<V>>>
where
    V: Copy + AsBytes + FromBytes,
{
    match cursor.file.read_exact(&mut cursor.buf) {
        Ok(()) => Ok(Some(
            Entry::<V>::read_from(cursor.buf.as_slice()).expect("record_size matches Entry<V> layout"),
        )),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}
