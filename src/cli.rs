//! Shared CLI plumbeing for the `ngram-lm` binary: `build`/`query`
//! subcommands over this crate's own `Model`/`Config`/`sorter` APIs (§4.11).
//!
//! Grounded on the teacher's `examples/score_sentence.rs` /
//! `examples/inspect_vocab.rs` (now `demos/`) for the clap-derive +
//! `anyhow::Result` shape; the subcommand split itself is new, since the
//! teacher's examples take no subcommands (there is nothing to `build` when
//! every binary file comes from the real kenlm toolchain).

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::format::Backend;
use crate::model::{Config, Model};
use crate::table::probing::DEFAULT_PROBING_MULTIPLIER;

#[derive(Parser)]
#[command(name = "ngram-lm", about = "Build and query n-gram language models")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Parse an ARPA file and write the binary model format (§4.6/§4.7).
    Build(BuildArgs),
    /// Score newline-separated sentences read from stdin against a binary model.
    Query(QueryArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    pub arpa: PathBuf,
    pub binary: PathBuf,
    /// Use the open-addressed probing backend (C4). Default.
    #[arg(long, conflicts_with = "sorted")]
    pub probing: bool,
    /// Use the sorted-uniform interpolation-search backend (C5).
    #[arg(long)]
    pub sorted: bool,
    #[arg(long, default_value_t = DEFAULT_PROBING_MULTIPLIER)]
    pub probing_multiplier: f32,
    /// In-memory run size (bytes) for the external sorter; only matters
    /// for `--sorted`.
    #[arg(long)]
    pub memory: Option<usize>,
}

#[derive(Args)]
pub struct QueryArgs {
    pub model: PathBuf,
}

/// Exit codes per §6: 0 success, 1 bad input, 2 I/O error, 3 config error.
pub fn run(cli: Cli) -> i32 {
    let result = match cli.command {
        Command::Build(args) => run_build(args),
        Command::Query(args) => run_query(args),
    };
    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code_for(&err)
        }
    }
}

fn run_build(args: BuildArgs) -> anyhow::Result<()> {
    let backend = if args.sorted { Backend::Sorted } else { Backend::Probing };
    let mut config = Config {
        backend,
        probing_multiplier: args.probing_multiplier,
        write_mmap: Some(args.binary.clone()),
        ..Config::default()
    };
    if let Some(memory) = args.memory {
        config.sort_memory_budget = memory;
    }
    Model::from_arpa(&args.arpa, config)?;
    Ok(())
}

fn run_query(args: QueryArgs) -> anyhow::Result<()> {
    let model = Model::from_binary(&args.model, false)?;
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let mut state = model.begin_sentence_state();
        let mut total = 0.0f32;
        for word in tokens.iter().copied().chain(std::iter::once("</s>")) {
            let scored = model.score_word(&state, word);
            writeln!(out, "{word}\t{:.6}\t{}", scored.log_prob, scored.matched_order)?;
            total += scored.log_prob;
            state = scored.next_state;
        }
        writeln!(out, "Total: {total:.6}")?;
    }
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(crate::Error::Io(_)) = err.downcast_ref::<crate::Error>() {
        return 2;
    }
    if let Some(crate::Error::Capacity(_) | crate::Error::Config(_)) = err.downcast_ref::<crate::Error>() {
        return 3;
    }
    if err.downcast_ref::<crate::Error>().is_some() {
        return 1;
    }
    if err.downcast_ref::<io::Error>().is_some() {
        return 2;
    }
    1
}
