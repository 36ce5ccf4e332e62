use std::path::PathBuf;

use clap::Parser;
use ngram_lm::{Config, Model};

#[derive(Parser, Debug)]
struct Args {
    #[clap(long)]
    arpa_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let Args { arpa_path } = Args::parse();

    // Built from an ARPA file (rather than `Model::from_binary`) so the
    // vocabulary still carries its surface strings — a binary model's vocab
    // block only stores string hashes (see `Vocabulary::write_to`).
    let model = Model::from_arpa(&arpa_path, Config::default())?;
    let vocab = model.vocab();

    eprintln!("The vocab has {} elements.", vocab.len());
    for special in ["<unk>", "<s>", "</s>"] {
        let idx = vocab.index(special);
        eprintln!("{special} -> {idx:?} ({:?})", vocab.word(idx));
    }

    Ok(())
}
