use std::path::PathBuf;

use clap::Parser;
use ngram_lm::{Config, Model};

#[derive(Parser, Debug)]
struct Args {
    #[clap(long)]
    arpa_path: PathBuf,
    #[clap(default_value = "This is a test sentence.")]
    sentence: String,
    #[clap(action, short = 'b', default_value = "false")]
    score_bos: bool,
    #[clap(action, short = 'e', default_value = "false")]
    score_eos: bool,
}

fn main() -> anyhow::Result<()> {
    let Args {
        arpa_path,
        sentence,
        score_bos,
        score_eos,
    } = Args::parse();

    let model = Model::from_arpa(&arpa_path, Config::default())?;

    let mut state = if score_bos {
        model.begin_sentence_state()
    } else {
        model.null_context_state()
    };
    let mut total = 0.0f32;
    for word in sentence.split_ascii_whitespace() {
        let scored = model.score_word(&state, word);
        total += scored.log_prob;
        state = scored.next_state;
    }
    if score_eos {
        total += model.score_word(&state, "</s>").log_prob;
    }

    eprintln!(
        "Total score of the sentence \"{sentence}\", calculated from rust: {total:?}"
    );

    Ok(())
}
