use clap::Parser;
use ngram_lm::cli::{self, Cli};

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    std::process::exit(cli::run(cli));
}
