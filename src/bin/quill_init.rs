//! Create a Fresh Checkpoint
//!
//! Builds a vocabulary from the distinct characters of a corpus, initializes a
//! model of the chosen size and writes both to a checkpoint. The weights are
//! untrained, which is enough to exercise `quill` end to end.
//!
//! ## Usage
//!
//! ```bash
//! quill-init --corpus shakespeare.txt --out model.ckpt --preset tiny --seed 7
//! ```

use clap::{Parser, ValueEnum};
use quill::{Checkpoint, Config, GptModel, Vocabulary};
use std::fs;
use std::process::ExitCode;

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Tiny,
    Small,
    Default,
}

#[derive(Parser)]
#[command(name = "quill-init", about = "Initialize a character-level GPT checkpoint")]
struct Args {
    /// Text file whose characters form the vocabulary
    #[arg(long)]
    corpus: String,

    /// Where to write the checkpoint
    #[arg(long)]
    out: String,

    /// Model size
    #[arg(long, value_enum, default_value_t = Preset::Tiny)]
    preset: Preset,

    /// Seed for weight initialization
    #[arg(long, default_value_t = 1337)]
    seed: u64,
}

fn run(args: &Args) -> quill::Result<()> {
    let text = fs::read_to_string(&args.corpus)?;
    let vocabulary = Vocabulary::from_corpus(&text);
    log::info!("Vocabulary: {} characters from {}", vocabulary.len(), args.corpus);

    let config = match args.preset {
        Preset::Tiny => Config::tiny(vocabulary.len()),
        Preset::Small => Config::small(vocabulary.len()),
        Preset::Default => Config::default().with_vocab_size(vocabulary.len()),
    };
    let model = GptModel::from_seed(&config, args.seed)?;

    Checkpoint::new(vocabulary, model)?.save(&args.out)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => {
            println!("Wrote {}", args.out);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
