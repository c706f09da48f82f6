//! Answer One Prompt
//!
//! Loads a checkpoint, generates a continuation of the prompt and prints a
//! single JSON object on stdout.
//!
//! ## Usage
//!
//! ```bash
//! quill --checkpoint model.ckpt "To be, or not to be"
//! quill --checkpoint model.ckpt --seed 42 --max-new-tokens 200 "ROMEO:"
//! ```
//!
//! ## Output
//!
//! ```text
//! {"response": "...", "model": "quill-char-gpt"}    exit 0
//! {"error": "..."}                                   exit 1
//! ```
//!
//! A missing prompt, an unloadable checkpoint or a prompt with no known
//! characters takes the error path. A failure while generating is reported
//! inside `response` and still exits 0. Logs go to stderr (`RUST_LOG=debug`).

use clap::Parser;
use quill::{Checkpoint, GenerationConfig, GenerationDriver, QuillError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "quill", about = "Generate text from a character-level GPT checkpoint")]
struct Args {
    /// Path to the model checkpoint
    #[arg(long, default_value = "quill.ckpt")]
    checkpoint: String,

    /// Tokens to sample per request
    #[arg(long, default_value_t = 100)]
    max_new_tokens: usize,

    /// Random seed for sampling (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Identifier reported in the `model` field
    #[arg(long, default_value = "quill-char-gpt")]
    model_id: String,

    /// Prompt text; multiple words are joined with spaces
    prompt: Vec<String>,
}

fn fail(message: &str) -> ExitCode {
    println!("{}", json!({ "error": message }));
    ExitCode::FAILURE
}

fn succeed(response: &str, model_id: &str) -> ExitCode {
    println!("{}", json!({ "response": response, "model": model_id }));
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let prompt = args.prompt.join(" ");
    if prompt.is_empty() {
        return fail("No prompt provided");
    }

    let checkpoint = match Checkpoint::load(&args.checkpoint) {
        Ok(checkpoint) => checkpoint,
        Err(e) => return fail(&e.to_string()),
    };
    let (vocabulary, model) = checkpoint.into_parts();
    let driver = GenerationDriver::new(
        vocabulary,
        model,
        GenerationConfig {
            max_new_tokens: args.max_new_tokens,
        },
    );

    let seed = args.seed.unwrap_or_else(rand::random);
    log::debug!("Sampling with seed {}", seed);
    let mut rng = StdRng::seed_from_u64(seed);

    match driver.respond(&prompt, &mut rng) {
        Ok(response) => succeed(&response, &args.model_id),
        Err(e @ QuillError::InvalidInput(_)) => fail(&e.to_string()),
        Err(e) => {
            let msg = match e {
                QuillError::Generation(msg) => msg,
                other => other.to_string(),
            };
            succeed(&format!("Error generating response: {}", msg), &args.model_id)
        }
    }
}
