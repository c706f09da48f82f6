//! End-to-end runs of the `quill` and `quill-init` binaries

use quill::{Checkpoint, Config, GptModel, Vocabulary};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn init_checkpoint(dir: &Path) -> PathBuf {
    let corpus = dir.join("corpus.txt");
    std::fs::write(&corpus, "hello there, general kenobi\n").unwrap();
    let out = dir.join("model.ckpt");

    let status = Command::new(env!("CARGO_BIN_EXE_quill-init"))
        .args(["--corpus", corpus.to_str().unwrap()])
        .args(["--out", out.to_str().unwrap()])
        .args(["--preset", "tiny", "--seed", "3"])
        .status()
        .unwrap();
    assert!(status.success());
    out
}

fn run_quill(args: &[&str]) -> (Output, serde_json::Value) {
    let output = Command::new(env!("CARGO_BIN_EXE_quill"))
        .args(args)
        .output()
        .unwrap();
    let json = serde_json::from_slice(&output.stdout).unwrap();
    (output, json)
}

#[test]
fn prompt_produces_response_json() {
    let dir = tempfile::tempdir().unwrap();
    let ckpt = init_checkpoint(dir.path());

    let (output, json) = run_quill(&[
        "--checkpoint",
        ckpt.to_str().unwrap(),
        "--seed",
        "1",
        "--max-new-tokens",
        "8",
        "hello",
    ]);
    assert!(output.status.success());
    assert_eq!(json["model"], "quill-char-gpt");
    assert!(json["response"].as_str().unwrap().chars().count() <= 8);
}

#[test]
fn same_seed_same_response() {
    let dir = tempfile::tempdir().unwrap();
    let ckpt = init_checkpoint(dir.path());
    let args = ["--checkpoint", ckpt.to_str().unwrap(), "--seed", "9", "general"];

    let (_, a) = run_quill(&args);
    let (_, b) = run_quill(&args);
    assert_eq!(a, b);
}

#[test]
fn missing_prompt_fails() {
    let dir = tempfile::tempdir().unwrap();
    let ckpt = init_checkpoint(dir.path());

    let (output, json) = run_quill(&["--checkpoint", ckpt.to_str().unwrap()]);
    assert!(!output.status.success());
    assert_eq!(json["error"], "No prompt provided");
}

#[test]
fn missing_checkpoint_fails() {
    let dir = tempfile::tempdir().unwrap();
    let ckpt = dir.path().join("absent.ckpt");

    let (output, json) = run_quill(&["--checkpoint", ckpt.to_str().unwrap(), "hi"]);
    assert!(!output.status.success());
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to load model"));
}

#[test]
fn prompt_without_known_characters_fails() {
    let dir = tempfile::tempdir().unwrap();
    let ckpt = init_checkpoint(dir.path());

    let (output, json) = run_quill(&["--checkpoint", ckpt.to_str().unwrap(), "XYZ"]);
    assert!(!output.status.success());
    assert!(json["error"].as_str().unwrap().contains("Invalid input"));
}

#[test]
fn generation_failure_is_reported_in_response() {
    let dir = tempfile::tempdir().unwrap();
    let ckpt = dir.path().join("nan.ckpt");

    let vocabulary = Vocabulary::from_corpus("hello");
    let mut model = GptModel::from_seed(&Config::tiny(vocabulary.len()), 0).unwrap();
    model.lm_head.weight.data[0] = f32::NAN;
    Checkpoint::new(vocabulary, model).unwrap().save(&ckpt).unwrap();

    let (output, json) = run_quill(&["--checkpoint", ckpt.to_str().unwrap(), "hello"]);
    assert!(output.status.success());
    let response = json["response"].as_str().unwrap();
    assert!(response.starts_with("Error generating response: non-finite"));
    assert!(!response.contains("Generation failed"));
}
