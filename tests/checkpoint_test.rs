//! Checkpoint save/load through the filesystem

use quill::{Checkpoint, Config, GptModel, QuillError, Vocabulary};
use std::fs;

fn saved_checkpoint(dir: &tempfile::TempDir) -> (std::path::PathBuf, Checkpoint) {
    let vocabulary = Vocabulary::from_corpus("First Citizen: Before we proceed any further");
    let model = GptModel::from_seed(&Config::tiny(vocabulary.len()), 21).unwrap();
    let checkpoint = Checkpoint::new(vocabulary, model).unwrap();

    let path = dir.path().join("model.ckpt");
    checkpoint.save(&path).unwrap();
    (path, checkpoint)
}

/// Magic, version, then the given config and vocabulary JSON with no tensors
fn header_only(config: &str, vocab: &str) -> Vec<u8> {
    let mut bytes = b"QUILL_CKPT".to_vec();
    bytes.push(1);
    for json in [config, vocab] {
        bytes.extend_from_slice(&(json.len() as u32).to_le_bytes());
        bytes.extend_from_slice(json.as_bytes());
    }
    bytes
}

fn load_error(path: &std::path::Path) -> QuillError {
    match Checkpoint::load(path) {
        Ok(_) => panic!("checkpoint at {} should not load", path.display()),
        Err(e) => e,
    }
}

#[test]
fn round_trip_preserves_logits_and_vocabulary() {
    let dir = tempfile::tempdir().unwrap();
    let (path, original) = saved_checkpoint(&dir);
    let loaded = Checkpoint::load(&path).unwrap();

    assert_eq!(loaded.vocabulary, original.vocabulary);
    assert_eq!(loaded.config(), original.config());

    let idx = vec![original.vocabulary.encode("Before we")];
    let (a, _) = original.model.forward(&idx, None).unwrap();
    let (b, _) = loaded.model.forward(&idx, None).unwrap();
    assert_eq!(a, b);
}

#[test]
fn missing_file_is_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_error(&dir.path().join("nope.ckpt"));
    assert!(matches!(err, QuillError::CheckpointLoad(_)));
}

#[test]
fn truncated_file_is_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = saved_checkpoint(&dir);
    let bytes = fs::read(&path).unwrap();

    for cut in [5, 20, bytes.len() / 2, bytes.len() - 1] {
        fs::write(&path, &bytes[..cut]).unwrap();
        assert!(matches!(load_error(&path), QuillError::CheckpointLoad(_)));
    }
}

#[test]
fn corrupted_config_is_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = saved_checkpoint(&dir);
    let mut bytes = fs::read(&path).unwrap();
    // First byte of the config JSON (after magic, version, length)
    bytes[15] = b'#';
    fs::write(&path, &bytes).unwrap();
    assert!(matches!(load_error(&path), QuillError::CheckpointLoad(_)));
}

#[test]
fn unexpected_architecture_is_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let (path, original) = saved_checkpoint(&dir);

    let mut expected = original.config().clone();
    assert!(Checkpoint::load_expecting(&path, &expected).is_ok());

    expected.n_layers += 1;
    match Checkpoint::load_expecting(&path, &expected) {
        Err(QuillError::CheckpointLoad(msg)) => assert!(msg.contains("mismatch")),
        _ => panic!("architecture mismatch should fail to load"),
    }
}

#[test]
fn error_message_names_load_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.ckpt");
    fs::write(&path, b"definitely not a checkpoint").unwrap();
    assert!(load_error(&path).to_string().starts_with("Failed to load model"));
}

#[test]
fn oversized_config_is_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge.ckpt");

    let cases = [
        // Vocabulary disagrees with the config and the sizes overflow
        r#"{"vocab_size":1099511627776,"n_embd":1073741824,"n_heads":1,"n_layers":1,"block_size":1073741824,"dropout_rate":0.0}"#,
        // Vocabulary agrees but the parameter count overflows
        r#"{"vocab_size":2,"n_embd":1099511627776,"n_heads":1,"n_layers":1,"block_size":4,"dropout_rate":0.0}"#,
        // Representable but enormous, with no tensor data behind it
        r#"{"vocab_size":2,"n_embd":1048576,"n_heads":1,"n_layers":1,"block_size":1048576,"dropout_rate":0.0}"#,
    ];
    for config in cases {
        fs::write(&path, header_only(config, r#"["a","b"]"#)).unwrap();
        assert!(matches!(load_error(&path), QuillError::CheckpointLoad(_)));
    }
}

#[test]
fn vocabulary_size_must_match_stored_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mismatch.ckpt");
    let config = serde_json::to_string(&Config::tiny(3)).unwrap();
    fs::write(&path, header_only(&config, r#"["a","b"]"#)).unwrap();

    match load_error(&path) {
        QuillError::CheckpointLoad(msg) => assert!(msg.contains("vocabulary has 2")),
        other => panic!("expected CheckpointLoad, got {:?}", other),
    }
}
