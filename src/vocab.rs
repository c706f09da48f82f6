//! Character Vocabulary
//!
//! A bijection between characters and ids `0..V`. The id of a character is its
//! position in the ordered character list, so that list is stored verbatim in
//! every checkpoint and must never be re-sorted after training.
//!
//! ## Encoding Rules
//!
//! - Characters outside the vocabulary are dropped silently on encode
//! - Ids outside `0..V` are skipped on decode
//!
//! ## Example
//!
//! ```rust
//! use quill::Vocabulary;
//!
//! let vocab = Vocabulary::from_corpus("hello world");
//! let ids = vocab.encode("hold!");
//! assert_eq!(vocab.decode(&ids), "hold");
//! ```

use crate::error::{QuillError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Serialized as the ordered list of characters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<char>", into = "Vec<char>")]
pub struct Vocabulary {
    chars: Vec<char>,
    index: HashMap<char, usize>,
}

impl Vocabulary {
    /// Build from an ordered character list; id `i` is `chars[i]`
    ///
    /// Fails on an empty list or a repeated character.
    pub fn from_chars(chars: Vec<char>) -> Result<Self> {
        if chars.is_empty() {
            return Err(QuillError::EmptyInput("vocabulary has no characters"));
        }

        let mut index = HashMap::with_capacity(chars.len());
        for (id, &c) in chars.iter().enumerate() {
            if index.insert(c, id).is_some() {
                return Err(QuillError::InvalidInput(format!(
                    "duplicate character {:?} in vocabulary",
                    c
                )));
            }
        }

        Ok(Self { chars, index })
    }

    /// Sorted set of the distinct characters in `text`
    ///
    /// An empty `text` yields an empty vocabulary, which cannot back a model.
    pub fn from_corpus(text: &str) -> Self {
        let mut chars: Vec<char> = text.chars().collect();
        chars.sort_unstable();
        chars.dedup();
        let index = chars.iter().enumerate().map(|(id, &c)| (c, id)).collect();
        Self { chars, index }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Characters in id order
    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn id_of(&self, c: char) -> Option<usize> {
        self.index.get(&c).copied()
    }

    /// Text to ids, dropping unknown characters
    pub fn encode(&self, text: &str) -> Vec<usize> {
        text.chars().filter_map(|c| self.id_of(c)).collect()
    }

    /// Ids to text, skipping ids outside the vocabulary
    pub fn decode(&self, ids: &[usize]) -> String {
        ids.iter().filter_map(|&id| self.chars.get(id)).collect()
    }

    /// Save as a JSON array of characters
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl TryFrom<Vec<char>> for Vocabulary {
    type Error = QuillError;

    fn try_from(chars: Vec<char>) -> Result<Self> {
        Self::from_chars(chars)
    }
}

impl From<Vocabulary> for Vec<char> {
    fn from(vocab: Vocabulary) -> Self {
        vocab.chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_corpus_is_sorted_and_unique() {
        let vocab = Vocabulary::from_corpus("banana!");
        assert_eq!(vocab.chars(), &['!', 'a', 'b', 'n']);
        assert_eq!(vocab.len(), 4);
    }

    #[test]
    fn test_round_trip_every_symbol() {
        let vocab = Vocabulary::from_corpus("The quick brown fox, 123\n");
        for &c in vocab.chars() {
            let s = c.to_string();
            assert_eq!(vocab.decode(&vocab.encode(&s)), s);
        }
    }

    #[test]
    fn test_unknown_characters_dropped() {
        let vocab = Vocabulary::from_chars(vec!['a', 'b', 'c']).unwrap();
        assert_eq!(vocab.encode("abXc?"), vec![0, 1, 2]);
        assert!(vocab.encode("xyz").is_empty());
    }

    #[test]
    fn test_decode_skips_out_of_range() {
        let vocab = Vocabulary::from_chars(vec!['a', 'b']).unwrap();
        assert_eq!(vocab.decode(&[0, 7, 1]), "ab");
    }

    #[test]
    fn test_id_assignment_follows_list_order() {
        let vocab = Vocabulary::from_chars(vec!['z', 'a']).unwrap();
        assert_eq!(vocab.encode("az"), vec![1, 0]);
    }

    #[test]
    fn test_duplicates_rejected() {
        assert!(Vocabulary::from_chars(vec!['a', 'a']).is_err());
        assert!(Vocabulary::from_chars(vec![]).is_err());
    }

    #[test]
    fn test_json_is_plain_char_list() {
        let vocab = Vocabulary::from_chars(vec!['x', 'y']).unwrap();
        let json = serde_json::to_string(&vocab).unwrap();
        assert_eq!(json, r#"["x","y"]"#);

        let back: Vocabulary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vocab);
        assert!(serde_json::from_str::<Vocabulary>(r#"["x","x"]"#).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.json");
        let vocab = Vocabulary::from_corpus("to be or not");
        vocab.save(&path).unwrap();
        assert_eq!(Vocabulary::load(&path).unwrap(), vocab);
    }
}
