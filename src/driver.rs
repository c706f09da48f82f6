//! Prompt-to-Response Driver
//!
//! Runs one request end to end:
//!
//! ```text
//! prompt → encode → keep last S ids → generate → decode → strip echo → trim
//! ```
//!
//! The driver owns a vocabulary and a model handle; nothing is global. Any
//! [`LanguageModel`] works, which is how tests drive it with scripted models.

use crate::config::GenerationConfig;
use crate::error::{QuillError, Result};
use crate::model::LanguageModel;
use crate::vocab::Vocabulary;
use rand::RngCore;

pub struct GenerationDriver<M> {
    vocabulary: Vocabulary,
    model: M,
    config: GenerationConfig,
}

impl<M: LanguageModel> GenerationDriver<M> {
    pub fn new(vocabulary: Vocabulary, model: M, config: GenerationConfig) -> Self {
        Self {
            vocabulary,
            model,
            config,
        }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Produce a response for `prompt`
    ///
    /// # Errors
    ///
    /// - [`QuillError::InvalidInput`] if no prompt character is in the
    ///   vocabulary; the model is not invoked
    /// - [`QuillError::Generation`] wrapping any failure from the model
    pub fn respond(&self, prompt: &str, rng: &mut dyn RngCore) -> Result<String> {
        let mut ids = self.vocabulary.encode(prompt);
        if ids.is_empty() {
            return Err(QuillError::InvalidInput(
                "prompt contains no characters from the vocabulary".into(),
            ));
        }

        let window = self.model.block_size();
        if ids.len() > window {
            log::debug!("Prompt truncated from {} to {} tokens", ids.len(), window);
            ids.drain(..ids.len() - window);
        }

        let output = self
            .model
            .generate(&[ids], self.config.max_new_tokens, rng)
            .map_err(|e| match e {
                QuillError::Generation(_) => e,
                other => QuillError::Generation(other.to_string()),
            })?;
        let tokens = output
            .into_iter()
            .next()
            .ok_or_else(|| QuillError::Generation("model returned no sequences".into()))?;

        let text = self.vocabulary.decode(&tokens);
        let response = text.strip_prefix(prompt).unwrap_or(text.as_str());
        Ok(response.trim().to_string())
    }
}
