//! Model and Generation Configuration
//!
//! Architecture hyperparameters are fixed when a model is constructed and are
//! stored alongside the weights in every checkpoint. The generation budget is
//! fixed per [`crate::GenerationDriver`].
//!
//! ## Parameter Count
//!
//! ```text
//! embeddings ≈ (vocab_size + block_size) × n_embd
//! per_layer  ≈ 12 × n_embd²  (3 head projections + output projection + 4× MLP)
//! head       ≈ n_embd × vocab_size
//! ```

use crate::error::{QuillError, Result};
use serde::{Deserialize, Serialize};

/// Model configuration
///
/// # Fields
///
/// - `vocab_size`: Number of characters in the vocabulary
/// - `n_embd`: Hidden width E
/// - `n_heads`: Attention heads per block (must divide `n_embd`)
/// - `n_layers`: Number of transformer blocks
/// - `block_size`: Context window S
/// - `dropout_rate`: Dropout probability, applied in training mode only
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub vocab_size: usize,
    pub n_embd: usize,
    pub n_heads: usize,
    pub n_layers: usize,
    pub block_size: usize,
    pub dropout_rate: f32,
}

impl Default for Config {
    /// The reference architecture. `vocab_size` is zero until a vocabulary is
    /// attached with [`Config::with_vocab_size`].
    fn default() -> Self {
        Self {
            vocab_size: 0,
            n_embd: 384,
            n_heads: 8,
            n_layers: 8,
            block_size: 128,
            dropout_rate: 0.2,
        }
    }
}

impl Config {
    /// Tiny config for tests and smoke runs (~30K parameters with a small vocab)
    pub fn tiny(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            n_embd: 32,
            n_heads: 4,
            n_layers: 2,
            block_size: 16,
            dropout_rate: 0.1,
        }
    }

    /// Small config for quick experiments
    pub fn small(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            n_embd: 128,
            n_heads: 4,
            n_layers: 4,
            block_size: 64,
            dropout_rate: 0.1,
        }
    }

    pub fn with_vocab_size(mut self, vocab_size: usize) -> Self {
        self.vocab_size = vocab_size;
        self
    }

    /// Width of a single attention head (E / n_heads)
    pub fn head_size(&self) -> usize {
        self.n_embd / self.n_heads
    }

    /// Check the construction-time invariants
    ///
    /// Called by [`crate::GptModel::new`] and by the checkpoint loader, so an
    /// invalid architecture never reaches a forward pass.
    pub fn validate(&self) -> Result<()> {
        if self.vocab_size == 0 {
            return Err(QuillError::InvalidConfig("vocab_size must be > 0".into()));
        }
        if self.n_embd == 0 || self.n_heads == 0 || self.n_layers == 0 || self.block_size == 0 {
            return Err(QuillError::InvalidConfig(format!(
                "n_embd, n_heads, n_layers and block_size must all be > 0 (got {}, {}, {}, {})",
                self.n_embd, self.n_heads, self.n_layers, self.block_size
            )));
        }
        if self.n_embd % self.n_heads != 0 {
            return Err(QuillError::InvalidConfig(format!(
                "n_embd ({}) must be divisible by n_heads ({})",
                self.n_embd, self.n_heads
            )));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(QuillError::InvalidConfig(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        if self.checked_count_parameters().is_none()
            || self.block_size.checked_mul(self.block_size).is_none()
        {
            return Err(QuillError::InvalidConfig(format!(
                "sizes overflow the address space: {:?}",
                self
            )));
        }
        Ok(())
    }

    /// Fail unless `other` describes the same architecture
    pub fn ensure_compatible(&self, other: &Config) -> Result<()> {
        if self.vocab_size != other.vocab_size
            || self.n_embd != other.n_embd
            || self.n_heads != other.n_heads
            || self.n_layers != other.n_layers
            || self.block_size != other.block_size
        {
            return Err(QuillError::InvalidConfig(format!(
                "architecture mismatch: expected {:?}, found {:?}",
                self, other
            )));
        }
        Ok(())
    }

    /// Number of learnable parameters a model with this config holds
    ///
    /// Saturates at `usize::MAX`; [`Config::validate`] rejects such configs.
    pub fn count_parameters(&self) -> usize {
        self.checked_count_parameters().unwrap_or(usize::MAX)
    }

    /// Parameter count, or `None` if any tensor size overflows `usize`
    ///
    /// Per block: 3e² (query/key/value over all heads) + e² + e (projection)
    /// + 4e² + 4e (fc1) + 4e² + e (fc2) + 4e (two layer norms).
    pub fn checked_count_parameters(&self) -> Option<usize> {
        let e = self.n_embd;
        let v = self.vocab_size;
        let per_block = e
            .checked_mul(e)?
            .checked_mul(12)?
            .checked_add(e.checked_mul(10)?)?;
        let embeddings = v.checked_add(self.block_size)?.checked_mul(e)?;
        let blocks = self.n_layers.checked_mul(per_block)?;
        let head = e.checked_mul(v)?.checked_add(v)?;
        embeddings
            .checked_add(blocks)?
            .checked_add(e.checked_mul(2)?)?
            .checked_add(head)
    }
}

/// Per-driver generation settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Number of tokens sampled per call; no early stopping
    pub max_new_tokens: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 100,
        }
    }
}
