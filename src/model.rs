//! Character-Level GPT
//!
//! A decoder-only transformer over a character vocabulary.
//!
//! ## Architecture Overview
//!
//! ```text
//! Input tokens [batch, seq_len]
//!     ↓
//! Token Embedding [batch, seq_len, n_embd]
//!     + Position Embedding [seq_len, n_embd]
//!     ↓
//! Transformer Block 1 (post-norm attention + feed-forward)
//!     ↓
//!     ...
//!     ↓
//! Transformer Block N
//!     ↓
//! Layer Norm
//!     ↓
//! Linear → [batch, seq_len, vocab_size]
//! ```
//!
//! ## Generation
//!
//! [`GptModel::generate`] extends a context one token at a time. Each step
//! looks at only the last `block_size` tokens, takes the logits at the final
//! position, and samples from their softmax with the caller's random source.
//!
//! ## Example
//!
//! ```rust
//! use quill::{Config, GptModel};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let model = GptModel::from_seed(&Config::tiny(8), 1234).unwrap();
//! let mut rng = StdRng::seed_from_u64(0);
//! let out = model.generate(&[vec![0, 1, 2]], 5, &mut rng).unwrap();
//! assert_eq!(out[0].len(), 8);
//! ```

use crate::config::Config;
use crate::error::{QuillError, Result};
use crate::layers::{CausalMask, Embedding, LayerNorm, Linear, Mode, TransformerBlock};
use crate::sampling::{sample_categorical, softmax};
use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::Arc;
use std::time::Instant;

//
// ============================================================================
// LANGUAGE MODEL CONTRACT
// ============================================================================
//

/// Anything that can extend token sequences autoregressively
///
/// [`crate::GenerationDriver`] works against this trait, so a wrapper around a
/// different model, or a scripted mock in tests, can stand in for
/// [`GptModel`].
pub trait LanguageModel {
    /// Longest window the model attends over
    fn block_size(&self) -> usize;

    /// Append exactly `max_new_tokens` sampled ids to every row of `context`
    fn generate(
        &self,
        context: &[Vec<usize>],
        max_new_tokens: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Vec<usize>>>;
}

//
// ============================================================================
// GPT MODEL
// ============================================================================
//

pub struct GptModel {
    pub config: Config,
    pub token_embedding: Embedding,
    pub position_embedding: Embedding,
    pub blocks: Vec<TransformerBlock>,
    pub ln_f: LayerNorm,
    pub lm_head: Linear,
}

impl GptModel {
    /// Build a freshly initialized model
    ///
    /// Every linear weight and both embedding tables are drawn from
    /// N(0, 0.02) using `rng`; biases start at zero, layer norms at identity.
    /// The config is validated first, so a bad architecture fails here and
    /// never at forward time.
    pub fn new(config: &Config, rng: &mut dyn RngCore) -> Result<Self> {
        config.validate()?;

        let mask = Arc::new(CausalMask::new(config.block_size));
        let token_embedding = Embedding::new(config.vocab_size, config.n_embd, rng);
        let position_embedding = Embedding::new(config.block_size, config.n_embd, rng);
        let blocks = (0..config.n_layers)
            .map(|_| {
                TransformerBlock::new(
                    config.n_embd,
                    config.n_heads,
                    config.dropout_rate,
                    Arc::clone(&mask),
                    rng,
                )
            })
            .collect();

        let model = Self {
            config: config.clone(),
            token_embedding,
            position_embedding,
            blocks,
            ln_f: LayerNorm::new(config.n_embd),
            lm_head: Linear::new(config.n_embd, config.vocab_size, rng),
        };

        log::info!(
            "Initialized model: {} layers, {} heads, n_embd {}, block_size {}, vocab {} ({} parameters)",
            config.n_layers,
            config.n_heads,
            config.n_embd,
            config.block_size,
            config.vocab_size,
            model.count_parameters()
        );
        Ok(model)
    }

    /// [`GptModel::new`] with a seeded [`StdRng`]
    pub fn from_seed(config: &Config, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new(config, &mut rng)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Inference-mode forward pass
    ///
    /// # Arguments
    ///
    /// * `idx` - Token ids `[B, T]`, rectangular, `1 ≤ T ≤ block_size`
    /// * `targets` - Optional next-token ids of the same shape
    ///
    /// # Returns
    ///
    /// Logits `[B, T, vocab_size]`, plus the mean cross-entropy when targets
    /// are given.
    pub fn forward(
        &self,
        idx: &[Vec<usize>],
        targets: Option<&[Vec<usize>]>,
    ) -> Result<(Tensor, Option<f32>)> {
        self.forward_with_mode(idx, targets, &mut Mode::Inference)
    }

    /// Training-mode forward pass: dropout is active and drawn from `rng`
    pub fn forward_train(
        &self,
        idx: &[Vec<usize>],
        targets: Option<&[Vec<usize>]>,
        rng: &mut dyn RngCore,
    ) -> Result<(Tensor, Option<f32>)> {
        self.forward_with_mode(idx, targets, &mut Mode::Training(rng))
    }

    fn forward_with_mode(
        &self,
        idx: &[Vec<usize>],
        targets: Option<&[Vec<usize>]>,
        mode: &mut Mode<'_>,
    ) -> Result<(Tensor, Option<f32>)> {
        let start = Instant::now();
        let (batch, seq_len) = self.check_ids(idx)?;

        let mut x = self.embed(idx, seq_len);
        for block in &self.blocks {
            x = block.forward(&x, mode);
        }
        let logits = self.lm_head.forward(&self.ln_f.forward(&x));

        let loss = match targets {
            Some(targets) => {
                let (tb, tt) = self.check_ids(targets)?;
                if (tb, tt) != (batch, seq_len) {
                    return Err(QuillError::ShapeMismatch {
                        expected: vec![batch, seq_len],
                        actual: vec![tb, tt],
                    });
                }
                Some(cross_entropy(&logits, targets))
            }
            None => None,
        };

        log::debug!(
            "[perf] forward B={} T={}: {:.2}ms",
            batch,
            seq_len,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok((logits, loss))
    }

    /// Token plus position embeddings, `[B, T, E]`
    fn embed(&self, idx: &[Vec<usize>], seq_len: usize) -> Tensor {
        let tok = self.token_embedding.forward(idx);
        tok.add(&self.position_embedding.prefix(seq_len))
    }

    /// Validate a `[B, T]` id batch against the architecture
    fn check_ids(&self, idx: &[Vec<usize>]) -> Result<(usize, usize)> {
        let first = idx.first().ok_or(QuillError::EmptyInput("batch has no sequences"))?;
        let seq_len = first.len();
        if seq_len == 0 {
            return Err(QuillError::EmptyInput("sequence has no tokens"));
        }
        if let Some(row) = idx.iter().find(|row| row.len() != seq_len) {
            return Err(QuillError::ShapeMismatch {
                expected: vec![idx.len(), seq_len],
                actual: vec![idx.len(), row.len()],
            });
        }
        if seq_len > self.config.block_size {
            return Err(QuillError::SequenceLengthExceeded {
                max: self.config.block_size,
                actual: seq_len,
            });
        }
        let vocab_size = self.config.vocab_size;
        if let Some(&id) = idx.iter().flatten().find(|&&id| id >= vocab_size) {
            return Err(QuillError::TokenOutOfRange { id, vocab_size });
        }
        Ok((idx.len(), seq_len))
    }

    /// Logits at the last position of each row, `[B, V]`
    ///
    /// Rows longer than `block_size` are cut from the left first, so only the
    /// most recent window influences the result.
    pub fn next_token_logits(&self, context: &[Vec<usize>]) -> Result<Tensor> {
        let window = self.config.block_size;
        let cropped: Vec<Vec<usize>> = context
            .iter()
            .map(|row| row[row.len().saturating_sub(window)..].to_vec())
            .collect();

        let (logits, _) = self.forward(&cropped, None)?;
        let batch = logits.shape[0];
        let seq_len = logits.shape[1];
        let vocab = logits.shape[2];

        let mut last = Vec::with_capacity(batch * vocab);
        for b in 0..batch {
            last.extend_from_slice(logits.row(b * seq_len + seq_len - 1));
        }
        Ok(Tensor::new(last, vec![batch, vocab]))
    }

    /// Autoregressive sampling
    ///
    /// Runs exactly `max_new_tokens` steps with no early stopping. Each row is
    /// sampled independently. Returns the prompt followed by the new tokens.
    pub fn generate(
        &self,
        context: &[Vec<usize>],
        max_new_tokens: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Vec<usize>>> {
        let start = Instant::now();
        let mut context = context.to_vec();

        for step in 0..max_new_tokens {
            let logits = self.next_token_logits(&context)?;
            for (b, row) in context.iter_mut().enumerate() {
                let probs = softmax(logits.row(b));
                let next = sample_categorical(&probs, rng)?;
                log::trace!("step {} row {}: sampled token {}", step, b, next);
                row.push(next);
            }
        }

        log::debug!(
            "[perf] generate {} tokens x {} rows: {:.2}ms",
            max_new_tokens,
            context.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(context)
    }

    /// Attention weights for every layer and head
    ///
    /// Returns `maps[layer][head]`, each `[B, T, T]`, computed in inference
    /// mode on the input each block actually sees.
    pub fn attention_maps(&self, idx: &[Vec<usize>]) -> Result<Vec<Vec<Tensor>>> {
        let (_, seq_len) = self.check_ids(idx)?;

        let mut x = self.embed(idx, seq_len);
        let mut maps = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            maps.push(block.attn.attention_weights(&x));
            x = block.forward(&x, &mut Mode::Inference);
        }
        Ok(maps)
    }

    /// Count learnable parameters
    pub fn count_parameters(&self) -> usize {
        self.token_embedding.weight.data.len()
            + self.position_embedding.weight.data.len()
            + self.blocks.iter().map(TransformerBlock::num_parameters).sum::<usize>()
            + self.ln_f.num_parameters()
            + self.lm_head.num_parameters()
    }
}

impl LanguageModel for GptModel {
    fn block_size(&self) -> usize {
        self.config.block_size
    }

    fn generate(
        &self,
        context: &[Vec<usize>],
        max_new_tokens: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Vec<usize>>> {
        GptModel::generate(self, context, max_new_tokens, rng)
    }
}

/// Mean cross-entropy of `[B, T, V]` logits against `[B, T]` targets
///
/// Computed with log-sum-exp over each flattened `[B·T, V]` row. Targets are
/// range-checked by the caller.
pub fn cross_entropy(logits: &Tensor, targets: &[Vec<usize>]) -> f32 {
    let flat: Vec<usize> = targets.iter().flatten().copied().collect();
    if flat.is_empty() {
        return 0.0;
    }

    let total: f32 = flat
        .iter()
        .enumerate()
        .map(|(r, &target)| {
            let row = logits.row(r);
            let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            let log_sum = row.iter().map(|&v| (v - max).exp()).sum::<f32>().ln() + max;
            log_sum - row[target]
        })
        .sum();

    total / flat.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_model(vocab: usize) -> GptModel {
        GptModel::from_seed(&Config::tiny(vocab), 42).unwrap()
    }

    #[test]
    fn test_forward_shape() {
        let model = tiny_model(10);
        let (logits, loss) = model.forward(&[vec![1, 2, 3], vec![4, 5, 6]], None).unwrap();
        assert_eq!(logits.shape, vec![2, 3, 10]);
        assert!(loss.is_none());
    }

    #[test]
    fn test_parameter_count_matches_config() {
        let config = Config::tiny(13);
        let model = GptModel::from_seed(&config, 0).unwrap();
        assert_eq!(model.count_parameters(), config.count_parameters());
    }

    #[test]
    fn test_invalid_config_fails_at_construction() {
        let mut config = Config::tiny(10);
        config.n_heads = 5;
        assert!(matches!(
            GptModel::from_seed(&config, 0),
            Err(QuillError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_bad_input() {
        let model = tiny_model(10);
        let too_long = vec![vec![0; model.config.block_size + 1]];
        assert!(matches!(
            model.forward(&too_long, None),
            Err(QuillError::SequenceLengthExceeded { .. })
        ));
        assert!(matches!(
            model.forward(&[vec![0, 10]], None),
            Err(QuillError::TokenOutOfRange { id: 10, vocab_size: 10 })
        ));
        assert!(matches!(
            model.forward(&[vec![0, 1], vec![2]], None),
            Err(QuillError::ShapeMismatch { .. })
        ));
        assert!(matches!(model.forward(&[], None), Err(QuillError::EmptyInput(_))));
        assert!(matches!(model.forward(&[vec![]], None), Err(QuillError::EmptyInput(_))));
    }

    #[test]
    fn test_loss_near_uniform_at_init() {
        let model = tiny_model(16);
        let idx = vec![vec![0, 1, 2, 3, 4, 5, 6, 7]];
        let targets = vec![vec![1, 2, 3, 4, 5, 6, 7, 8]];
        let (_, loss) = model.forward(&idx, Some(&targets)).unwrap();
        let loss = loss.unwrap();
        // Small init weights give near-uniform predictions: ln(16) ≈ 2.77
        assert!((loss - (16.0f32).ln()).abs() < 0.5, "loss {}", loss);
    }

    #[test]
    fn test_targets_shape_must_match() {
        let model = tiny_model(10);
        let result = model.forward(&[vec![0, 1, 2]], Some(&[vec![1, 2]]));
        assert!(matches!(result, Err(QuillError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_cross_entropy_known_value() {
        // Uniform logits over 4 classes: loss is ln 4
        let logits = Tensor::zeros(vec![1, 2, 4]);
        let loss = cross_entropy(&logits, &[vec![0, 3]]);
        assert!((loss - 4.0f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_training_mode_differs_but_inference_is_stable() {
        let mut config = Config::tiny(10);
        config.dropout_rate = 0.5;
        let model = GptModel::from_seed(&config, 1).unwrap();
        let idx = vec![vec![1, 2, 3, 4]];

        let (a, _) = model.forward(&idx, None).unwrap();
        let (b, _) = model.forward(&idx, None).unwrap();
        assert_eq!(a, b);

        let mut rng = StdRng::seed_from_u64(9);
        let (c, _) = model.forward_train(&idx, None, &mut rng).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_attention_maps_cover_every_layer_and_head() {
        let model = tiny_model(10);
        let maps = model.attention_maps(&[vec![1, 2, 3, 4, 5]]).unwrap();
        assert_eq!(maps.len(), model.config.n_layers);
        for layer in &maps {
            assert_eq!(layer.len(), model.config.n_heads);
            for head in layer {
                assert_eq!(head.shape, vec![1, 5, 5]);
                for i in 0..5 {
                    for j in (i + 1)..5 {
                        assert_eq!(head.row(i)[j], 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_next_token_logits_crops_left() {
        let model = tiny_model(10);
        let s = model.config.block_size;
        let long: Vec<usize> = (0..s + 5).map(|i| i % 10).collect();
        let window = long[5..].to_vec();
        let a = model.next_token_logits(&[long]).unwrap();
        let b = model.next_token_logits(&[window]).unwrap();
        assert_eq!(a.shape, vec![1, 10]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_generate_zero_tokens_returns_context() {
        let model = tiny_model(10);
        let mut rng = StdRng::seed_from_u64(0);
        let out = model.generate(&[vec![3, 1, 4]], 0, &mut rng).unwrap();
        assert_eq!(out, vec![vec![3, 1, 4]]);
    }

    #[test]
    fn test_nan_weight_fails_generation() {
        let mut model = tiny_model(6);
        model.lm_head.weight.data[0] = f32::NAN;
        let mut rng = StdRng::seed_from_u64(0);
        let err = model.generate(&[vec![0, 1]], 3, &mut rng).unwrap_err();
        assert!(matches!(err, QuillError::Generation(_)));
    }
}
