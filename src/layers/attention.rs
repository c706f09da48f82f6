//! Causal Self-Attention
//!
//! ## Scaled Dot-Product Attention
//!
//! ```text
//! Q, K, V = x @ W_q, x @ W_k, x @ W_v          (no bias, each [B, T, H])
//! scores  = (Q @ Kᵀ) / √H                       [B, T, T]
//! weights = softmax(mask(scores))
//! output  = dropout(weights) @ V                [B, T, H]
//! ```
//!
//! ## Causal Masking
//!
//! A lower-triangular `[S, S]` boolean mask is built once per model and shared
//! by every head. Scores at `j > i` become `-inf` before the softmax, so the
//! weight from position `i` to any later position is exactly zero. Sequences
//! shorter than `S` use the top-left `T × T` corner.
//!
//! ## Multi-Head
//!
//! Heads are independent, so in inference mode they run concurrently on the
//! rayon pool. Training mode runs them in order because the dropout generator
//! is a single mutable stream.

use super::dropout::{Dropout, Mode};
use super::linear::Linear;
use crate::tensor::{softmax_in_place, Tensor};
use rand::RngCore;
use rayon::prelude::*;
use std::sync::Arc;

/// Precomputed lower-triangular mask of size `[S, S]`
pub struct CausalMask {
    size: usize,
    allowed: Vec<bool>,
}

impl CausalMask {
    pub fn new(size: usize) -> Self {
        let allowed = (0..size * size)
            .map(|idx| idx % size <= idx / size)
            .collect();
        Self { size, allowed }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether query position `i` may attend to key position `j`
    pub fn is_allowed(&self, i: usize, j: usize) -> bool {
        self.allowed[i * self.size + j]
    }

    /// Mask `[B, T, T]` scores and softmax each row
    ///
    /// # Panics
    ///
    /// Panics if `T` exceeds the mask size
    pub fn masked_softmax(&self, scores: &Tensor) -> Tensor {
        let t = scores.last_dim();
        assert!(
            t <= self.size,
            "Sequence length {} exceeds causal mask size {}",
            t,
            self.size
        );

        let mut data = scores.data.clone();
        data.par_chunks_mut(t.max(1)).enumerate().for_each(|(r, row)| {
            let i = r % t;
            for (j, v) in row.iter_mut().enumerate() {
                if !self.is_allowed(i, j) {
                    *v = f32::NEG_INFINITY;
                }
            }
            softmax_in_place(row);
        });

        Tensor::new(data, scores.shape.clone())
    }
}

/// One attention head
pub struct AttentionHead {
    pub query: Linear,
    pub key: Linear,
    pub value: Linear,
    pub dropout: Dropout,
    pub head_size: usize,
    mask: Arc<CausalMask>,
}

impl AttentionHead {
    pub fn new(
        n_embd: usize,
        head_size: usize,
        dropout_rate: f32,
        mask: Arc<CausalMask>,
        rng: &mut dyn RngCore,
    ) -> Self {
        let query = Linear::without_bias(n_embd, head_size, rng);
        let key = Linear::without_bias(n_embd, head_size, rng);
        let value = Linear::without_bias(n_embd, head_size, rng);
        Self::from_weights(query, key, value, dropout_rate, mask)
    }

    /// Assemble a head from existing projections, all `[E, H]`
    pub fn from_weights(
        query: Linear,
        key: Linear,
        value: Linear,
        dropout_rate: f32,
        mask: Arc<CausalMask>,
    ) -> Self {
        let head_size = query.out_features();
        Self {
            query,
            key,
            value,
            dropout: Dropout::new(dropout_rate),
            head_size,
            mask,
        }
    }

    /// Post-softmax attention weights `[B, T, T]` for input `[B, T, E]`
    ///
    /// Returned before dropout, so this is exactly what inference sees.
    pub fn attention_weights(&self, x: &Tensor) -> Tensor {
        let q = self.query.forward(x);
        let k = self.key.forward(x);
        let scale = 1.0 / (self.head_size as f32).sqrt();
        let scores = q.matmul(&k.transpose(-2, -1)).mul_scalar(scale);
        self.mask.masked_softmax(&scores)
    }

    /// `[B, T, E] -> [B, T, H]`
    pub fn forward(&self, x: &Tensor, mode: &mut Mode<'_>) -> Tensor {
        let weights = self.attention_weights(x);
        let weights = self.dropout.forward(&weights, mode);
        let v = self.value.forward(x);
        weights.matmul(&v)
    }

    pub fn num_parameters(&self) -> usize {
        self.query.num_parameters() + self.key.num_parameters() + self.value.num_parameters()
    }
}

/// Several heads over the same input, concatenated and projected back to E
pub struct MultiHeadAttention {
    pub heads: Vec<AttentionHead>,
    pub proj: Linear,
    pub dropout: Dropout,
}

impl MultiHeadAttention {
    /// The caller guarantees `n_heads` divides `n_embd` (see
    /// [`crate::Config::validate`]).
    pub fn new(
        n_embd: usize,
        n_heads: usize,
        dropout_rate: f32,
        mask: Arc<CausalMask>,
        rng: &mut dyn RngCore,
    ) -> Self {
        let head_size = n_embd / n_heads;
        let heads = (0..n_heads)
            .map(|_| AttentionHead::new(n_embd, head_size, dropout_rate, Arc::clone(&mask), rng))
            .collect();
        Self {
            heads,
            proj: Linear::new(head_size * n_heads, n_embd, rng),
            dropout: Dropout::new(dropout_rate),
        }
    }

    /// `[B, T, E] -> [B, T, E]`
    pub fn forward(&self, x: &Tensor, mode: &mut Mode<'_>) -> Tensor {
        let outputs: Vec<Tensor> = if mode.is_training() {
            self.heads.iter().map(|h| h.forward(x, mode)).collect()
        } else {
            self.heads
                .par_iter()
                .map(|h| h.forward(x, &mut Mode::Inference))
                .collect()
        };

        let merged = Tensor::concat_last(&outputs);
        let projected = self.proj.forward(&merged);
        self.dropout.forward(&projected, mode)
    }

    /// Per-head attention weights, each `[B, T, T]`
    pub fn attention_weights(&self, x: &Tensor) -> Vec<Tensor> {
        self.heads.par_iter().map(|h| h.attention_weights(x)).collect()
    }

    pub fn num_parameters(&self) -> usize {
        self.heads.iter().map(AttentionHead::num_parameters).sum::<usize>()
            + self.proj.num_parameters()
    }
}
