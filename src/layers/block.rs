//! Transformer Block
//!
//! Attention and feed-forward sub-layers, each wrapped in a residual add that
//! is normalized afterwards (post-norm):
//!
//! ```text
//! x'  = LayerNorm₁(x  + MultiHeadAttention(x))
//! x'' = LayerNorm₂(x' + FeedForward(x'))
//! ```

use super::attention::{CausalMask, MultiHeadAttention};
use super::dropout::Mode;
use super::feed_forward::FeedForward;
use super::layer_norm::LayerNorm;
use crate::tensor::Tensor;
use rand::RngCore;
use std::sync::Arc;

pub struct TransformerBlock {
    pub attn: MultiHeadAttention,
    pub ln1: LayerNorm,
    pub ff: FeedForward,
    pub ln2: LayerNorm,
}

impl TransformerBlock {
    pub fn new(
        n_embd: usize,
        n_heads: usize,
        dropout_rate: f32,
        mask: Arc<CausalMask>,
        rng: &mut dyn RngCore,
    ) -> Self {
        Self {
            attn: MultiHeadAttention::new(n_embd, n_heads, dropout_rate, mask, rng),
            ln1: LayerNorm::new(n_embd),
            ff: FeedForward::new(n_embd, dropout_rate, rng),
            ln2: LayerNorm::new(n_embd),
        }
    }

    pub fn forward(&self, x: &Tensor, mode: &mut Mode<'_>) -> Tensor {
        let x = self.ln1.forward(&x.add(&self.attn.forward(x, mode)));
        self.ln2.forward(&x.add(&self.ff.forward(&x, mode)))
    }

    pub fn num_parameters(&self) -> usize {
        self.attn.num_parameters()
            + self.ln1.num_parameters()
            + self.ff.num_parameters()
            + self.ln2.num_parameters()
    }
}
