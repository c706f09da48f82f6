//! Position-wise Feed-Forward Block
//!
//! ```text
//! x → Linear(E, 4E) → ReLU → Linear(4E, E) → Dropout → y
//! ```
//!
//! Every `(batch, position)` vector is transformed on its own; nothing here
//! mixes information across positions.

use super::activation::relu;
use super::dropout::{Dropout, Mode};
use super::linear::Linear;
use crate::tensor::Tensor;
use rand::RngCore;

pub struct FeedForward {
    pub fc1: Linear,
    pub fc2: Linear,
    pub dropout: Dropout,
}

impl FeedForward {
    pub fn new(n_embd: usize, dropout_rate: f32, rng: &mut dyn RngCore) -> Self {
        let hidden = n_embd * 4;
        Self {
            fc1: Linear::new(n_embd, hidden, rng),
            fc2: Linear::new(hidden, n_embd, rng),
            dropout: Dropout::new(dropout_rate),
        }
    }

    pub fn forward(&self, x: &Tensor, mode: &mut Mode<'_>) -> Tensor {
        let h = relu(&self.fc1.forward(x));
        let y = self.fc2.forward(&h);
        self.dropout.forward(&y, mode)
    }

    pub fn num_parameters(&self) -> usize {
        self.fc1.num_parameters() + self.fc2.num_parameters()
    }
}
