//! Dropout Layer
//!
//! Randomly zeros activations in training mode and scales the survivors by
//! `1 / (1 - rate)`. In inference mode it is the identity, which is what every
//! generation path uses.

use crate::tensor::Tensor;
use rand::{Rng, RngCore};

/// Execution mode threaded through every forward pass
///
/// Training mode carries the random source used for dropout masks, so a seeded
/// generator makes a training-mode pass reproducible.
pub enum Mode<'a> {
    Inference,
    Training(&'a mut dyn RngCore),
}

impl Mode<'_> {
    pub fn is_training(&self) -> bool {
        matches!(self, Mode::Training(_))
    }
}

pub struct Dropout {
    pub rate: f32,
}

impl Dropout {
    /// # Panics
    ///
    /// Panics if `rate` is outside [0, 1)
    pub fn new(rate: f32) -> Self {
        assert!(
            (0.0..1.0).contains(&rate),
            "Dropout rate must be in [0, 1), got {}",
            rate
        );
        Self { rate }
    }

    pub fn forward(&self, x: &Tensor, mode: &mut Mode<'_>) -> Tensor {
        let rng = match mode {
            Mode::Training(rng) if self.rate > 0.0 => rng,
            _ => return x.clone(),
        };

        let scale = 1.0 / (1.0 - self.rate);
        let data = x
            .data
            .iter()
            .map(|&v| {
                if rng.random::<f32>() < self.rate {
                    0.0
                } else {
                    v * scale
                }
            })
            .collect();

        Tensor::new(data, x.shape.clone())
    }
}
