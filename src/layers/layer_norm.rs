//! Layer Normalization
//!
//! Normalizes every `(batch, position)` feature vector on its own, then applies
//! a learned scale (gamma) and shift (beta). Statistics never cross the batch
//! or sequence axes.
//!
//! ```text
//! 1. mean = sum(x) / N
//! 2. var = sum((x - mean)²) / N
//! 3. x_norm = (x - mean) / √(var + ε)
//! 4. y = γ * x_norm + β
//! ```

use crate::tensor::Tensor;
use rayon::prelude::*;

pub struct LayerNorm {
    /// Scale parameter [n_embd]
    pub gamma: Tensor,
    /// Shift parameter [n_embd]
    pub beta: Tensor,
    pub eps: f32,
}

impl LayerNorm {
    /// gamma = 1, beta = 0, eps = 1e-5
    pub fn new(n_embd: usize) -> Self {
        Self::from_params(
            Tensor::new(vec![1.0; n_embd], vec![n_embd]),
            Tensor::zeros(vec![n_embd]),
        )
    }

    /// Wrap stored scale and shift parameters
    pub fn from_params(gamma: Tensor, beta: Tensor) -> Self {
        Self {
            gamma,
            beta,
            eps: 1e-5,
        }
    }

    /// Normalize over the last axis, one row per rayon task
    pub fn forward(&self, x: &Tensor) -> Tensor {
        let n = self.gamma.data.len();
        assert_eq!(
            x.last_dim(),
            n,
            "LayerNorm expects last dim {}, got shape {:?}",
            n,
            x.shape
        );

        let mut out = x.data.clone();
        out.par_chunks_mut(n).for_each(|row| {
            let mean = row.iter().sum::<f32>() / n as f32;
            let var = row.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n as f32;
            let inv_std = 1.0 / (var + self.eps).sqrt();
            for ((v, g), b) in row.iter_mut().zip(&self.gamma.data).zip(&self.beta.data) {
                *v = (*v - mean) * inv_std * g + b;
            }
        });

        Tensor::new(out, x.shape.clone())
    }

    pub fn num_parameters(&self) -> usize {
        self.gamma.data.len() + self.beta.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_normalized_independently() {
        let ln = LayerNorm::new(4);
        // Second row is the first scaled by 100; both normalize identically
        let x = Tensor::new(
            vec![1.0, 2.0, 3.0, 4.0, 100.0, 200.0, 300.0, 400.0],
            vec![1, 2, 4],
        );
        let y = ln.forward(&x);
        for r in 0..2 {
            let row = y.row(r);
            let mean: f32 = row.iter().sum::<f32>() / 4.0;
            let var: f32 = row.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 4.0;
            assert!(mean.abs() < 1e-5);
            assert!((var - 1.0).abs() < 1e-3);
        }
        for (a, b) in y.row(0).iter().zip(y.row(1)) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_scale_and_shift() {
        let mut ln = LayerNorm::new(2);
        ln.gamma = Tensor::new(vec![2.0, 2.0], vec![2]);
        ln.beta = Tensor::new(vec![1.0, 1.0], vec![2]);
        let y = ln.forward(&Tensor::new(vec![-1.0, 1.0], vec![1, 2]));
        assert!((y.data[0] - -1.0).abs() < 1e-3);
        assert!((y.data[1] - 3.0).abs() < 1e-3);
    }
}
