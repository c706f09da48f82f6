//! Linear Layer (Fully Connected)
//!
//! Performs an affine transformation `y = x @ W + b`.
//!
//! ```text
//! Input:  x [*, in_features]
//! Weight: W [in_features, out_features]
//! Bias:   b [out_features]           (optional)
//! Output: y [*, out_features]
//! ```
//!
//! Attention head projections are bias-free; every other linear map in the
//! model carries a bias.
//!
//! ## Initialization
//!
//! Weights are drawn from N(0, 0.02) and biases start at zero. The same
//! normal draw is used for embedding tables.

use crate::tensor::Tensor;
use rand::{Rng, RngCore};
use rand_distr::StandardNormal;

/// Standard deviation of every weight and embedding at construction time
pub const INIT_STD: f32 = 0.02;

/// Draw `size` values from N(0, [`INIT_STD`])
pub fn normal_init(size: usize, rng: &mut dyn RngCore) -> Vec<f32> {
    (0..size)
        .map(|_| {
            let z: f32 = rng.sample(StandardNormal);
            z * INIT_STD
        })
        .collect()
}

/// Linear layer
pub struct Linear {
    /// Weight matrix [in_features, out_features]
    pub weight: Tensor,
    /// Bias vector [out_features], absent for bias-free projections
    pub bias: Option<Tensor>,
}

impl Linear {
    /// Linear layer with a zero-initialized bias
    pub fn new(in_features: usize, out_features: usize, rng: &mut dyn RngCore) -> Self {
        Self {
            weight: Tensor::new(
                normal_init(in_features * out_features, rng),
                vec![in_features, out_features],
            ),
            bias: Some(Tensor::zeros(vec![out_features])),
        }
    }

    /// Linear layer without a bias term
    pub fn without_bias(in_features: usize, out_features: usize, rng: &mut dyn RngCore) -> Self {
        Self {
            weight: Tensor::new(
                normal_init(in_features * out_features, rng),
                vec![in_features, out_features],
            ),
            bias: None,
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape[0]
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape[1]
    }

    /// Forward pass
    ///
    /// Accepts any rank; leading dimensions are flattened for one 2D matmul and
    /// restored afterwards.
    pub fn forward(&self, x: &Tensor) -> Tensor {
        let in_features = self.in_features();
        assert_eq!(
            x.last_dim(),
            in_features,
            "Linear expects last dim {}, got shape {:?}",
            in_features,
            x.shape
        );

        let rows = x.rows();
        let flat = x.reshape(&[rows, in_features]);
        let mut y = flat.matmul(&self.weight);
        if let Some(bias) = &self.bias {
            y = y.add(bias);
        }

        let mut out_shape = x.shape.clone();
        if let Some(last) = out_shape.last_mut() {
            *last = self.out_features();
        }
        y.reshape(&out_shape)
    }

    /// Number of learnable parameters
    pub fn num_parameters(&self) -> usize {
        self.weight.data.len() + self.bias.as_ref().map_or(0, |b| b.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_forward_3d_shape_and_bias() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut layer = Linear::new(4, 3, &mut rng);
        layer.weight = Tensor::zeros(vec![4, 3]);
        layer.bias = Some(Tensor::new(vec![1.0, 2.0, 3.0], vec![3]));

        let x = Tensor::new(vec![0.5; 2 * 5 * 4], vec![2, 5, 4]);
        let y = layer.forward(&x);
        assert_eq!(y.shape, vec![2, 5, 3]);
        assert_eq!(y.row(7), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_init_statistics() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = Linear::without_bias(64, 64, &mut rng);
        assert!(layer.bias.is_none());

        let n = layer.weight.data.len() as f32;
        let mean = layer.weight.data.iter().sum::<f32>() / n;
        let var = layer.weight.data.iter().map(|w| (w - mean).powi(2)).sum::<f32>() / n;
        assert!(mean.abs() < 0.005, "mean {}", mean);
        assert!((var.sqrt() - INIT_STD).abs() < 0.003, "std {}", var.sqrt());
    }

    #[test]
    fn test_bias_starts_at_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        let layer = Linear::new(8, 2, &mut rng);
        assert_eq!(layer.bias.as_ref().map(|b| b.data.clone()), Some(vec![0.0, 0.0]));
        assert_eq!(layer.num_parameters(), 18);
    }
}
