//! Sampling
//!
//! Turns one row of logits into a token id. The random source is always passed
//! in, so a seeded generator reproduces a generation exactly.

use crate::error::{QuillError, Result};
use crate::tensor::softmax_in_place;
use rand::RngCore;
use rand_distr::{weighted::WeightedIndex, Distribution};

/// Stable softmax of a logit row
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let mut probs = logits.to_vec();
    softmax_in_place(&mut probs);
    probs
}

/// Draw an index from a categorical distribution
///
/// # Errors
///
/// [`QuillError::Generation`] if any probability is NaN, infinite or
/// negative, or if they are all zero. A broken row is never sampled.
pub fn sample_categorical(probs: &[f32], rng: &mut dyn RngCore) -> Result<usize> {
    if let Some(i) = probs.iter().position(|p| !p.is_finite()) {
        return Err(QuillError::Generation(format!(
            "non-finite probability {} at index {}",
            probs[i], i
        )));
    }
    let dist = WeightedIndex::new(probs.iter())
        .map_err(|e| QuillError::Generation(format!("cannot sample next token: {}", e)))?;
    Ok(dist.sample(rng))
}
