//! Embedding Tables
//!
//! A learnable lookup table: row `i` of the `[num_embeddings, n_embd]` weight
//! is the vector for index `i`. The model keeps two of these, one keyed by
//! token id and one keyed by position.

use super::linear::normal_init;
use crate::tensor::Tensor;
use rand::RngCore;

pub struct Embedding {
    /// Embedding weight matrix [num_embeddings, n_embd]
    pub weight: Tensor,
}

impl Embedding {
    /// Table initialized from N(0, 0.02)
    pub fn new(num_embeddings: usize, n_embd: usize, rng: &mut dyn RngCore) -> Self {
        Self {
            weight: Tensor::new(
                normal_init(num_embeddings * n_embd, rng),
                vec![num_embeddings, n_embd],
            ),
        }
    }

    pub fn num_embeddings(&self) -> usize {
        self.weight.shape[0]
    }

    pub fn n_embd(&self) -> usize {
        self.weight.shape[1]
    }

    /// Look up a rectangular batch of indices
    ///
    /// ```text
    /// Input:  [batch, seq_len]  (indices)
    /// Output: [batch, seq_len, n_embd]
    /// ```
    ///
    /// Indices are range-checked by the caller; an out-of-range index panics.
    pub fn forward(&self, ids: &[Vec<usize>]) -> Tensor {
        let batch_size = ids.len();
        let seq_len = ids.first().map_or(0, Vec::len);
        let n_embd = self.n_embd();

        let mut output = Vec::with_capacity(batch_size * seq_len * n_embd);
        for row in ids {
            for &id in row {
                output.extend_from_slice(self.weight.row(id));
            }
        }

        Tensor::new(output, vec![batch_size, seq_len, n_embd])
    }

    /// Rows `0..len` as a `[len, n_embd]` tensor (position embeddings)
    pub fn prefix(&self, len: usize) -> Tensor {
        let n_embd = self.n_embd();
        Tensor::new(self.weight.data[..len * n_embd].to_vec(), vec![len, n_embd])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_copies_rows() {
        let emb = Embedding {
            weight: Tensor::new((0..6).map(|i| i as f32).collect(), vec![3, 2]),
        };
        let out = emb.forward(&[vec![2, 0], vec![1, 1]]);
        assert_eq!(out.shape, vec![2, 2, 2]);
        assert_eq!(out.data, vec![4.0, 5.0, 0.0, 1.0, 2.0, 3.0, 2.0, 3.0]);
        assert_eq!(emb.prefix(2).data, vec![0.0, 1.0, 2.0, 3.0]);
    }
}
