//! Dense Tensors
//!
//! A deliberately small tensor type: a flat row-major `Vec<f32>` plus shape and
//! strides. It carries exactly the operations the transformer needs.
//!
//! ## Example
//!
//! ```rust
//! use quill::Tensor;
//!
//! let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
//! let b = Tensor::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], vec![3, 2]);
//! let c = a.matmul(&b);
//! assert_eq!(c.shape, vec![2, 2]);
//! ```
//!
//! ## Parallelism
//!
//! Matmul row blocks, batched matmul, element-wise ops and per-row softmax run
//! on the rayon pool. Shape errors are programming errors and panic; callers at
//! the model boundary validate user-provided shapes first.

use rayon::prelude::*;

/// A multi-dimensional `f32` array in row-major layout
///
/// For shape `[2, 3]` the data is stored as
/// `[r0c0, r0c1, r0c2, r1c0, r1c1, r1c2]` with strides `[3, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Flat storage of all tensor elements
    pub data: Vec<f32>,
    /// Dimensions
    pub shape: Vec<usize>,
    /// Step sizes for each dimension (computed from shape)
    pub strides: Vec<usize>,
}

impl Tensor {
    /// Create a tensor from flat data and a shape
    ///
    /// # Panics
    ///
    /// Panics if the product of the shape doesn't equal the data length
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        let expected_size: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_size,
            "Data length ({}) doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_size
        );

        let strides = Self::compute_strides(&shape);
        Self {
            data,
            shape,
            strides,
        }
    }

    /// Create a tensor filled with zeros
    pub fn zeros(shape: Vec<usize>) -> Self {
        let size: usize = shape.iter().product();
        Self::new(vec![0.0; size], shape)
    }

    /// For shape `[d0, d1, d2]`, strides are `[d1*d2, d2, 1]`
    fn compute_strides(shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    /// Size of the last dimension
    pub fn last_dim(&self) -> usize {
        self.shape.last().copied().unwrap_or(1)
    }

    /// Number of rows when viewed as `[*, last_dim]`
    pub fn rows(&self) -> usize {
        let cols = self.last_dim();
        if cols == 0 {
            0
        } else {
            self.data.len() / cols
        }
    }

    // Written so LLVM auto-vectorizes the innermost loop.
    #[inline(always)]
    fn axpy(a_val: f32, b: &[f32], result: &mut [f32]) {
        for (r, &b_val) in result.iter_mut().zip(b.iter()) {
            *r += a_val * b_val;
        }
    }

    /// Matrix multiplication
    ///
    /// Supports:
    /// - 2D × 2D: `[m, k] @ [k, n] -> [m, n]`
    /// - 3D × 3D: batched, `[b, m, k] @ [b, k, n] -> [b, m, n]`; each batch
    ///   entry is an independent product computed in parallel. Attention uses
    ///   this for `Q @ Kᵀ` and `weights @ V`.
    ///
    /// # Panics
    ///
    /// Panics if inner dimensions disagree or the ranks are unsupported
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        if self.shape.len() == 2 && other.shape.len() == 2 {
            assert_eq!(
                self.shape[1], other.shape[0],
                "Matrix dimensions incompatible: [{}, {}] @ [{}, {}]",
                self.shape[0], self.shape[1], other.shape[0], other.shape[1]
            );

            let m = self.shape[0];
            let n = other.shape[1];
            let k = self.shape[1];

            // Parallel overhead only pays off past ~1K multiply-adds
            if m * n * k >= 1_000 {
                return self.matmul_parallel_blocked(other, m, n, k);
            }

            let mut result = vec![0.0; m * n];
            for i in 0..m {
                let row = &mut result[i * n..(i + 1) * n];
                for l in 0..k {
                    Self::axpy(self.data[i * k + l], &other.data[l * n..(l + 1) * n], row);
                }
            }
            return Tensor::new(result, vec![m, n]);
        }

        if self.shape.len() == 3 && other.shape.len() == 3 {
            let batch = self.shape[0];
            let m = self.shape[1];
            let k = self.shape[2];
            let n = other.shape[2];

            assert_eq!(other.shape[0], batch, "Batch dimensions must match for batched matmul");
            assert_eq!(other.shape[1], k, "Inner dimensions must match for batched matmul");

            let mut result = vec![0.0; batch * m * n];
            result
                .par_chunks_mut((m * n).max(1))
                .enumerate()
                .for_each(|(b, chunk)| {
                    let a = &self.data[b * m * k..(b + 1) * m * k];
                    let bm = &other.data[b * k * n..(b + 1) * k * n];
                    for i in 0..m {
                        let row = &mut chunk[i * n..(i + 1) * n];
                        for l in 0..k {
                            Self::axpy(a[i * k + l], &bm[l * n..(l + 1) * n], row);
                        }
                    }
                });

            return Tensor::new(result, vec![batch, m, n]);
        }

        panic!(
            "Unsupported matmul shapes: {:?} @ {:?}",
            self.shape, other.shape
        );
    }

    /// Parallel cache-blocked matrix multiplication
    ///
    /// Output rows are split into 8-row blocks distributed over the rayon pool;
    /// inside a block, 8×8 tiles keep the working set in L1.
    fn matmul_parallel_blocked(&self, other: &Tensor, m: usize, n: usize, k: usize) -> Tensor {
        const BLOCK_SIZE: usize = 8;

        let mut result = vec![0.0; m * n];
        if n == 0 {
            return Tensor::new(result, vec![m, n]);
        }

        result
            .par_chunks_mut(BLOCK_SIZE * n)
            .enumerate()
            .for_each(|(block_i, result_block)| {
                let i_start = block_i * BLOCK_SIZE;
                let i_end = (i_start + BLOCK_SIZE).min(m);

                for j_start in (0..n).step_by(BLOCK_SIZE) {
                    let j_end = (j_start + BLOCK_SIZE).min(n);

                    for k_start in (0..k).step_by(BLOCK_SIZE) {
                        let k_end = (k_start + BLOCK_SIZE).min(k);

                        for i in i_start..i_end {
                            let row_offset = (i - i_start) * n;
                            for k_idx in k_start..k_end {
                                Self::axpy(
                                    self.data[i * k + k_idx],
                                    &other.data[k_idx * n + j_start..k_idx * n + j_end],
                                    &mut result_block[row_offset + j_start..row_offset + j_end],
                                );
                            }
                        }
                    }
                }
            });

        Tensor::new(result, vec![m, n])
    }

    /// Softmax over the last axis
    ///
    /// Uses the numerically stable form
    ///
    /// ```text
    /// softmax(x)[i] = exp(x[i] - max(x)) / sum(exp(x[j] - max(x)))
    /// ```
    ///
    /// Entries equal to `-inf` come out as exactly `0.0`. Rows are processed in
    /// parallel.
    ///
    /// ```rust
    /// # use quill::Tensor;
    /// let t = Tensor::new(vec![1.0, 2.0, 3.0, f32::NEG_INFINITY], vec![1, 4]);
    /// let p = t.softmax();
    /// assert!((p.data.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    /// assert_eq!(p.data[3], 0.0);
    /// ```
    pub fn softmax(&self) -> Tensor {
        let cols = self.last_dim();
        let mut result = self.data.clone();
        if cols == 0 {
            return Tensor::new(result, self.shape.clone());
        }

        result.par_chunks_mut(cols).for_each(softmax_in_place);
        Tensor::new(result, self.shape.clone())
    }

    /// Element-wise addition with broadcasting
    ///
    /// Supported patterns:
    ///
    /// 1. **Exact match**: same shape
    /// 2. **Broadcast batch**: `[batch, seq, dim] + [seq, dim]` (position embeddings)
    /// 3. **Broadcast last dim**: `[*, n] + [n]` (bias)
    pub fn add(&self, other: &Tensor) -> Tensor {
        if self.shape == other.shape {
            let result = self
                .data
                .par_iter()
                .zip(&other.data)
                .map(|(a, b)| a + b)
                .collect();
            return Tensor::new(result, self.shape.clone());
        }

        if self.shape.len() == 3 && other.shape.len() == 2 {
            let seq_len = self.shape[1];
            let dim = self.shape[2];

            assert_eq!(
                other.shape,
                vec![seq_len, dim],
                "Broadcast add needs [seq, dim] = [{}, {}]",
                seq_len,
                dim
            );

            let plane = seq_len * dim;
            let result: Vec<f32> = self
                .data
                .par_iter()
                .enumerate()
                .map(|(i, &x)| x + other.data[i % plane])
                .collect();
            return Tensor::new(result, self.shape.clone());
        }

        if other.shape.len() == 1 && other.shape[0] == self.last_dim() {
            let last_dim = self.last_dim();
            let result: Vec<f32> = self
                .data
                .par_iter()
                .enumerate()
                .map(|(i, &x)| x + other.data[i % last_dim])
                .collect();
            return Tensor::new(result, self.shape.clone());
        }

        panic!(
            "Unsupported broadcast for add: {:?} + {:?}",
            self.shape, other.shape
        );
    }

    /// Multiply all elements by a scalar
    pub fn mul_scalar(&self, scalar: f32) -> Tensor {
        let result = self.data.par_iter().map(|&x| x * scalar).collect();
        Tensor::new(result, self.shape.clone())
    }

    /// Apply `f` to every element
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        let result = self.data.par_iter().map(|&x| f(x)).collect();
        Tensor::new(result, self.shape.clone())
    }

    /// Reshape to a shape with the same element count
    pub fn reshape(&self, new_shape: &[usize]) -> Tensor {
        let new_size: usize = new_shape.iter().product();
        assert_eq!(
            self.data.len(),
            new_size,
            "Cannot reshape {:?} to {:?}: element count mismatch",
            self.shape,
            new_shape
        );
        Tensor::new(self.data.clone(), new_shape.to_vec())
    }

    /// Swap two dimensions (negative indices count from the end)
    ///
    /// ```rust
    /// # use quill::Tensor;
    /// let t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
    /// let tt = t.transpose(0, 1);
    /// assert_eq!(tt.shape, vec![3, 2]);
    /// assert_eq!(tt.data, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    /// ```
    pub fn transpose(&self, dim1: isize, dim2: isize) -> Tensor {
        let ndim = self.shape.len() as isize;
        let d1 = if dim1 < 0 { ndim + dim1 } else { dim1 } as usize;
        let d2 = if dim2 < 0 { ndim + dim2 } else { dim2 } as usize;

        let mut new_shape = self.shape.clone();
        new_shape.swap(d1, d2);

        // Walk the output in order, reading the input through swapped strides
        let mut read_strides = self.strides.clone();
        read_strides.swap(d1, d2);
        let out_strides = Self::compute_strides(&new_shape);

        let result: Vec<f32> = (0..self.data.len())
            .into_par_iter()
            .map(|i| {
                let mut remaining = i;
                let mut src = 0;
                for (dim, &stride) in out_strides.iter().enumerate() {
                    let coord = remaining / stride;
                    remaining %= stride;
                    src += coord * read_strides[dim];
                }
                self.data[src]
            })
            .collect();

        Tensor::new(result, new_shape)
    }

    /// Concatenate tensors along the last axis
    ///
    /// All inputs must agree on every dimension except the last. Used to merge
    /// attention heads: `n × [B, T, H] -> [B, T, n·H]`.
    pub fn concat_last(parts: &[Tensor]) -> Tensor {
        assert!(!parts.is_empty(), "Cannot concatenate zero tensors");
        let lead = &parts[0].shape[..parts[0].shape.len() - 1];
        for p in parts {
            assert_eq!(
                &p.shape[..p.shape.len() - 1],
                lead,
                "Leading dimensions must match for concat"
            );
        }

        let rows = parts[0].rows();
        let widths: Vec<usize> = parts.iter().map(|p| p.last_dim()).collect();
        let total: usize = widths.iter().sum();

        let mut result = Vec::with_capacity(rows * total);
        for r in 0..rows {
            for (p, &w) in parts.iter().zip(&widths) {
                result.extend_from_slice(&p.data[r * w..(r + 1) * w]);
            }
        }

        let mut shape = lead.to_vec();
        shape.push(total);
        Tensor::new(result, shape)
    }

    /// Row `index` of the view `[*, last_dim]`
    pub fn row(&self, index: usize) -> &[f32] {
        let cols = self.last_dim();
        &self.data[index * cols..(index + 1) * cols]
    }
}

/// Stable softmax of one row, in place
pub(crate) fn softmax_in_place(row: &mut [f32]) {
    let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    if max == f32::NEG_INFINITY {
        // Fully masked row: nothing to normalize against
        row.iter_mut().for_each(|x| *x = 0.0);
        return;
    }
    let mut sum = 0.0;
    for x in row.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }
    for x in row.iter_mut() {
        *x /= sum;
    }
}
