//! Neural Network Layers
//!
//! Every layer owns its parameters and exposes a `forward` that maps input
//! activations to output activations without mutating itself. Layers that use
//! dropout take a [`Mode`], so inference and training share one code path.
//!
//! ## Layers
//!
//! - **linear**: Affine map, with or without bias
//! - **embedding**: Learnable lookup table (tokens, positions)
//! - **layer_norm**: Per-position normalization over the feature axis
//! - **dropout**: Training-only regularization
//! - **activation**: ReLU
//! - **attention**: Causal mask, single head, multi-head
//! - **feed_forward**: E → 4E → E position-wise transform
//! - **block**: Post-norm transformer block

pub mod activation;
pub mod attention;
pub mod block;
pub mod dropout;
pub mod embedding;
pub mod feed_forward;
pub mod layer_norm;
pub mod linear;

pub use activation::relu;
pub use attention::{AttentionHead, CausalMask, MultiHeadAttention};
pub use block::TransformerBlock;
pub use dropout::{Dropout, Mode};
pub use embedding::Embedding;
pub use feed_forward::FeedForward;
pub use layer_norm::LayerNorm;
pub use linear::{normal_init, Linear, INIT_STD};
