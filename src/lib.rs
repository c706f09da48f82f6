//! Quill: A Character-Level GPT
//!
//! A small decoder-only transformer written from scratch: causal multi-head
//! self-attention, post-norm transformer blocks and an autoregressive sampling
//! loop, all over a character vocabulary.
//!
//! # Modules
//!
//! - [`tensor`] - Dense `f32` tensors with rayon-parallel ops
//! - [`layers`] - Linear, embedding, layer norm, dropout, attention, blocks
//! - [`model`] - [`GptModel`]: forward pass, loss, generation
//! - [`vocab`] - Character [`Vocabulary`]
//! - [`sampling`] - Softmax and categorical sampling
//! - [`checkpoint`] - Binary model + vocabulary files
//! - [`driver`] - [`GenerationDriver`]: prompt in, response out
//!
//! # Example
//!
//! ```rust
//! use quill::{Config, GenerationConfig, GenerationDriver, GptModel, Vocabulary};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let vocab = Vocabulary::from_corpus("to be or not to be");
//! let model = GptModel::from_seed(&Config::tiny(vocab.len()), 7).unwrap();
//! let driver = GenerationDriver::new(vocab, model, GenerationConfig { max_new_tokens: 10 });
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let response = driver.respond("to be", &mut rng).unwrap();
//! assert!(response.chars().count() <= 10);
//! ```

pub mod checkpoint;
pub mod config;
pub mod driver;
pub mod error;
pub mod layers;
pub mod model;
pub mod sampling;
pub mod tensor;
pub mod vocab;

// Re-export main types for convenience
pub use checkpoint::Checkpoint;
pub use config::{Config, GenerationConfig};
pub use driver::GenerationDriver;
pub use error::{QuillError, Result};
pub use model::{GptModel, LanguageModel};
pub use tensor::Tensor;
pub use vocab::Vocabulary;
