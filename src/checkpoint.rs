//! Checkpoints
//!
//! A checkpoint bundles the architecture config, the vocabulary and every
//! weight tensor in one little-endian binary file.
//!
//! ## Layout
//!
//! ```text
//! b"QUILL_CKPT"                      magic
//! u8                                 version (1)
//! u32 len + JSON                     Config
//! u32 len + JSON                     vocabulary, characters in id order
//! tensor                             token embedding
//! tensor                             position embedding
//! u32                                block count
//! per block:
//!   per head: tensor ×3              query, key, value
//!   tensor ×2                        projection weight, bias
//!   tensor ×2                        ln_1 gamma, beta
//!   tensor ×4                        fc1 weight, bias, fc2 weight, bias
//!   tensor ×2                        ln_2 gamma, beta
//! tensor ×2                          final norm gamma, beta
//! tensor ×2                          head weight, bias
//! ```
//!
//! Each tensor is `u32 rank, u32 dims…, u32 element count, f32 data…`.
//!
//! Loading validates every shape against the stored config, so a file written
//! for a different architecture is a load error rather than a silently
//! corrupted model. All load failures surface as
//! [`QuillError::CheckpointLoad`].

use crate::config::Config;
use crate::error::{QuillError, Result};
use crate::layers::{
    AttentionHead, CausalMask, Dropout, Embedding, FeedForward, LayerNorm, Linear,
    MultiHeadAttention, TransformerBlock,
};
use crate::model::GptModel;
use crate::tensor::Tensor;
use crate::vocab::Vocabulary;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

const MAGIC: &[u8; 10] = b"QUILL_CKPT";
const VERSION: u8 = 1;

/// A model together with the vocabulary it was built for
pub struct Checkpoint {
    pub vocabulary: Vocabulary,
    pub model: GptModel,
}

impl Checkpoint {
    /// Pair a vocabulary with a model, checking that their sizes agree
    pub fn new(vocabulary: Vocabulary, model: GptModel) -> Result<Self> {
        if vocabulary.len() != model.config.vocab_size {
            return Err(QuillError::InvalidConfig(format!(
                "vocabulary has {} characters but model expects {}",
                vocabulary.len(),
                model.config.vocab_size
            )));
        }
        Ok(Self { vocabulary, model })
    }

    pub fn config(&self) -> &Config {
        &self.model.config
    }

    pub fn into_parts(self) -> (Vocabulary, GptModel) {
        (self.vocabulary, self.model)
    }

    /// Save checkpoint to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        log::info!("Saving checkpoint to {}", path.display());

        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;

        let size_mb = std::fs::metadata(path)?.len() as f64 / 1_000_000.0;
        log::info!(
            "Checkpoint saved: {:.2} MB, {} parameters",
            size_mb,
            self.model.count_parameters()
        );
        Ok(())
    }

    /// Load checkpoint from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading checkpoint from {}", path.display());

        let file = File::open(path).map_err(|e| {
            QuillError::CheckpointLoad(format!("cannot open {}: {}", path.display(), e))
        })?;
        let checkpoint = Self::read_from(&mut BufReader::new(file)).map_err(|e| match e {
            QuillError::CheckpointLoad(_) => e,
            other => QuillError::CheckpointLoad(other.to_string()),
        })?;

        let config = checkpoint.config();
        log::info!(
            "Loaded model: {} layers, {} heads, n_embd {}, block_size {}, vocab {}",
            config.n_layers,
            config.n_heads,
            config.n_embd,
            config.block_size,
            config.vocab_size
        );
        Ok(checkpoint)
    }

    /// Load, then require the stored architecture to match `expected`
    ///
    /// Dropout is ignored in the comparison; it has no effect on inference.
    pub fn load_expecting<P: AsRef<Path>>(path: P, expected: &Config) -> Result<Self> {
        let checkpoint = Self::load(path)?;
        expected
            .ensure_compatible(checkpoint.config())
            .map_err(|e| QuillError::CheckpointLoad(e.to_string()))?;
        Ok(checkpoint)
    }

    fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(MAGIC)?;
        w.write_all(&[VERSION])?;
        write_json(w, &self.model.config)?;
        write_json(w, &self.vocabulary)?;

        write_tensor(w, &self.model.token_embedding.weight)?;
        write_tensor(w, &self.model.position_embedding.weight)?;
        write_u32(w, self.model.blocks.len())?;
        for block in &self.model.blocks {
            for tensor in block_tensors(block) {
                write_tensor(w, tensor)?;
            }
        }
        write_tensor(w, &self.model.ln_f.gamma)?;
        write_tensor(w, &self.model.ln_f.beta)?;
        write_tensor(w, &self.model.lm_head.weight)?;
        if let Some(bias) = &self.model.lm_head.bias {
            write_tensor(w, bias)?;
        }
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut header = [0u8; 10];
        r.read_exact(&mut header)?;
        if &header != MAGIC {
            return Err(QuillError::CheckpointLoad(
                "invalid checkpoint header, expected QUILL_CKPT".into(),
            ));
        }

        let mut version = [0u8; 1];
        r.read_exact(&mut version)?;
        if version[0] != VERSION {
            return Err(QuillError::CheckpointLoad(format!(
                "unsupported checkpoint version: {}",
                version[0]
            )));
        }

        let config: Config = read_json(r)?;
        let vocabulary: Vocabulary = read_json(r)?;

        // Every size below is derived from the config, so it must be sane
        // before the first tensor is read
        config.validate()?;
        if vocabulary.len() != config.vocab_size {
            return Err(QuillError::CheckpointLoad(format!(
                "vocabulary has {} characters but config says {}",
                vocabulary.len(),
                config.vocab_size
            )));
        }

        let e = config.n_embd;
        let v = config.vocab_size;
        let token = read_tensor(r, &[v, e], "token embedding")?;
        let position = read_tensor(r, &[config.block_size, e], "position embedding")?;

        let num_blocks = read_u32(r)?;
        if num_blocks != config.n_layers {
            return Err(QuillError::CheckpointLoad(format!(
                "checkpoint has {} blocks but config says {}",
                num_blocks, config.n_layers
            )));
        }
        let mut block_weights = Vec::new();
        for i in 0..num_blocks {
            block_weights.push(read_block_tensors(r, &config, i)?);
        }

        let ln_f_gamma = read_tensor(r, &[e], "final norm gamma")?;
        let ln_f_beta = read_tensor(r, &[e], "final norm beta")?;
        let head_weight = read_tensor(r, &[e, v], "head weight")?;
        let head_bias = read_tensor(r, &[v], "head bias")?;

        let mut trailing = [0u8; 1];
        if r.read(&mut trailing)? != 0 {
            return Err(QuillError::CheckpointLoad(
                "unexpected trailing data after last tensor".into(),
            ));
        }

        let mask = Arc::new(CausalMask::new(config.block_size));
        let blocks = block_weights
            .into_iter()
            .map(|tensors| assemble_block(tensors, &config, &mask))
            .collect::<Result<Vec<_>>>()?;

        let model = GptModel {
            config,
            token_embedding: Embedding { weight: token },
            position_embedding: Embedding { weight: position },
            blocks,
            ln_f: LayerNorm::from_params(ln_f_gamma, ln_f_beta),
            lm_head: Linear {
                weight: head_weight,
                bias: Some(head_bias),
            },
        };
        Self::new(vocabulary, model)
    }
}

/// Parameters of one block in file order
fn block_tensors(block: &TransformerBlock) -> Vec<&Tensor> {
    let mut tensors = Vec::new();
    for head in &block.attn.heads {
        tensors.extend([&head.query.weight, &head.key.weight, &head.value.weight]);
    }
    tensors.push(&block.attn.proj.weight);
    tensors.extend(block.attn.proj.bias.as_ref());
    tensors.extend([&block.ln1.gamma, &block.ln1.beta]);
    tensors.push(&block.ff.fc1.weight);
    tensors.extend(block.ff.fc1.bias.as_ref());
    tensors.push(&block.ff.fc2.weight);
    tensors.extend(block.ff.fc2.bias.as_ref());
    tensors.extend([&block.ln2.gamma, &block.ln2.beta]);
    tensors
}

/// Read one block's parameters in the order [`block_tensors`] writes them
fn read_block_tensors<R: Read>(r: &mut R, config: &Config, index: usize) -> Result<Vec<Tensor>> {
    let e = config.n_embd;
    let name = format!("block {}", index);

    let mut tensors = Vec::new();
    for _ in 0..config.n_heads * 3 {
        tensors.push(read_tensor(r, &[e, config.head_size()], &name)?);
    }
    let rest: [&[usize]; 10] = [
        &[e, e],
        &[e],
        &[e],
        &[e],
        &[e, 4 * e],
        &[4 * e],
        &[4 * e, e],
        &[e],
        &[e],
        &[e],
    ];
    for shape in rest {
        tensors.push(read_tensor(r, shape, &name)?);
    }
    Ok(tensors)
}

fn assemble_block(
    tensors: Vec<Tensor>,
    config: &Config,
    mask: &Arc<CausalMask>,
) -> Result<TransformerBlock> {
    let mut it = tensors.into_iter();
    let mut next = || {
        it.next()
            .ok_or_else(|| QuillError::CheckpointLoad("block is missing tensors".into()))
    };
    let linear = |weight: Tensor, bias: Option<Tensor>| Linear { weight, bias };

    let mut heads = Vec::new();
    for _ in 0..config.n_heads {
        let query = linear(next()?, None);
        let key = linear(next()?, None);
        let value = linear(next()?, None);
        heads.push(AttentionHead::from_weights(
            query,
            key,
            value,
            config.dropout_rate,
            Arc::clone(mask),
        ));
    }
    let proj = linear(next()?, Some(next()?));
    let ln1 = LayerNorm::from_params(next()?, next()?);
    let fc1 = linear(next()?, Some(next()?));
    let fc2 = linear(next()?, Some(next()?));
    let ln2 = LayerNorm::from_params(next()?, next()?);

    Ok(TransformerBlock {
        attn: MultiHeadAttention {
            heads,
            proj,
            dropout: Dropout::new(config.dropout_rate),
        },
        ln1,
        ff: FeedForward {
            fc1,
            fc2,
            dropout: Dropout::new(config.dropout_rate),
        },
        ln2,
    })
}

fn write_u32<W: Write>(w: &mut W, value: usize) -> io::Result<()> {
    w.write_all(&(value as u32).to_le_bytes())
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<usize> {
    let mut bytes = [0u8; 4];
    r.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes) as usize)
}

fn write_json<W: Write, T: serde::Serialize>(w: &mut W, value: &T) -> Result<()> {
    let json = serde_json::to_vec(value)?;
    write_u32(w, json.len())?;
    w.write_all(&json)?;
    Ok(())
}

fn read_json<R: Read, T: serde::de::DeserializeOwned>(r: &mut R) -> Result<T> {
    let len = read_u32(r)?;
    let bytes = read_bytes(r, len)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Read exactly `len` bytes, growing the buffer only as data arrives
fn read_bytes<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    r.take(len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != len {
        return Err(QuillError::CheckpointLoad(format!(
            "checkpoint truncated: expected {} more bytes, found {}",
            len,
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn write_tensor<W: Write>(w: &mut W, tensor: &Tensor) -> io::Result<()> {
    write_u32(w, tensor.shape.len())?;
    for &dim in &tensor.shape {
        write_u32(w, dim)?;
    }
    write_u32(w, tensor.data.len())?;
    for &val in &tensor.data {
        w.write_all(&val.to_le_bytes())?;
    }
    Ok(())
}

/// Read one tensor whose shape must equal `expected`
fn read_tensor<R: Read>(r: &mut R, expected: &[usize], name: &str) -> Result<Tensor> {
    let rank = read_u32(r)?;
    if rank != expected.len() {
        return Err(QuillError::CheckpointLoad(format!(
            "{}: expected rank {}, found {}",
            name,
            expected.len(),
            rank
        )));
    }

    let mut shape = Vec::with_capacity(rank);
    for _ in 0..rank {
        shape.push(read_u32(r)?);
    }
    if shape != expected {
        return Err(QuillError::CheckpointLoad(format!(
            "{}: expected shape {:?}, found {:?}",
            name, expected, shape
        )));
    }

    let len = read_u32(r)?;
    let expected_len: usize = expected.iter().product();
    if len != expected_len {
        return Err(QuillError::CheckpointLoad(format!(
            "{}: expected {} values, found {}",
            name, expected_len, len
        )));
    }

    let byte_len = len
        .checked_mul(4)
        .ok_or_else(|| QuillError::CheckpointLoad(format!("{}: tensor too large", name)))?;
    let bytes = read_bytes(r, byte_len)?;
    let data = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(Tensor::new(data, shape))
}
