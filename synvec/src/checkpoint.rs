use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Everything needed to continue training: the parameters and how far the
/// stream had got.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub vocab_size: usize,
    pub dim: usize,
    pub global_step: u64,
    pub epoch: u64,
    pub words_processed: u64,
    /// `vocab_size × dim` input embeddings, row-major.
    pub emb: Vec<f32>,
    /// `vocab_size × dim` output projection weights, row-major.
    pub w: Vec<f32>,
    /// `vocab_size` output biases.
    pub b: Vec<f32>,
}

impl Checkpoint {
    /// Write the checkpoint to a temporary file next to `path`, then rename
    /// it into place, so a crash never leaves a half-written checkpoint.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("tmp");
        {
            let mut fo = BufWriter::new(File::create(&tmp)?);
            bincode::serialize_into(&mut fo, self)?;
            fo.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let fin = BufReader::new(File::open(path)?);
        let checkpoint: Checkpoint = bincode::deserialize_from(fin)?;
        checkpoint.validate(checkpoint.vocab_size, checkpoint.dim)?;
        Ok(checkpoint)
    }

    /// Check that the checkpoint fits a model with `vocab_size` words of
    /// `dim` dimensions.
    pub fn validate(&self, vocab_size: usize, dim: usize) -> Result<()> {
        if self.vocab_size != vocab_size || self.dim != dim {
            return Err(Error::DataIntegrity(format!(
                "checkpoint is for {} words × {} dimensions, model has {vocab_size} × {dim}",
                self.vocab_size, self.dim
            )));
        }
        let matrix = vocab_size.checked_mul(dim).ok_or_else(|| {
            Error::DataIntegrity(format!(
                "checkpoint shape {vocab_size} × {dim} is too large"
            ))
        })?;
        if self.emb.len() != matrix || self.w.len() != matrix || self.b.len() != vocab_size {
            return Err(Error::DataIntegrity(format!(
                "checkpoint parameters have the wrong shape: emb {}, w {}, b {} values",
                self.emb.len(),
                self.w.len(),
                self.b.len()
            )));
        }
        Ok(())
    }
}
