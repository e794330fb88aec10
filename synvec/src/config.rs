use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::error::{Error, Result};

/// Target used for the antonym cross-entropy term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AntonymTarget {
    /// Treat antonym logits exactly like synonym logits (target 1).
    Positive,
    /// Push antonym logits toward 0.
    Negative,
}

impl AntonymTarget {
    pub fn label(self) -> f32 {
        match self {
            AntonymTarget::Positive => 1.0,
            AntonymTarget::Negative => 0.0,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    about = "Skip-gram word vectors with synonym and antonym signals",
    long_about = None,
    version
)]
pub struct Options {
    /// Training text file
    #[arg(long, value_name = "FILE")]
    pub train_data: Option<PathBuf>,

    /// File of analogies, four tokens per line. embedding 2 - embedding 1 +
    /// embedding 3 should be close to embedding 4.
    #[arg(long, value_name = "FILE")]
    pub eval_data: Option<PathBuf>,

    /// Directory to write the model, vocabulary, tables and summaries to
    #[arg(long, value_name = "DIR")]
    pub save_path: Option<PathBuf>,

    /// Thesaurus file with `syn <word> ...` and `ant <word> ...` lines
    #[arg(long, value_name = "FILE")]
    pub lexicon: Option<PathBuf>,

    /// The embedding dimension size
    #[arg(long, default_value_t = 200)]
    pub embedding_size: usize,

    /// Negative samples per training example
    #[arg(long, default_value_t = 100)]
    pub num_neg_samples: usize,

    /// Number of training examples processed per step (size of a minibatch)
    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    /// Number of concurrent training threads
    #[arg(long, default_value_t = 12)]
    pub concurrent_steps: usize,

    /// Number of words to predict to the left and right of the target word
    #[arg(long, default_value_t = 5)]
    pub window_size: usize,

    /// Minimum number of occurrences for a word to be in the vocabulary
    #[arg(long, default_value_t = 5)]
    pub min_count: u64,

    /// Subsample threshold for word occurrence. Words that appear with
    /// higher frequency are randomly down-sampled; 0 disables it
    #[arg(long = "subsample", default_value_t = 1e-3)]
    pub subsample_threshold: f32,

    /// Minimal number of synonyms a word must have for its synonyms to be used
    #[arg(long, default_value_t = 3)]
    pub syn_threshold: usize,

    /// How many synonyms to keep per word
    #[arg(long, default_value_t = 10)]
    pub num_syns: usize,

    /// Minimal number of antonyms a word must have for its antonyms to be used
    #[arg(long, default_value_t = 1)]
    pub ant_threshold: usize,

    /// How many antonyms to keep per word
    #[arg(long, default_value_t = 3)]
    pub num_ants: usize,

    /// How many context words to keep per word
    #[arg(long, default_value_t = 1000)]
    pub num_ctx: usize,

    /// Number of epochs to train. The learning rate decays linearly to zero
    /// over this many epochs
    #[arg(long, default_value_t = 15)]
    pub epochs_to_train: u64,

    /// Initial learning rate
    #[arg(long, default_value_t = 0.2)]
    pub learning_rate: f32,

    /// Print statistics every N seconds
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub statistics_interval: u64,

    /// Append a training summary line every N seconds
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub summary_interval: u64,

    /// Checkpoint the parameters every N seconds
    #[arg(long, value_name = "N", default_value_t = 600)]
    pub checkpoint_interval: u64,

    /// Seed for table subsampling and training randomness
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Target for the antonym term
    #[arg(long, value_enum, default_value_t = AntonymTarget::Positive)]
    pub antonym_target: AntonymTarget,

    /// Reuse vocabulary and neighbor tables cached under --save-path
    #[arg(long)]
    pub reuse_tables: bool,

    /// Resume from the checkpoint under --save-path
    #[arg(long)]
    pub resume: bool,

    /// Save the resulting vectors in binary mode
    #[arg(long)]
    pub binary: bool,

    /// After training, read words from stdin and print their neighbors
    #[arg(long)]
    pub interactive: bool,
}

/// Validated run configuration. Built once from `Options` and then shared
/// by reference with every component.
#[derive(Debug, Clone)]
pub struct Config {
    pub train_data: PathBuf,
    pub eval_data: PathBuf,
    pub save_path: PathBuf,
    pub lexicon: Option<PathBuf>,
    pub emb_dim: usize,
    pub num_samples: usize,
    pub batch_size: usize,
    pub concurrent_steps: usize,
    pub window_size: usize,
    pub min_count: u64,
    pub subsample: f32,
    pub syn_threshold: usize,
    pub num_syns: usize,
    pub ant_threshold: usize,
    pub num_ants: usize,
    pub num_ctx: usize,
    pub epochs_to_train: u64,
    pub learning_rate: f32,
    pub statistics_interval: Duration,
    pub summary_interval: Duration,
    pub checkpoint_interval: Duration,
    pub seed: u64,
    pub antonym_target: AntonymTarget,
    pub reuse_tables: bool,
    pub resume: bool,
    pub binary: bool,
    pub interactive: bool,
}

fn require(path: Option<PathBuf>, flag: &str) -> Result<PathBuf> {
    path.ok_or_else(|| {
        Error::FatalConfig(format!(
            "--train-data, --eval-data and --save-path must be specified (missing {flag})"
        ))
    })
}

fn positive(value: usize, flag: &str) -> Result<usize> {
    if value == 0 {
        return Err(Error::FatalConfig(format!("{flag} must be at least 1")));
    }
    Ok(value)
}

impl Options {
    pub fn into_config(self) -> Result<Config> {
        let train_data = require(self.train_data, "--train-data")?;
        let eval_data = require(self.eval_data, "--eval-data")?;
        let save_path = require(self.save_path, "--save-path")?;

        if !(self.subsample_threshold >= 0.0) {
            return Err(Error::FatalConfig("--subsample must not be negative".into()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(Error::FatalConfig("--learning-rate must be positive".into()));
        }
        if self.epochs_to_train == 0 {
            return Err(Error::FatalConfig("--epochs-to-train must be at least 1".into()));
        }

        Ok(Config {
            train_data,
            eval_data,
            save_path,
            lexicon: self.lexicon,
            emb_dim: positive(self.embedding_size, "--embedding-size")?,
            num_samples: self.num_neg_samples,
            batch_size: positive(self.batch_size, "--batch-size")?,
            concurrent_steps: positive(self.concurrent_steps, "--concurrent-steps")?,
            window_size: positive(self.window_size, "--window-size")?,
            min_count: self.min_count,
            subsample: self.subsample_threshold,
            syn_threshold: self.syn_threshold,
            num_syns: positive(self.num_syns, "--num-syns")?,
            ant_threshold: self.ant_threshold,
            num_ants: positive(self.num_ants, "--num-ants")?,
            num_ctx: positive(self.num_ctx, "--num-ctx")?,
            epochs_to_train: self.epochs_to_train,
            learning_rate: self.learning_rate,
            statistics_interval: Duration::from_secs(self.statistics_interval),
            summary_interval: Duration::from_secs(self.summary_interval),
            checkpoint_interval: Duration::from_secs(self.checkpoint_interval),
            seed: self.seed,
            antonym_target: self.antonym_target,
            reuse_tables: self.reuse_tables,
            resume: self.resume,
            binary: self.binary,
            interactive: self.interactive,
        })
    }
}

impl Config {
    pub fn vocab_file(&self) -> PathBuf {
        self.save_path.join("vocab.txt")
    }

    pub fn tables_file(&self) -> PathBuf {
        self.save_path.join("neighbors.bin")
    }

    pub fn checkpoint_file(&self) -> PathBuf {
        self.save_path.join("model.ckpt")
    }

    pub fn summary_file(&self) -> PathBuf {
        self.save_path.join("summary.tsv")
    }

    pub fn vectors_file(&self) -> PathBuf {
        self.save_path
            .join(if self.binary { "vectors.bin" } else { "vectors.txt" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Options {
        Options::parse_from(std::iter::once("synvec").chain(args.iter().copied()))
    }

    #[test]
    fn defaults() {
        let config = parse(&["--train-data", "t", "--eval-data", "e", "--save-path", "s"])
            .into_config()
            .unwrap();
        assert_eq!(config.emb_dim, 200);
        assert_eq!(config.num_samples, 100);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.num_syns, 10);
        assert_eq!(config.num_ants, 3);
        assert_eq!(config.num_ctx, 1000);
        assert_eq!(config.antonym_target, AntonymTarget::Positive);
        assert_eq!(config.checkpoint_interval, Duration::from_secs(600));
        assert_eq!(config.vocab_file(), PathBuf::from("s/vocab.txt"));
    }

    #[test]
    fn missing_paths_are_fatal() {
        let err = parse(&["--train-data", "t", "--save-path", "s"])
            .into_config()
            .unwrap_err();
        assert!(matches!(err, Error::FatalConfig(_)), "{err}");
    }

    #[test]
    fn zero_batch_is_fatal() {
        let err = parse(&[
            "--train-data", "t", "--eval-data", "e", "--save-path", "s", "--batch-size", "0",
        ])
        .into_config()
        .unwrap_err();
        assert!(matches!(err, Error::FatalConfig(_)));
    }

    #[test]
    fn antonym_target_flag() {
        let config = parse(&[
            "--train-data", "t", "--eval-data", "e", "--save-path", "s",
            "--antonym-target", "negative",
        ])
        .into_config()
        .unwrap();
        assert_eq!(config.antonym_target.label(), 0.0);
    }
}
