//! Error types shared by every stage of the pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop a run.
///
/// Per-record problems (a malformed analogy line, a lexicon line with an
/// unknown tag, a word without synonyms) never show up here; they are
/// counted where they happen.
#[derive(Debug, Error)]
pub enum Error {
    /// A required path or option is missing or out of range.
    #[error("configuration error: {0}")]
    FatalConfig(String),

    /// The training corpus contains no tokens at all.
    #[error("training corpus is empty")]
    EmptyCorpus,

    /// Every word was filtered out by `min_count`.
    #[error("no word occurs at least {min_count} times in the training corpus")]
    EmptyVocabulary { min_count: u64 },

    /// An input file or persisted artifact does not match what we expect.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// A trainer operation was called in a state that does not allow it.
    #[error("cannot {operation} while the trainer is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
