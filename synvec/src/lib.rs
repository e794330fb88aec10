//! Word vectors trained with a skip-gram objective, plus auxiliary losses
//! that pull each word toward the contexts of its synonyms and antonyms.

pub mod analogy;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod lexicon;
pub mod nearby;
pub mod neighbors;
pub mod params;
pub mod sampler;
pub mod stream;
pub mod trainer;
pub mod vectors;
pub mod vocab;

pub use analogy::{AnalogyReport, AnalogySet};
pub use config::{Config, Options};
pub use error::{Error, Result};
pub use lexicon::{LexicalResource, Thesaurus};
pub use neighbors::NeighborTables;
pub use stream::{SkipGramStream, TrainingStream};
pub use trainer::{Trainer, TrainerState};
pub use vectors::{dot, norm, normalize, Vectors};
pub use vocab::Vocab;
