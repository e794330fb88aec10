//! Fixed-width neighbor tables: for every vocabulary word, a row of context
//! words, synonyms or antonyms.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::lexicon::LexicalResource;
use crate::vocab::Vocab;

/// Marks an empty slot in a table row. Never a valid word id.
pub const SENTINEL: i32 = -1;

pub const CONTEXT: &str = "context";
pub const SYNONYMS: &str = "syn";
pub const ANTONYMS: &str = "ant";

/// `rows[id * width..][..width]` holds the neighbors of word `id`, padded
/// with `SENTINEL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborTable {
    width: usize,
    rows: Vec<i32>,
}

/// Fit a set of neighbor ids into exactly `width` slots.
///
/// Larger sets are subsampled uniformly without replacement; the survivors
/// keep their relative order. Smaller sets are right-padded with `SENTINEL`.
pub fn fit_row<R: Rng + ?Sized>(neighbors: &[usize], width: usize, rng: &mut R) -> Vec<i32> {
    let mut row: Vec<i32> = if neighbors.len() > width {
        let mut picked = rand::seq::index::sample(rng, neighbors.len(), width).into_vec();
        picked.sort_unstable();
        picked.into_iter().map(|i| neighbors[i] as i32).collect()
    } else {
        neighbors.iter().map(|&id| id as i32).collect()
    };
    row.resize(width, SENTINEL);
    row
}

impl NeighborTable {
    pub fn from_sets<R: Rng + ?Sized>(sets: &[BTreeSet<usize>], width: usize, rng: &mut R) -> Self {
        let mut rows = Vec::with_capacity(sets.len() * width);
        for set in sets {
            let neighbors: Vec<usize> = set.iter().copied().collect();
            rows.extend(fit_row(&neighbors, width, rng));
        }
        NeighborTable { width, rows }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows, i.e. the vocabulary size.
    pub fn len(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.rows.len() / self.width
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, id: usize) -> &[i32] {
        &self.rows[id * self.width..][..self.width]
    }

    /// The non-sentinel entries of row `id`.
    pub fn valid(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        self.row(id)
            .iter()
            .filter(|&&n| n != SENTINEL)
            .map(|&n| n as usize)
    }

    pub fn has_neighbors(&self, id: usize) -> bool {
        self.valid(id).next().is_some()
    }

    fn log_summary(&self, relation: &str) {
        let sizes: Vec<usize> = (0..self.len()).map(|id| self.valid(id).count()).collect();
        let nonempty = sizes.iter().filter(|&&n| n > 0).count();
        let mean = sizes.iter().sum::<usize>() as f64 / sizes.len().max(1) as f64;
        let max = sizes.iter().copied().max().unwrap_or(0);
        info!(relation, width = self.width, nonempty, mean, max, "built neighbor table");
    }
}

/// Every in-vocabulary token within `window` positions of an occurrence of
/// a word, for every word.
pub fn context_sets(corpus: &[u32], vocab_size: usize, window: usize) -> Vec<BTreeSet<usize>> {
    let mut sets = vec![BTreeSet::new(); vocab_size];
    for (i, &word) in corpus.iter().enumerate() {
        if word == 0 {
            continue;
        }
        let start = i.saturating_sub(window);
        let stop = (i + window + 1).min(corpus.len());
        for j in start..stop {
            if j != i && corpus[j] != 0 {
                sets[word as usize].insert(corpus[j] as usize);
            }
        }
    }
    sets
}

fn known(vocab: &Vocab, word: &str) -> Option<usize> {
    vocab.id(word).filter(|&id| id != 0)
}

fn progress_bar(len: usize, relation: &str) -> ProgressBar {
    let style = ProgressStyle::with_template("{msg:>8} [{bar:40}] {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    ProgressBar::new(len as u64)
        .with_style(style)
        .with_message(relation.to_string())
}

/// In-vocabulary synonyms of every word.
pub fn synonym_sets(vocab: &Vocab, lexicon: &dyn LexicalResource) -> Vec<BTreeSet<usize>> {
    let pb = progress_bar(vocab.len(), SYNONYMS);
    let sets = (0..vocab.len())
        .map(|id| {
            pb.inc(1);
            if id == 0 {
                return BTreeSet::new();
            }
            lexicon
                .synonyms(vocab.word(id))
                .iter()
                .filter_map(|s| known(vocab, s))
                .filter(|&s| s != id)
                .collect()
        })
        .collect();
    pb.finish_and_clear();
    sets
}

/// In-vocabulary antonyms of every word, plus the in-vocabulary synonyms of
/// each of those antonyms.
pub fn antonym_sets(vocab: &Vocab, lexicon: &dyn LexicalResource) -> Vec<BTreeSet<usize>> {
    let pb = progress_bar(vocab.len(), ANTONYMS);
    let sets = (0..vocab.len())
        .map(|id| {
            pb.inc(1);
            let mut set = BTreeSet::new();
            if id == 0 {
                return set;
            }
            for antonym in lexicon.antonyms(vocab.word(id)) {
                set.extend(known(vocab, &antonym));
                set.extend(
                    lexicon
                        .synonyms(&antonym)
                        .iter()
                        .filter_map(|s| known(vocab, s)),
                );
            }
            set.remove(&id);
            set
        })
        .collect();
    pb.finish_and_clear();
    sets
}

/// Word-keyed neighbor lists for each relation; this is what gets cached on
/// disk between runs.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborSets {
    relations: HashMap<String, HashMap<String, Vec<String>>>,
}

impl NeighborSets {
    pub fn build(
        vocab: &Vocab,
        corpus: &[u32],
        window: usize,
        lexicon: &dyn LexicalResource,
    ) -> Self {
        let mut sets = NeighborSets::default();
        sets.insert(vocab, CONTEXT, &context_sets(corpus, vocab.len(), window));
        sets.insert(vocab, SYNONYMS, &synonym_sets(vocab, lexicon));
        sets.insert(vocab, ANTONYMS, &antonym_sets(vocab, lexicon));
        sets
    }

    fn insert(&mut self, vocab: &Vocab, relation: &str, sets: &[BTreeSet<usize>]) {
        let by_word = sets
            .iter()
            .enumerate()
            .filter(|(_, set)| !set.is_empty())
            .map(|(id, set)| {
                let neighbors = set.iter().map(|&n| vocab.word(n).to_string()).collect();
                (vocab.word(id).to_string(), neighbors)
            })
            .collect();
        self.relations.insert(relation.to_string(), by_word);
    }

    pub fn relation(&self, relation: &str) -> Option<&HashMap<String, Vec<String>>> {
        self.relations.get(relation)
    }

    /// Id-keyed sets for `relation` under `vocab`. Words and neighbors that
    /// aren't in `vocab` are dropped; sets smaller than `threshold` are
    /// emptied.
    pub fn id_sets(&self, vocab: &Vocab, relation: &str, threshold: usize) -> Vec<BTreeSet<usize>> {
        let mut sets = vec![BTreeSet::new(); vocab.len()];
        if let Some(by_word) = self.relations.get(relation) {
            for (word, neighbors) in by_word {
                let Some(id) = known(vocab, word) else { continue };
                let set: BTreeSet<usize> = neighbors
                    .iter()
                    .filter_map(|n| known(vocab, n))
                    .filter(|&n| n != id)
                    .collect();
                if set.len() >= threshold {
                    sets[id] = set;
                }
            }
        }
        sets
    }

    pub fn to_tables(&self, vocab: &Vocab, config: &Config) -> NeighborTables {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let context = NeighborTable::from_sets(
            &self.id_sets(vocab, CONTEXT, 0),
            config.num_ctx,
            &mut rng,
        );
        let synonyms = NeighborTable::from_sets(
            &self.id_sets(vocab, SYNONYMS, config.syn_threshold),
            config.num_syns,
            &mut rng,
        );
        let antonyms = NeighborTable::from_sets(
            &self.id_sets(vocab, ANTONYMS, config.ant_threshold),
            config.num_ants,
            &mut rng,
        );
        context.log_summary(CONTEXT);
        synonyms.log_summary(SYNONYMS);
        antonyms.log_summary(ANTONYMS);
        NeighborTables {
            context,
            synonyms,
            antonyms,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut fo = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut fo, self)?;
        fo.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let fin = BufReader::new(File::open(path)?);
        Ok(bincode::deserialize_from(fin)?)
    }
}

/// The three tables the trainer reads. Read-only once built.
#[derive(Debug, Clone)]
pub struct NeighborTables {
    pub context: NeighborTable,
    pub synonyms: NeighborTable,
    pub antonyms: NeighborTable,
}

impl NeighborTables {
    /// Build the tables for `vocab`, or reuse the ones cached under
    /// `config.save_path` when `config.reuse_tables` is set.
    pub fn prepare(
        config: &Config,
        vocab: &Vocab,
        corpus: &[u32],
        lexicon: &dyn LexicalResource,
    ) -> Result<Self> {
        let cache = config.tables_file();
        let sets = if config.reuse_tables && cache.exists() {
            info!("reusing neighbor sets from {}", cache.display());
            NeighborSets::load(&cache)?
        } else {
            let sets = NeighborSets::build(vocab, corpus, config.window_size, lexicon);
            fs::create_dir_all(&config.save_path)?;
            sets.save(&cache)?;
            sets
        };
        Ok(sets.to_tables(vocab, config))
    }
}
