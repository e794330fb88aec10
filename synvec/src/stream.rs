//! The skip-gram example stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::vocab::Vocab;

/// A minibatch of `(example, label)` pairs; `examples[i]` predicts
/// `labels[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub examples: Vec<usize>,
    pub labels: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

/// An endless source of training pairs, shared by all training threads.
pub trait TrainingStream: Sync {
    /// Fill `batch` with exactly `batch_size` pairs. A batch may straddle an
    /// epoch boundary.
    fn next_batch(&self, batch_size: usize, batch: &mut Batch);

    /// Number of complete passes over the corpus so far.
    fn current_epoch(&self) -> u64;

    /// Corpus positions visited so far, over all epochs.
    fn words_processed(&self) -> u64;

    /// Corpus positions in one epoch.
    fn words_per_epoch(&self) -> u64;

    /// Continue from a saved position, as if `words_processed` positions
    /// had already been visited in `epoch` complete passes.
    fn resume(&self, epoch: u64, words_processed: u64);
}

#[derive(Debug)]
struct Cursor {
    /// Next corpus position to use as a center word.
    next: usize,
    /// Current center word position.
    center: usize,
    /// Remaining label positions for the current center word.
    label_pos: usize,
    label_limit: usize,
    rng: StdRng,
}

/// Slides a randomly shrunk window over the corpus, discarding frequent
/// words at random.
#[derive(Debug)]
pub struct SkipGramStream {
    corpus: Vec<u32>,
    /// Probability of keeping each vocabulary word as a center word.
    keep: Vec<f32>,
    window: usize,
    cursor: Mutex<Cursor>,
    epoch: AtomicU64,
    words: AtomicU64,
}

/// Probability that a word seen `count` times survives subsampling.
pub fn keep_probability(count: u64, subsample: f32, corpus_len: u64) -> f32 {
    if subsample <= 0.0 || count == 0 {
        return 1.0;
    }
    let f = count as f32;
    let k = subsample * corpus_len as f32;
    ((f / k).sqrt() + 1.0) * k / f
}

impl SkipGramStream {
    pub fn new(corpus: Vec<u32>, vocab: &Vocab, config: &Config) -> Result<Self> {
        let window = config.window_size;
        let trainable = corpus.iter().enumerate().any(|(i, &w)| {
            let start = i.saturating_sub(window);
            let stop = (i + window + 1).min(corpus.len());
            w != 0 && (start..stop).any(|j| j != i && corpus[j] != 0)
        });
        if !trainable {
            return Err(Error::DataIntegrity(
                "training corpus has no pair of known words within the window".into(),
            ));
        }
        let keep = vocab
            .counts()
            .map(|c| keep_probability(c, config.subsample, vocab.corpus_len()))
            .collect();
        Ok(SkipGramStream {
            corpus,
            keep,
            window,
            cursor: Mutex::new(Cursor {
                next: 0,
                center: 0,
                label_pos: 0,
                label_limit: 0,
                rng: StdRng::seed_from_u64(config.seed),
            }),
            epoch: AtomicU64::new(0),
            words: AtomicU64::new(0),
        })
    }

    pub fn corpus_len(&self) -> usize {
        self.corpus.len()
    }

    /// Move the cursor to the next center word that survives subsampling.
    fn advance(&self, cursor: &mut Cursor) {
        loop {
            if cursor.next == self.corpus.len() {
                cursor.next = 0;
                self.epoch.fetch_add(1, Ordering::Release);
            }
            let pos = cursor.next;
            cursor.next += 1;
            self.words.fetch_add(1, Ordering::Relaxed);

            let word = self.corpus[pos] as usize;
            if word == 0 {
                continue;
            }
            if cursor.rng.gen::<f32>() > self.keep[word] {
                continue;
            }
            let skip = cursor.rng.gen_range(1..=self.window);
            cursor.center = pos;
            cursor.label_pos = pos.saturating_sub(skip);
            cursor.label_limit = (pos + skip + 1).min(self.corpus.len());
            return;
        }
    }

    fn next_pair(&self, cursor: &mut Cursor) -> (usize, usize) {
        loop {
            while cursor.label_pos < cursor.label_limit {
                let j = cursor.label_pos;
                cursor.label_pos += 1;
                if j != cursor.center && self.corpus[j] != 0 {
                    return (self.corpus[cursor.center] as usize, self.corpus[j] as usize);
                }
            }
            self.advance(cursor);
        }
    }
}

impl TrainingStream for SkipGramStream {
    fn next_batch(&self, batch_size: usize, batch: &mut Batch) {
        batch.examples.clear();
        batch.labels.clear();
        let mut cursor = match self.cursor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for _ in 0..batch_size {
            let (example, label) = self.next_pair(&mut cursor);
            batch.examples.push(example);
            batch.labels.push(label);
        }
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn words_processed(&self) -> u64 {
        self.words.load(Ordering::Relaxed)
    }

    fn words_per_epoch(&self) -> u64 {
        self.corpus.len() as u64
    }

    fn resume(&self, epoch: u64, words_processed: u64) {
        let mut cursor = match self.cursor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let len = self.corpus.len() as u64;
        // A cursor parked at the end of the corpus hasn't started the next
        // epoch yet.
        cursor.next = match words_processed % len {
            0 if words_processed > 0 => self.corpus.len(),
            pos => pos as usize,
        };
        cursor.label_pos = 0;
        cursor.label_limit = 0;
        self.epoch.store(epoch, Ordering::Release);
        self.words.store(words_processed, Ordering::Relaxed);
    }
}
