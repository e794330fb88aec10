//! Skip-gram training with synonym and antonym terms.
//!
//! Each example `(e, l)` contributes four terms to the loss:
//!
//! * the true logit `emb[e]·w[l] + b[l]`, pushed toward 1;
//! * one logit per negative sample, pushed toward 0;
//! * a synonym logit: for every synonym `s` of `e`, pick one context word
//!   `t_s` of `s` at random, and average `emb[e]·w[t_s] + b[t_s]` over the
//!   synonym slots;
//! * an antonym logit built the same way from the antonyms of `e`.
//!
//! An example with no usable synonym (or antonym) gets no logit for that
//! term, and the term is exactly zero.
//!
//! Training threads update the shared parameters without locks.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info};

use crate::analogy::{evaluate, AnalogyReport, AnalogySet};
use crate::checkpoint::Checkpoint;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::neighbors::{NeighborTable, NeighborTables};
use crate::params::{AtomicMatrix, ParameterRows, Real};
use crate::sampler::UnigramSampler;
use crate::stream::{Batch, TrainingStream};
use crate::vectors::{write_vectors, Vectors};
use crate::vocab::Vocab;

/// How often the coordinating thread wakes up to check on the workers.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The learning rate never decays below this fraction of its initial value.
const MIN_LEARNING_RATE_FRACTION: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    Uninitialized,
    Built,
    Training,
    Checkpointed,
    Converged,
}

impl TrainerState {
    pub fn name(self) -> &'static str {
        match self {
            TrainerState::Uninitialized => "uninitialized",
            TrainerState::Built => "built",
            TrainerState::Training => "training",
            TrainerState::Checkpointed => "checkpointed",
            TrainerState::Converged => "converged",
        }
    }
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Sigmoid cross-entropy of logit `z` against target `y`, computed without
/// overflow for large `|z|`.
pub fn xent(z: f32, y: f32) -> f32 {
    z.max(0.0) - z * y + (-z.abs()).exp().ln_1p()
}

/// Linear decay from `initial` toward zero over `epochs` epochs, floored at
/// `initial * 1e-4`.
pub fn learning_rate(initial: f32, words_processed: u64, words_per_epoch: u64, epochs: u64) -> f32 {
    let total = (words_per_epoch * epochs).max(1) as f32;
    initial * (1.0 - words_processed as f32 / total).max(MIN_LEARNING_RATE_FRACTION)
}

/// For each valid entry `s` of `relation`'s row for `id`, one context word
/// of `s` chosen uniformly at random. Entries with no context are dropped.
pub fn auxiliary_targets<R: Rng + ?Sized>(
    relation: &NeighborTable,
    context: &NeighborTable,
    id: usize,
    rng: &mut R,
    out: &mut Vec<usize>,
) {
    out.clear();
    for s in relation.valid(id) {
        if let Some(t) = context.valid(s).choose(rng) {
            out.push(t);
        }
    }
}

/// Per-example loss, split by term.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExampleLoss {
    /// True logit plus negative samples.
    pub skip_gram: f32,
    pub synonyms: f32,
    pub antonyms: f32,
}

impl ExampleLoss {
    pub fn total(&self) -> f32 {
        self.skip_gram + self.synonyms + self.antonyms
    }
}

/// Model parameters: input embeddings, output weights and output biases.
pub struct Params {
    pub emb: AtomicMatrix,
    pub w: AtomicMatrix,
    pub b: AtomicMatrix,
}

impl Params {
    fn snapshot(&self) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
        (self.emb.to_vec(), self.w.to_vec(), self.b.to_vec())
    }
}

/// Per-thread scratch space and random state.
pub struct Worker {
    rng: StdRng,
    /// The example's embedding, read once per example.
    x: Vec<f32>,
    /// Accumulated gradient for the example's embedding.
    grad: Vec<f32>,
    negatives: Vec<usize>,
    targets: Vec<usize>,
}

impl Worker {
    pub fn new(seed: u64, dim: usize) -> Self {
        Worker {
            rng: StdRng::seed_from_u64(seed),
            x: vec![0.0; dim],
            grad: vec![0.0; dim],
            negatives: vec![],
            targets: vec![],
        }
    }
}

/// Everything `build` hands the trainer. Read-only during training, except
/// for the stream's internal cursor.
struct TrainingData {
    vocab: Vocab,
    tables: NeighborTables,
    sampler: UnigramSampler,
    stream: Box<dyn TrainingStream>,
}

pub struct Trainer {
    config: Config,
    state: TrainerState,
    data: Option<TrainingData>,
    params: Option<Params>,
    global_step: AtomicU64,
    /// Loss of the most recent batch, for statistics.
    last_loss: Real,
}

/// Score `x` against `targets` as the single logit
/// `weight * Σ_t (x·w[t] + b[t])`, step the output rows down the gradient of
/// its cross-entropy against `label`, and add the gradient with respect to
/// `x` into `grad`. Returns the loss.
fn update_output(
    params: &Params,
    x: &[f32],
    grad: &mut [f32],
    targets: &[usize],
    weight: f32,
    label: f32,
    scale: f32,
) -> f32 {
    let z = weight
        * targets
            .iter()
            .map(|&t| params.w.dot_row(t, x) + params.b.get(t, 0))
            .sum::<f32>();
    let g = (sigmoid(z) - label) * weight;
    for &t in targets {
        params.w.accumulate_row(t, g, grad);
        params.w.apply_gradient_row(t, x, -scale * g);
        params.b.apply_gradient_row(t, &[1.0], -scale * g);
    }
    xent(z, label)
}

impl Trainer {
    pub fn new(config: Config) -> Self {
        Trainer {
            config,
            state: TrainerState::Uninitialized,
            data: None,
            params: None,
            global_step: AtomicU64::new(0),
            last_loss: Real::default(),
        }
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn global_step(&self) -> u64 {
        self.global_step.load(Ordering::Relaxed)
    }

    fn invalid(&self, operation: &'static str) -> Error {
        let state = match (self.state, &self.params) {
            (TrainerState::Built, None) => "built but has no parameters",
            (state, _) => state.name(),
        };
        Error::InvalidState { operation, state }
    }

    fn data(&self, operation: &'static str) -> Result<&TrainingData> {
        self.data.as_ref().ok_or_else(|| self.invalid(operation))
    }

    /// Training data and parameters, if the trainer is in a state that
    /// allows training.
    fn ready(&self, operation: &'static str) -> Result<(&TrainingData, &Params)> {
        match (self.state, &self.data, &self.params) {
            (
                TrainerState::Built | TrainerState::Training | TrainerState::Checkpointed,
                Some(data),
                Some(params),
            ) => Ok((data, params)),
            _ => Err(self.invalid(operation)),
        }
    }

    /// Attach the vocabulary, neighbor tables and example stream.
    pub fn build(
        &mut self,
        vocab: Vocab,
        tables: NeighborTables,
        stream: impl TrainingStream + 'static,
    ) -> Result<()> {
        if self.state != TrainerState::Uninitialized {
            return Err(self.invalid("build"));
        }
        for (name, table) in [
            ("context", &tables.context),
            ("synonym", &tables.synonyms),
            ("antonym", &tables.antonyms),
        ] {
            if table.len() != vocab.len() {
                return Err(Error::DataIntegrity(format!(
                    "{name} table has {} rows for a vocabulary of {} words",
                    table.len(),
                    vocab.len()
                )));
            }
        }
        let sampler = UnigramSampler::new(&vocab)?;
        self.data = Some(TrainingData {
            vocab,
            tables,
            sampler,
            stream: Box::new(stream),
        });
        self.state = TrainerState::Built;
        Ok(())
    }

    /// Fresh parameters: embeddings uniform in `[-0.5/dim, 0.5/dim)`,
    /// output weights and biases zero.
    pub fn init_params(&mut self) -> Result<()> {
        if self.state != TrainerState::Built {
            return Err(self.invalid("initialize parameters"));
        }
        let rows = self.data("initialize parameters")?.vocab.len();
        let dim = self.config.emb_dim;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        self.params = Some(Params {
            emb: AtomicMatrix::uniform(rows, dim, 0.5 / dim as f32, &mut rng)?,
            w: AtomicMatrix::zeros(rows, dim)?,
            b: AtomicMatrix::zeros(rows, 1)?,
        });
        self.global_step.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Continue from `checkpoint`: parameters, step count and stream
    /// position.
    pub fn restore(&mut self, checkpoint: Checkpoint) -> Result<()> {
        if self.state != TrainerState::Built {
            return Err(self.invalid("restore a checkpoint"));
        }
        let data = self.data("restore a checkpoint")?;
        let rows = data.vocab.len();
        let dim = self.config.emb_dim;
        checkpoint.validate(rows, dim)?;
        data.stream.resume(checkpoint.epoch, checkpoint.words_processed);
        self.params = Some(Params {
            emb: AtomicMatrix::from_vec(rows, dim, &checkpoint.emb)?,
            w: AtomicMatrix::from_vec(rows, dim, &checkpoint.w)?,
            b: AtomicMatrix::from_vec(rows, 1, &checkpoint.b)?,
        });
        self.global_step.store(checkpoint.global_step, Ordering::Relaxed);
        info!(
            epoch = checkpoint.epoch,
            step = checkpoint.global_step,
            words = checkpoint.words_processed,
            "restored checkpoint"
        );
        if checkpoint.epoch >= self.config.epochs_to_train {
            self.state = TrainerState::Converged;
        }
        Ok(())
    }

    pub fn epoch(&self) -> Result<u64> {
        Ok(self.data("read the epoch")?.stream.current_epoch())
    }

    pub fn words_processed(&self) -> Result<u64> {
        Ok(self.data("read the word count")?.stream.words_processed())
    }

    pub fn vocab(&self) -> Result<&Vocab> {
        Ok(&self.data("read the vocabulary")?.vocab)
    }

    fn current_learning_rate(&self, data: &TrainingData) -> f32 {
        learning_rate(
            self.config.learning_rate,
            data.stream.words_processed(),
            data.stream.words_per_epoch(),
            self.config.epochs_to_train,
        )
    }

    fn train_example(
        &self,
        data: &TrainingData,
        params: &Params,
        example: usize,
        label: usize,
        scale: f32,
        worker: &mut Worker,
    ) -> ExampleLoss {
        let Worker {
            rng,
            x,
            grad,
            negatives,
            targets,
        } = worker;
        let tables = &data.tables;

        params.emb.read_row(example, x);
        grad.fill(0.0);

        let mut loss = ExampleLoss {
            skip_gram: update_output(params, x, grad, &[label], 1.0, 1.0, scale),
            ..ExampleLoss::default()
        };
        for &n in negatives.iter() {
            loss.skip_gram += update_output(params, x, grad, &[n], 1.0, 0.0, scale);
        }

        auxiliary_targets(&tables.synonyms, &tables.context, example, &mut *rng, targets);
        if !targets.is_empty() {
            let weight = 1.0 / self.config.num_syns as f32;
            loss.synonyms = update_output(params, x, grad, targets, weight, 1.0, scale);
        }

        auxiliary_targets(&tables.antonyms, &tables.context, example, &mut *rng, targets);
        if !targets.is_empty() {
            let weight = 1.0 / self.config.num_ants as f32;
            let label = self.config.antonym_target.label();
            loss.antonyms = update_output(params, x, grad, targets, weight, label, scale);
        }

        params.emb.apply_gradient_row(example, grad, -scale);
        loss
    }

    /// One SGD step on `batch`. Returns the mean loss over its examples.
    pub fn train_batch(&self, batch: &Batch, worker: &mut Worker) -> Result<f32> {
        let (data, params) = self.ready("train a batch")?;
        if batch.is_empty() {
            return Ok(0.0);
        }
        let lr = self.current_learning_rate(data);
        let scale = lr / batch.len() as f32;
        data.sampler
            .sample_unique(self.config.num_samples, &mut worker.rng, &mut worker.negatives);

        let mut total = 0.0;
        for (&example, &label) in batch.examples.iter().zip(&batch.labels) {
            total += self
                .train_example(data, params, example, label, scale, worker)
                .total();
        }
        self.global_step.fetch_add(1, Ordering::Relaxed);
        let loss = total / batch.len() as f32;
        self.last_loss.set(loss);
        Ok(loss)
    }

    fn train_thread(&self, id: usize, start_epoch: u64) -> Result<()> {
        let (data, _) = self.ready("train")?;
        let seed = self
            .config
            .seed
            .wrapping_add(start_epoch * self.config.concurrent_steps as u64 + id as u64 + 1);
        let mut worker = Worker::new(seed, self.config.emb_dim);
        let mut batch = Batch::default();
        while data.stream.current_epoch() == start_epoch {
            data.stream.next_batch(self.config.batch_size, &mut batch);
            self.train_batch(&batch, &mut worker)?;
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<Checkpoint> {
        let data = self.data("checkpoint")?;
        let params = self.params.as_ref().ok_or_else(|| self.invalid("checkpoint"))?;
        let (emb, w, b) = params.snapshot();
        Ok(Checkpoint {
            vocab_size: data.vocab.len(),
            dim: self.config.emb_dim,
            global_step: self.global_step(),
            epoch: data.stream.current_epoch(),
            words_processed: data.stream.words_processed(),
            emb,
            w,
            b,
        })
    }

    fn write_checkpoint(&self) -> Result<()> {
        let checkpoint = self.snapshot()?;
        fs::create_dir_all(&self.config.save_path)?;
        let path = self.config.checkpoint_file();
        checkpoint.save(&path)?;
        info!(
            step = checkpoint.global_step,
            "saved checkpoint to {}",
            path.display()
        );
        Ok(())
    }

    /// Save the parameters under `save_path`.
    pub fn checkpoint(&mut self) -> Result<()> {
        self.write_checkpoint()?;
        if self.state != TrainerState::Converged {
            self.state = TrainerState::Checkpointed;
        }
        Ok(())
    }

    /// Run the worker threads until the stream finishes its current epoch.
    /// Returns the new epoch number.
    pub fn train_epoch(&mut self) -> Result<u64> {
        let (data, _) = self.ready("train an epoch")?;
        let start_epoch = data.stream.current_epoch();
        if start_epoch >= self.config.epochs_to_train {
            self.state = TrainerState::Converged;
            return Err(self.invalid("train an epoch"));
        }
        self.state = TrainerState::Training;
        info!(epoch = start_epoch, "starting epoch");

        let mut summary = Summary::open(&self.config.save_path, &self.config.summary_file())?;
        let checkpointed = thread::scope(|s| -> Result<bool> {
            let this: &Trainer = self;
            let threads = (0..this.config.concurrent_steps)
                .map(|id| s.spawn(move || this.train_thread(id, start_epoch)))
                .collect::<Vec<_>>();

            let checkpointed = this.coordinate(&threads, &mut summary)?;

            for thread in threads {
                match thread.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => error!("error in worker thread: {err:#}"),
                    Err(_) => error!("worker thread panicked"),
                }
            }
            Ok(checkpointed)
        })?;

        let data = self.data("train an epoch")?;
        let epoch = data.stream.current_epoch();
        summary.record(
            self.global_step(),
            epoch,
            data.stream.words_processed(),
            self.current_learning_rate(data),
            self.last_loss.get(),
        )?;
        info!(
            epoch,
            step = self.global_step(),
            loss = self.last_loss.get(),
            "finished epoch"
        );

        self.state = if epoch >= self.config.epochs_to_train {
            TrainerState::Converged
        } else if checkpointed {
            TrainerState::Checkpointed
        } else {
            TrainerState::Training
        };
        Ok(epoch)
    }

    /// Runs on the calling thread while the workers train: statistics,
    /// summaries and periodic checkpoints. Returns whether a checkpoint was
    /// written.
    fn coordinate<T>(
        &self,
        threads: &[thread::ScopedJoinHandle<'_, T>],
        summary: &mut Summary,
    ) -> Result<bool> {
        let data = self.data("train an epoch")?;
        let start = Instant::now();
        let mut last_stats = start;
        let mut last_summary = start;
        let mut last_checkpoint = start;
        let mut last_words = data.stream.words_processed();
        let mut checkpointed = false;

        while !threads.iter().all(|t| t.is_finished()) {
            thread::sleep(POLL_INTERVAL);
            let now = Instant::now();
            let words = data.stream.words_processed();
            let lr = self.current_learning_rate(data);
            let loss = self.last_loss.get();

            if now - last_stats >= self.config.statistics_interval {
                let elapsed = (now - last_stats).as_secs_f64().max(1e-9);
                let words_per_sec = (words - last_words) as f64 / elapsed;
                info!(
                    epoch = data.stream.current_epoch(),
                    step = self.global_step(),
                    lr,
                    loss,
                    words_per_sec = words_per_sec.round(),
                    "training"
                );
                last_stats = now;
                last_words = words;
            }
            if now - last_summary >= self.config.summary_interval {
                summary.record(
                    self.global_step(),
                    data.stream.current_epoch(),
                    words,
                    lr,
                    loss,
                )?;
                last_summary = now;
            }
            if now - last_checkpoint >= self.config.checkpoint_interval {
                self.write_checkpoint()?;
                checkpointed = true;
                last_checkpoint = now;
            }
        }
        Ok(checkpointed)
    }

    /// Train until `epochs_to_train` epochs are done, evaluating `analogies`
    /// after each one, then write a final checkpoint. Returns the last
    /// evaluation.
    pub fn train(&mut self, analogies: &AnalogySet) -> Result<AnalogyReport> {
        let mut report = None;
        while self.state != TrainerState::Converged {
            let epoch = self.train_epoch()?;
            let r = evaluate(&self.vectors()?, analogies);
            info!(epoch, "{r}");
            report = Some(r);
        }
        self.checkpoint()?;
        match report {
            Some(r) => Ok(r),
            None => Ok(evaluate(&self.vectors()?, analogies)),
        }
    }

    /// The trained embeddings, normalized.
    pub fn vectors(&self) -> Result<Vectors> {
        let data = self.data("export vectors")?;
        let params = self.params.as_ref().ok_or_else(|| self.invalid("export vectors"))?;
        let words = data.vocab.words().map(str::to_string).collect();
        Ok(Vectors::from_embeddings(
            words,
            self.config.emb_dim,
            params.emb.to_vec(),
        ))
    }

    /// Write the raw embeddings in word2vec format.
    pub fn save_vectors(&self, path: &Path, binary: bool) -> Result<()> {
        let data = self.data("save vectors")?;
        let params = self.params.as_ref().ok_or_else(|| self.invalid("save vectors"))?;
        let words: Vec<&str> = data.vocab.words().collect();
        write_vectors(
            path,
            words.into_iter(),
            self.config.emb_dim,
            &params.emb.to_vec(),
            binary,
        )?;
        debug!("wrote vectors to {}", path.display());
        Ok(())
    }
}

/// Tab-separated training summary, one line per report.
struct Summary {
    file: BufWriter<File>,
}

impl Summary {
    fn open(dir: &Path, path: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_new = file.metadata()?.len() == 0;
        let mut file = BufWriter::new(file);
        if is_new {
            writeln!(file, "step\tepoch\twords\tlearning_rate\tloss")?;
        }
        Ok(Summary { file })
    }

    fn record(&mut self, step: u64, epoch: u64, words: u64, lr: f32, loss: f32) -> Result<()> {
        writeln!(self.file, "{step}\t{epoch}\t{words}\t{lr}\t{loss}")?;
        self.file.flush()?;
        Ok(())
    }
}
