//! End-to-end runs on a tiny corpus.

use std::fs;
use std::path::Path;

use clap::Parser;

use synvec::analogy::{evaluate, evaluate_in_chunks, load_analogies, AnalogySet};
use synvec::checkpoint::Checkpoint;
use synvec::*;

const SENTENCES: &str = "the king rules the land . the queen rules the land . \
                         a man walks to the town . a woman walks to the town . \
                         the big dog runs . the small dog sleeps . ";

fn write_inputs(dir: &Path) {
    fs::write(dir.join("corpus.txt"), SENTENCES.repeat(30)).unwrap();
    fs::write(
        dir.join("lexicon.txt"),
        "# test lexicon\nsyn king queen\nsyn big large\nant big small\nant man woman\nbogus line here\n",
    )
    .unwrap();
    fs::write(
        dir.join("questions.txt"),
        ": royalty\nman king woman queen\nman king woman empress\n",
    )
    .unwrap();
}

fn config(dir: &Path, extra: &[&str]) -> Config {
    let corpus = dir.join("corpus.txt");
    let questions = dir.join("questions.txt");
    let lexicon = dir.join("lexicon.txt");
    let save = dir.join("model");
    let args = [
        "synvec",
        "--train-data",
        corpus.to_str().unwrap(),
        "--eval-data",
        questions.to_str().unwrap(),
        "--lexicon",
        lexicon.to_str().unwrap(),
        "--save-path",
        save.to_str().unwrap(),
        "--min-count",
        "1",
        "--subsample",
        "0",
        "--embedding-size",
        "16",
        "--num-neg-samples",
        "3",
        "--batch-size",
        "8",
        "--concurrent-steps",
        "2",
        "--window-size",
        "2",
        "--syn-threshold",
        "1",
        "--statistics-interval",
        "0",
    ];
    Options::parse_from(args.iter().copied().chain(extra.iter().copied()))
        .into_config()
        .unwrap()
}

/// The same steps as the `synvec` binary, minus the output files.
fn build(config: &Config) -> (Trainer, AnalogySet) {
    let vocab_file = config.vocab_file();
    let vocab = if config.reuse_tables && vocab_file.exists() {
        Vocab::load(&vocab_file, config.min_count).unwrap()
    } else {
        let vocab = Vocab::learn_from_file(&config.train_data, config.min_count).unwrap();
        fs::create_dir_all(&config.save_path).unwrap();
        vocab.save(&vocab_file).unwrap();
        vocab
    };
    let corpus = vocab.encode_file(&config.train_data).unwrap();
    let lexicon = Thesaurus::load(config.lexicon.as_ref().unwrap()).unwrap();
    let tables = NeighborTables::prepare(config, &vocab, &corpus, &lexicon).unwrap();
    let analogies = load_analogies(&config.eval_data, |w| vocab.id(w)).unwrap();
    let stream = SkipGramStream::new(corpus, &vocab, config).unwrap();

    let mut trainer = Trainer::new(config.clone());
    trainer.build(vocab, tables, stream).unwrap();
    (trainer, analogies)
}

#[test]
fn train_and_export() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let config = config(dir.path(), &["--epochs-to-train", "2"]);

    let (mut trainer, analogies) = build(&config);
    assert_eq!(analogies.questions.len(), 1);
    assert_eq!(analogies.skipped, 1);

    trainer.init_params().unwrap();
    let report = trainer.train(&analogies).unwrap();
    assert_eq!(report.total, 1);
    assert_eq!(report.skipped, 1);
    assert!(report.correct <= 1);
    assert_eq!(trainer.state(), TrainerState::Converged);
    assert_eq!(trainer.epoch().unwrap(), 2);

    for file in ["vocab.txt", "neighbors.bin", "model.ckpt", "summary.tsv"] {
        assert!(config.save_path.join(file).exists(), "missing {file}");
    }

    let vocab_len = trainer.vocab().unwrap().len();
    for binary in [false, true] {
        let path = dir.path().join(format!("vectors-{binary}"));
        trainer.save_vectors(&path, binary).unwrap();
        let vectors = Vectors::load(&path, binary).unwrap();
        assert_eq!(vectors.num_words(), vocab_len);
        assert_eq!(vectors.size(), 16);
        assert_eq!(vectors.word(0), "UNK");
        for i in 1..vectors.num_words() {
            assert!((norm(&vectors[i]) - 1.0).abs() < 1e-4);
        }
    }
}

#[test]
fn resume_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());

    let first = config(dir.path(), &["--epochs-to-train", "1"]);
    let (mut trainer, analogies) = build(&first);
    trainer.init_params().unwrap();
    trainer.train(&analogies).unwrap();
    let saved = Checkpoint::load(&first.checkpoint_file()).unwrap();
    assert_eq!(saved.epoch, 1);
    assert_eq!(saved.global_step, trainer.global_step());

    let second = config(
        dir.path(),
        &["--epochs-to-train", "3", "--resume", "--reuse-tables"],
    );
    let (mut trainer, analogies) = build(&second);
    trainer.restore(Checkpoint::load(&second.checkpoint_file()).unwrap()).unwrap();
    assert_eq!(trainer.epoch().unwrap(), 1);
    assert_eq!(trainer.global_step(), saved.global_step);
    assert_eq!(trainer.words_processed().unwrap(), saved.words_processed);

    trainer.train(&analogies).unwrap();
    assert_eq!(trainer.epoch().unwrap(), 3);
    assert!(trainer.global_step() > saved.global_step);
    let resumed = Checkpoint::load(&second.checkpoint_file()).unwrap();
    assert_eq!(resumed.epoch, 3);
}

#[test]
fn checkpoint_for_another_model_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let config = config(dir.path(), &["--epochs-to-train", "1"]);
    let (mut trainer, _) = build(&config);
    let vocab_len = trainer.vocab().unwrap().len();
    let wrong = Checkpoint {
        vocab_size: vocab_len,
        dim: 4,
        global_step: 0,
        epoch: 0,
        words_processed: 0,
        emb: vec![0.0; vocab_len * 4],
        w: vec![0.0; vocab_len * 4],
        b: vec![0.0; vocab_len],
    };
    assert!(matches!(trainer.restore(wrong), Err(Error::DataIntegrity(_))));
    assert_eq!(trainer.state(), TrainerState::Built);
}

#[test]
fn analogy_chunking_is_invisible() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let config = config(dir.path(), &["--epochs-to-train", "1"]);
    let (mut trainer, _) = build(&config);
    trainer.init_params().unwrap();
    trainer.train_epoch().unwrap();
    let vectors = trainer.vectors().unwrap();

    let n = vectors.num_words();
    let questions = (0..300)
        .map(|i| [1 + i % (n - 1), 1 + (i * 7) % (n - 1), 1 + (i * 13) % (n - 1), 1 + (i * 3) % (n - 1)])
        .collect();
    let set = AnalogySet {
        questions,
        skipped: 4,
    };
    let whole = evaluate(&vectors, &set);
    assert_eq!(whole.total, 300);
    assert_eq!(whole.skipped, 4);
    for chunk in [1, 7, 299, 300] {
        assert_eq!(evaluate_in_chunks(&vectors, &set, chunk), whole);
    }
}

#[test]
fn empty_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.txt");
    fs::write(&path, "  \n\n ").unwrap();
    assert!(matches!(
        Vocab::learn_from_file(&path, 1),
        Err(Error::EmptyCorpus)
    ));
}
