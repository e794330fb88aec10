use std::fs;
use std::io::{self, Write};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use synvec::analogy::load_analogies;
use synvec::checkpoint::Checkpoint;
use synvec::nearby::nearby;
use synvec::{Config, NeighborTables, Options, SkipGramStream, Thesaurus, Trainer, Vectors, Vocab};

/// Number of neighbors shown per word in interactive mode.
const NEARBY_WORDS: usize = 20;

fn prepare_vocab(config: &Config) -> Result<Vocab> {
    let vocab_file = config.vocab_file();
    if (config.reuse_tables || config.resume) && vocab_file.exists() {
        info!("reusing vocabulary from {}", vocab_file.display());
        return Vocab::load(&vocab_file, config.min_count)
            .with_context(|| format!("error reading vocabulary file {}", vocab_file.display()));
    }
    let vocab = Vocab::learn_from_file(&config.train_data, config.min_count)
        .with_context(|| format!("error reading training file {}", config.train_data.display()))?;
    fs::create_dir_all(&config.save_path)
        .with_context(|| format!("error creating {}", config.save_path.display()))?;
    vocab.save(&vocab_file).context("error writing vocabulary file")?;
    Ok(vocab)
}

fn interact(vectors: &Vectors) -> Result<()> {
    let mut line = String::new();
    loop {
        print!("Enter word (EXIT to break): ");
        io::stdout().flush()?;

        line.clear();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let word = line.trim();
        if word == "EXIT" {
            break;
        }
        let Some(id) = vectors.lookup_word(word) else {
            println!("Out of dictionary word!");
            continue;
        };

        println!();
        println!("                                              Word       Cosine distance");
        println!("------------------------------------------------------------------------");
        for &(neighbor, dist) in &nearby(vectors, &[id], NEARBY_WORDS)[0] {
            println!("{:>50}\t\t{:8.6}", vectors.word(neighbor), dist);
        }
    }
    Ok(())
}

fn run(options: Options) -> Result<()> {
    let config = options.into_config()?;
    info!("starting training using file {}", config.train_data.display());

    let vocab = prepare_vocab(&config)?;
    let corpus = vocab
        .encode_file(&config.train_data)
        .context("error reading a word from training data")?;

    let lexicon = match &config.lexicon {
        Some(path) => Thesaurus::load(path)
            .with_context(|| format!("error reading lexicon {}", path.display()))?,
        None => Thesaurus::new(),
    };
    let tables = NeighborTables::prepare(&config, &vocab, &corpus, &lexicon)
        .context("error building neighbor tables")?;
    let analogies = load_analogies(&config.eval_data, |w| vocab.id(w))
        .with_context(|| format!("error reading analogies from {}", config.eval_data.display()))?;
    let stream = SkipGramStream::new(corpus, &vocab, &config)?;

    let mut trainer = Trainer::new(config.clone());
    trainer.build(vocab, tables, stream)?;
    if config.resume {
        let path = config.checkpoint_file();
        let checkpoint = Checkpoint::load(&path)
            .with_context(|| format!("error loading checkpoint {}", path.display()))?;
        trainer.restore(checkpoint)?;
    } else {
        trainer.init_params()?;
    }

    let report = trainer.train(&analogies)?;
    println!("{report}");

    let output_file = config.vectors_file();
    trainer
        .save_vectors(&output_file, config.binary)
        .context("error writing output file")?;
    info!("saved vectors to {}", output_file.display());

    if config.interactive {
        interact(&trainer.vectors()?)?;
    }
    Ok(())
}

fn main() {
    let options = Options::parse();

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run(options) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}
