use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use synvec::analogy::{evaluate, load_analogies};
use synvec::Vectors;

#[derive(Parser)]
#[command(about = "Score a vector file on a set of analogy questions", long_about = None)]
struct Options {
    /// Contains word projections, as written by `synvec`
    #[arg(value_name = "FILE")]
    file_name: PathBuf,

    /// Analogy questions, four words per line
    #[arg(value_name = "QUESTIONS")]
    questions: PathBuf,

    /// The vector file is in binary format
    #[arg(long)]
    binary: bool,
}

fn run(options: Options) -> Result<()> {
    let vectors = Vectors::load(&options.file_name, options.binary)
        .with_context(|| format!("error loading vectors from {}", options.file_name.display()))?;
    let analogies = load_analogies(&options.questions, |w| vectors.lookup_word(w))
        .with_context(|| format!("error reading analogies from {}", options.questions.display()))?;
    println!("{}", evaluate(&vectors, &analogies));
    Ok(())
}

fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Options::parse()) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}
