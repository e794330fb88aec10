use std::io::Write;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use synvec::nearby::{centroid, closest};
use synvec::Vectors;

/// number of closest words that will be shown
const N: usize = 40;

#[derive(Parser)]
#[command(about = "Show the words closest to a word or sentence", long_about = None)]
struct Options {
    /// Contains word projections, as written by `synvec`
    #[arg(value_name = "FILE")]
    file_name: PathBuf,

    /// The file is in binary format
    #[arg(long)]
    binary: bool,
}

fn run(options: Options) -> Result<()> {
    let vectors = Vectors::load(&options.file_name, options.binary)
        .with_context(|| format!("error loading vectors from {}", options.file_name.display()))?;

    let mut line = String::new();
    'outer: loop {
        print!("Enter word or sentence (EXIT to break): ");
        let _ = std::io::stdout().flush();

        line.clear();
        match std::io::stdin().read_line(&mut line) {
            Err(err) => {
                eprintln!("error reading stdin: {err}");
                break;
            }
            Ok(0) => break,
            Ok(_) => {}
        }
        if line.trim() == "EXIT" {
            break;
        }

        let mut bi: Vec<usize> = vec![];
        for word in line.split_whitespace() {
            println!();
            print!("Word: {word}  Position in vocabulary: ");
            match vectors.lookup_word(word) {
                None => {
                    println!("None");
                    println!("Out of dictionary word!");
                    continue 'outer;
                }
                Some(i) => {
                    println!("{i}");
                    bi.push(i);
                }
            }
        }
        if bi.is_empty() {
            continue;
        }

        println!();
        println!("                                              Word       Cosine distance");
        println!("------------------------------------------------------------------------");

        let vec = centroid(&vectors, &bi);
        for (c, dist) in closest(&vectors, &vec, &bi, N) {
            println!("{:>50}\t\t{:8.6}", vectors.word(c), dist);
        }
    }
    Ok(())
}

fn main() {
    if let Err(err) = run(Options::parse()) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}
