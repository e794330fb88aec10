use std::io::Write;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use synvec::nearby::closest;
use synvec::{normalize, Vectors};

/// number of closest words that will be shown
const N: usize = 40;

#[derive(Parser)]
#[command(about = "Complete analogies interactively: a is to b as c is to ?", long_about = None)]
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
        print!("Enter three words (EXIT to break): ");
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

        if bi.len() != 3 {
            println!("{} words were entered.. three words are needed at the input to perform the calculation", bi.len());
            continue;
        }

        println!();
        println!("                                              Word       Cosine distance");
        println!("------------------------------------------------------------------------");

        let (a, b, c) = (&vectors[bi[0]], &vectors[bi[1]], &vectors[bi[2]]);
        let mut vec: Vec<f32> = (0..vectors.size()).map(|i| b[i] - a[i] + c[i]).collect();
        normalize(&mut vec);

        for (w, dist) in closest(&vectors, &vec, &bi, N) {
            println!("{:>50}\t\t{:8.6}", vectors.word(w), dist);
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
