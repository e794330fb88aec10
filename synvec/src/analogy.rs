//! Analogy evaluation: for "a b c d", does `b - a + c` land nearest to `d`?

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ordered_float::OrderedFloat;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::Result;
use crate::vectors::{dot, Vectors};

/// Questions are scored this many at a time.
pub const ANALOGY_CHUNK: usize = 2500;

/// Analogy questions as word ids, plus the number of lines that couldn't be
/// used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalogySet {
    pub questions: Vec<[usize; 4]>,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalogyReport {
    pub total: usize,
    pub skipped: usize,
    pub correct: usize,
    /// Indices into `AnalogySet::questions` of the questions answered
    /// correctly, in ascending order.
    pub passed: Vec<usize>,
}

impl AnalogyReport {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    /// Indices of the questions answered wrongly, in ascending order.
    pub fn failed(&self) -> Vec<usize> {
        let mut passed = self.passed.iter().peekable();
        (0..self.total)
            .filter(|i| {
                if passed.peek() == Some(&i) {
                    passed.next();
                    false
                } else {
                    true
                }
            })
            .collect()
    }
}

impl fmt::Display for AnalogyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Eval {}/{} accuracy = {:.1}% ({} questions skipped)",
            self.correct,
            self.total,
            self.accuracy() * 100.0,
            self.skipped
        )
    }
}

/// Parse analogy questions, one per line. Lines starting with `:` are
/// section headers. Words are lowercased before lookup; a line that doesn't
/// have exactly four words, or has a word `lookup` doesn't know, is skipped.
pub fn read_analogies<R, F>(reader: R, lookup: F) -> Result<AnalogySet>
where
    R: BufRead,
    F: Fn(&str) -> Option<usize>,
{
    let mut set = AnalogySet::default();
    for line in reader.lines() {
        let line = line?;
        if line.starts_with(':') {
            continue;
        }
        let words: Vec<String> = line.split_whitespace().map(str::to_lowercase).collect();
        let ids: Option<Vec<usize>> = words.iter().map(|w| lookup(w.as_str())).collect();
        match ids.as_deref() {
            Some(&[a, b, c, d]) => set.questions.push([a, b, c, d]),
            _ => set.skipped += 1,
        }
    }
    Ok(set)
}

pub fn load_analogies<F>(path: &Path, lookup: F) -> Result<AnalogySet>
where
    F: Fn(&str) -> Option<usize>,
{
    let set = read_analogies(BufReader::new(File::open(path)?), lookup)?;
    info!(
        questions = set.questions.len(),
        skipped = set.skipped,
        "read analogies from {}",
        path.display()
    );
    Ok(set)
}

/// The word nearest to `b - a + c`, other than `a`, `b` and `c`.
pub fn predict(vectors: &Vectors, question: &[usize; 4]) -> Option<usize> {
    let [a, b, c, _] = *question;
    let vec: Vec<f32> = (0..vectors.size())
        .map(|j| vectors[b][j] - vectors[a][j] + vectors[c][j])
        .collect();
    (0..vectors.num_words())
        .filter(|&w| w != a && w != b && w != c)
        .max_by_key(|&w| OrderedFloat(dot(&vec, &vectors[w])))
}

/// Score every question, `chunk_size` at a time.
pub fn evaluate_in_chunks(vectors: &Vectors, set: &AnalogySet, chunk_size: usize) -> AnalogyReport {
    let chunk_size = chunk_size.max(1);
    let mut passed = vec![];
    for (n, chunk) in set.questions.chunks(chunk_size).enumerate() {
        let start = n * chunk_size;
        let good: Vec<usize> = chunk
            .par_iter()
            .enumerate()
            .filter(|(_, q)| predict(vectors, q) == Some(q[3]))
            .map(|(i, _)| start + i)
            .collect();
        passed.extend(good);
    }
    debug!(?passed, "analogy questions answered correctly");
    AnalogyReport {
        total: set.questions.len(),
        skipped: set.skipped,
        correct: passed.len(),
        passed,
    }
}

pub fn evaluate(vectors: &Vectors, set: &AnalogySet) -> AnalogyReport {
    evaluate_in_chunks(vectors, set, ANALOGY_CHUNK)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-made vectors where royal - male + female lands on "queen".
    fn royal_vectors() -> Vectors {
        let words = ["UNK", "king", "queen", "man", "woman", "apple"];
        #[rustfmt::skip]
        let emb = vec![
            0.0, 0.0, 0.0,
            1.0, 1.0, 0.0,
            1.0, 0.0, 1.0,
            0.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
            -1.0, -1.0, -1.0,
        ];
        Vectors::from_embeddings(words.map(String::from).to_vec(), 3, emb)
    }

    #[test]
    fn king_is_to_man_as_queen_is_to_woman() {
        let v = royal_vectors();
        let id = |w| v.lookup_word(w).unwrap();
        let q = [id("man"), id("king"), id("woman"), id("queen")];
        assert_eq!(predict(&v, &q), Some(id("queen")));
    }

    #[test]
    fn parsing() {
        let v = royal_vectors();
        let text = ": family\nMan King Woman Queen\nman king woman\nman king woman empress\n";
        let set = read_analogies(text.as_bytes(), |w| v.lookup_word(w)).unwrap();
        assert_eq!(set.questions, vec![[3, 1, 4, 2]]);
        assert_eq!(set.skipped, 2);
    }

    #[test]
    fn report() {
        let v = royal_vectors();
        let set = AnalogySet {
            questions: vec![[3, 1, 4, 2], [3, 1, 4, 5]],
            skipped: 7,
        };
        let report = evaluate(&v, &set);
        assert_eq!(
            report,
            AnalogyReport {
                total: 2,
                skipped: 7,
                correct: 1,
                passed: vec![0],
            }
        );
        assert_eq!(report.failed(), vec![1]);
        assert_eq!(report.accuracy(), 0.5);
        assert_eq!(AnalogyReport::default().accuracy(), 0.0);
    }

    #[test]
    fn chunking_does_not_change_the_result() {
        let v = royal_vectors();
        let questions: Vec<[usize; 4]> = (0..37)
            .map(|i| match i % 3 {
                0 => [3, 1, 4, 2],
                1 => [4, 2, 3, 1],
                _ => [1, 2, 5, 3],
            })
            .collect();
        let set = AnalogySet {
            questions,
            skipped: 0,
        };
        let whole = evaluate(&v, &set);
        // Every third question ends up with a word that isn't its answer.
        let expected: Vec<usize> = (0..37).filter(|i| i % 3 != 2).collect();
        assert_eq!(whole.passed, expected);
        assert_eq!(whole.failed(), (2..37).step_by(3).collect::<Vec<_>>());
        for chunk in [1, 2, 5, 36, 37, 1000] {
            let report = evaluate_in_chunks(&v, &set, chunk);
            assert_eq!(report.passed, whole.passed);
            assert_eq!(report, whole);
        }
    }
}
