use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::ops::Index;
use std::path::Path;

use crate::error::{Error, Result};

/// Unit-length word vectors, ready for cosine similarity by dot product.
#[derive(Debug, Clone)]
pub struct Vectors {
    /// Embedding vector length (number of dimensions).
    size: usize,

    /// The vocabulary.
    vocab: Vec<String>,

    index: HashMap<String, usize>,

    /// `embeddings[k * size..(k+1) * size]` is the normalized embedding for word `k`.
    embeddings: Vec<f32>,
}

pub fn norm(v: &[f32]) -> f32 {
    v.iter().copied().map(|e| e * e).sum::<f32>().sqrt()
}

/// Scale `v` to unit length. A zero vector stays zero.
pub fn normalize(v: &mut [f32]) {
    let len = norm(v);
    if len > 0.0 {
        for e in v {
            *e /= len;
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(&a, &b)| a * b).sum()
}

fn invalid(what: &str) -> Error {
    Error::DataIntegrity(format!("invalid vector file: {what}"))
}

/// Write vectors in word2vec format: a `"<words> <size>"` header line, then
/// each word followed by its vector, as little-endian `f32`s if `binary`,
/// otherwise as text.
pub fn write_vectors<'a>(
    output_file: &Path,
    words: impl ExactSizeIterator<Item = &'a str>,
    size: usize,
    embeddings: &[f32],
    binary: bool,
) -> Result<()> {
    let mut fo = BufWriter::new(File::create(output_file)?);
    writeln!(fo, "{} {}", words.len(), size)?;
    for (word, row) in words.zip(embeddings.chunks_exact(size)) {
        write!(fo, "{} ", word)?;
        if binary {
            fo.write_all(bytemuck::cast_slice::<f32, u8>(row))?;
        } else {
            for f in row {
                write!(fo, "{} ", f)?;
            }
        }
        writeln!(fo)?;
    }
    fo.flush()?;
    Ok(())
}

impl Index<usize> for Vectors {
    type Output = [f32];

    fn index(&self, i: usize) -> &[f32] {
        &self.embeddings[i * self.size..][..self.size]
    }
}

impl Vectors {
    pub fn from_embeddings(vocab: Vec<String>, size: usize, mut embeddings: Vec<f32>) -> Self {
        assert_eq!(embeddings.len(), vocab.len() * size);
        for row in embeddings.chunks_exact_mut(size) {
            normalize(row);
        }
        let index = vocab
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i))
            .collect();
        Vectors {
            size,
            vocab,
            index,
            embeddings,
        }
    }

    /// Load a file written by `write_vectors`.
    pub fn load(file_name: &Path, binary: bool) -> Result<Self> {
        let mut f = BufReader::new(File::open(file_name)?);
        let mut line = String::new();
        f.read_line(&mut line)?;
        let mut fields = line.split_whitespace();
        let num_words: usize = fields
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| invalid("bad header"))?;
        let size: usize = fields
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| invalid("bad header"))?;

        // Rows are pushed as they're read; a header claiming more than the
        // file holds runs into end of file instead of a huge allocation.
        if num_words.checked_mul(size).and_then(|n| n.checked_mul(4)).is_none() {
            return Err(invalid("header size overflows"));
        }
        let mut vocab: Vec<String> = vec![];
        let mut m: Vec<f32> = vec![];
        for _ in 0..num_words {
            if binary {
                let mut vocab_word = Vec::<u8>::new();
                let count = f.read_until(b' ', &mut vocab_word)?;
                if count == 0 {
                    return Err(invalid("fewer words than the header says"));
                }
                if vocab_word.last() == Some(&b' ') {
                    vocab_word.pop();
                }
                vocab_word.retain(|c| *c != b'\n');
                vocab.push(String::from_utf8(vocab_word).map_err(|_| invalid("word is not UTF-8"))?);
                let mut bytes = [0u8; 4];
                for _ in 0..size {
                    f.read_exact(&mut bytes)
                        .map_err(|_| invalid("short vector"))?;
                    m.push(f32::from_le_bytes(bytes));
                }
            } else {
                line.clear();
                if f.read_line(&mut line)? == 0 {
                    return Err(invalid("fewer words than the header says"));
                }
                let mut fields = line.split_whitespace();
                vocab.push(fields.next().ok_or_else(|| invalid("empty line"))?.to_string());
                for _ in 0..size {
                    let e = fields
                        .next()
                        .and_then(|x| x.parse().ok())
                        .ok_or_else(|| invalid("short or malformed vector"))?;
                    m.push(e);
                }
            }
        }

        Ok(Self::from_embeddings(vocab, size, m))
    }

    pub fn num_words(&self) -> usize {
        self.vocab.len()
    }

    /// Returns the vector size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the index for a word as string. Exact match only, case-sensitive.
    pub fn lookup_word(&self, word: &str) -> Option<usize> {
        self.index.get(word).copied()
    }

    /// Get the word for a word-index. Panics if `word` is out of range.
    pub fn word(&self, word: usize) -> &str {
        &self.vocab[word]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Vec<String>, Vec<f32>) {
        let words = ["UNK", "north", "south"].map(String::from).to_vec();
        (words, vec![0.0, 0.0, 3.0, 4.0, -1.5, 0.25])
    }

    #[test]
    fn rows_are_normalized() {
        let (words, emb) = sample();
        let v = Vectors::from_embeddings(words, 2, emb);
        assert_eq!(&v[0], &[0.0, 0.0]);
        assert_eq!(&v[1], &[0.6, 0.8]);
        assert!((norm(&v[2]) - 1.0).abs() < 1e-6);
        assert_eq!(v.lookup_word("south"), Some(2));
        assert_eq!(v.word(1), "north");
    }

    #[test]
    fn save_and_load_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        for binary in [true, false] {
            let path = dir.path().join(format!("vectors-{binary}"));
            let (words, emb) = sample();
            write_vectors(&path, words.iter().map(String::as_str), 2, &emb, binary).unwrap();
            let loaded = Vectors::load(&path, binary).unwrap();
            let expected = Vectors::from_embeddings(words, 2, emb);
            assert_eq!(loaded.num_words(), 3);
            assert_eq!(loaded.size(), 2);
            for i in 0..3 {
                assert_eq!(loaded.word(i), expected.word(i));
                for (a, b) in loaded[i].iter().zip(&expected[i]) {
                    assert!((a - b).abs() < 1e-6);
                }
            }
        }
    }

    #[test]
    fn oversized_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.txt");
        for header in ["18446744073709551615 4", "1 18446744073709551615", "4611686018427387904 4"] {
            std::fs::write(&path, format!("{header}\nx 1 2 3 4\n")).unwrap();
            assert!(matches!(
                Vectors::load(&path, false),
                Err(Error::DataIntegrity(_))
            ));
        }

        // A plausible header with too little behind it.
        std::fs::write(&path, "1000000 1000000\nx 1 2 3 4\n").unwrap();
        assert!(matches!(
            Vectors::load(&path, false),
            Err(Error::DataIntegrity(_))
        ));
        std::fs::write(&path, b"1000000 1000000\nx \x00\x00\x80\x3f").unwrap();
        assert!(matches!(
            Vectors::load(&path, true),
            Err(Error::DataIntegrity(_))
        ));
    }

    #[test]
    fn truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.txt");
        std::fs::write(&path, "2 2\nleft 1 0\n").unwrap();
        assert!(matches!(
            Vectors::load(&path, false),
            Err(Error::DataIntegrity(_))
        ));
    }
}
