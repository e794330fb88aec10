use std::cmp::Reverse;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::iter;
use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};

/// Longest token we keep, in bytes. Longer tokens are truncated.
pub const MAX_STRING: usize = 100;

/// Word stored at id 0. Stands for every token that didn't make it into the
/// vocabulary.
pub const UNK: &str = "UNK";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabWord {
    pub word: String,
    pub count: u64,
}

#[derive(Debug, Clone)]
pub struct Vocab {
    words: Vec<VocabWord>,
    index: HashMap<String, usize>,
    /// Number of tokens in the corpus, known or not.
    corpus_len: u64,
}

/// Read tokens, assuming space + tab + EOL to be word boundaries.
pub fn read_words<R: Read>(fin: R) -> impl Iterator<Item = io::Result<String>> {
    let mut bytes = BufReader::new(fin).bytes();
    iter::from_fn(move || -> Option<io::Result<String>> {
        let mut word = Vec::<u8>::new();
        loop {
            let ch = match bytes.next() {
                None => break,
                Some(Err(err)) => return Some(Err(err)),
                Some(Ok(ch)) => ch,
            };
            if ch == b' ' || ch == b'\t' || ch == b'\n' || ch == b'\r' {
                if !word.is_empty() {
                    break;
                }
                continue;
            }
            if word.len() < MAX_STRING - 1 {
                word.push(ch); // Truncate too long words
            }
        }
        if word.is_empty() {
            None
        } else {
            Some(Ok(String::from_utf8_lossy(&word).into_owned()))
        }
    })
}

impl Vocab {
    /// Count every token, drop words seen fewer than `min_count` times and
    /// order the rest by descending count. Words with equal counts keep the
    /// order in which they first appeared.
    pub fn learn<I, S>(tokens: I, min_count: u64) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counted: Vec<VocabWord> = vec![];
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut corpus_len = 0u64;
        for token in tokens {
            let token = token.as_ref();
            corpus_len += 1;
            match seen.get(token) {
                Some(&i) => counted[i].count += 1,
                None => {
                    seen.insert(token.to_string(), counted.len());
                    counted.push(VocabWord {
                        word: token.to_string(),
                        count: 1,
                    });
                }
            }
        }
        if corpus_len == 0 {
            return Err(Error::EmptyCorpus);
        }
        Self::from_counts(counted, min_count, corpus_len)
    }

    pub fn learn_from_file(path: &Path, min_count: u64) -> Result<Self> {
        let fin = File::open(path)?;
        let mut error = None;
        let tokens = read_words(fin).map_while(|w| match w {
            Ok(w) => Some(w),
            Err(err) => {
                error = Some(err);
                None
            }
        });
        let vocab = Self::learn(tokens, min_count);
        if let Some(err) = error {
            return Err(err.into());
        }
        let vocab = vocab?;
        info!(
            vocab_size = vocab.len() - 1,
            words_per_epoch = vocab.corpus_len(),
            "learned vocabulary from {}",
            path.display()
        );
        Ok(vocab)
    }

    /// Builds the vocabulary from `(word, count)` pairs in first-seen order.
    fn from_counts(mut counted: Vec<VocabWord>, min_count: u64, corpus_len: u64) -> Result<Self> {
        // Stable, so ties keep first-seen order.
        counted.sort_by_key(|vw| Reverse(vw.count));
        let mut unk = VocabWord {
            word: UNK.to_string(),
            count: 0,
        };
        let mut words = Vec::with_capacity(counted.len() + 1);
        for vw in counted {
            if vw.count >= min_count && vw.word != UNK {
                words.push(vw);
            } else {
                unk.count += vw.count;
            }
        }
        if words.is_empty() {
            return Err(Error::EmptyVocabulary { min_count });
        }
        words.insert(0, unk);
        Ok(Self::from_words(words, corpus_len))
    }

    fn from_words(words: Vec<VocabWord>, corpus_len: u64) -> Self {
        let index = words
            .iter()
            .enumerate()
            .map(|(i, vw)| (vw.word.clone(), i))
            .collect();
        Vocab {
            words,
            index,
            corpus_len,
        }
    }

    pub fn save(&self, vocab_file: &Path) -> Result<()> {
        let mut fo = BufWriter::new(File::create(vocab_file)?);
        for vw in &self.words {
            writeln!(fo, "{} {}", vw.word, vw.count)?;
        }
        fo.flush()?;
        Ok(())
    }

    /// Reads a vocabulary written by `save`. The first line is the unknown
    /// word; other words below `min_count` are folded into it.
    pub fn load(vocab_file: &Path, min_count: u64) -> Result<Self> {
        let fin = BufReader::new(File::open(vocab_file)?);
        let mut unk: Option<VocabWord> = None;
        let mut counted = vec![];
        let mut corpus_len = 0;
        for (line_num, line) in fin.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields = line.split_whitespace().collect::<Vec<&str>>();
            if fields.len() != 2 {
                return Err(Error::DataIntegrity(format!(
                    "vocabulary file syntax error on line {}",
                    line_num + 1
                )));
            }
            let count = fields[1].parse::<u64>().map_err(|_| {
                Error::DataIntegrity(format!(
                    "unrecognized frequency number format on line {} of the vocabulary file",
                    line_num + 1
                ))
            })?;
            corpus_len += count;
            let vw = VocabWord {
                word: fields[0].to_string(),
                count,
            };
            if unk.is_none() {
                unk = Some(vw);
            } else {
                counted.push(vw);
            }
        }
        let unk = unk.ok_or(Error::EmptyCorpus)?;
        let mut vocab = Self::from_counts(counted, min_count, corpus_len)?;
        vocab.words[0].count += unk.count;
        Ok(vocab)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Total number of corpus tokens, which is also the number of words the
    /// training stream visits per epoch.
    pub fn corpus_len(&self) -> u64 {
        self.corpus_len
    }

    /// Returns the id of a word; `None` if it's not in the vocabulary.
    pub fn id(&self, word: &str) -> Option<usize> {
        self.index.get(word).copied()
    }

    /// Panics if `id` is out of range.
    pub fn word(&self, id: usize) -> &str {
        &self.words[id].word
    }

    pub fn count(&self, id: usize) -> u64 {
        self.words[id].count
    }

    pub fn counts(&self) -> impl Iterator<Item = u64> + '_ {
        self.words.iter().map(|vw| vw.count)
    }

    pub fn words(&self) -> impl Iterator<Item = &str> + '_ {
        self.words.iter().map(|vw| vw.word.as_str())
    }

    /// Maps each token to its id; unknown tokens become 0.
    pub fn encode<I, S>(&self, tokens: I) -> Vec<u32>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tokens
            .into_iter()
            .map(|t| self.id(t.as_ref()).unwrap_or(0) as u32)
            .collect()
    }

    pub fn encode_file(&self, path: &Path) -> Result<Vec<u32>> {
        let mut ids = Vec::with_capacity(self.corpus_len as usize);
        for word in read_words(File::open(path)?) {
            ids.push(self.id(&word?).unwrap_or(0) as u32);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<String> {
        read_words(text.as_bytes()).map(|w| w.unwrap()).collect()
    }

    #[test]
    fn tokenizing() {
        assert_eq!(tokens("  the cat\tsat\r\non\n\nthe mat "), [
            "the", "cat", "sat", "on", "the", "mat"
        ]);
        assert!(tokens(" \n\t ").is_empty());
        let long = "x".repeat(500);
        assert_eq!(tokens(&long)[0].len(), MAX_STRING - 1);
    }

    #[test]
    fn counts_and_order() {
        let vocab = Vocab::learn(tokens("b a c a b a d"), 1).unwrap();
        let words: Vec<&str> = vocab.words().collect();
        // a:3, b:2, then c and d tie at 1 and keep first-seen order.
        assert_eq!(words, [UNK, "a", "b", "c", "d"]);
        assert_eq!(vocab.count(1), 3);
        assert_eq!(vocab.count(0), 0);
        assert_eq!(vocab.corpus_len(), 7);
        assert_eq!(vocab.id("c"), Some(3));
        assert_eq!(vocab.id("zebra"), None);
    }

    #[test]
    fn min_count_folds_into_unk() {
        let vocab = Vocab::learn(tokens("b a c a b a d"), 2).unwrap();
        let words: Vec<&str> = vocab.words().collect();
        assert_eq!(words, [UNK, "a", "b"]);
        assert_eq!(vocab.count(0), 2);
        assert_eq!(vocab.encode(["a", "d", "b"]), [1, 0, 2]);
    }

    #[test]
    fn deterministic() {
        let text = "one two three two three three four five four one six";
        let a = Vocab::learn(tokens(text), 1).unwrap();
        let b = Vocab::learn(tokens(text), 1).unwrap();
        assert_eq!(a.words, b.words);
        assert_eq!(a.index, b.index);
    }

    #[test]
    fn empty_corpus() {
        assert!(matches!(
            Vocab::learn(Vec::<String>::new(), 1),
            Err(Error::EmptyCorpus)
        ));
        assert!(matches!(
            Vocab::learn(tokens("a b c"), 2),
            Err(Error::EmptyVocabulary { min_count: 2 })
        ));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.txt");
        let vocab = Vocab::learn(tokens("x y y z z z w"), 2).unwrap();
        vocab.save(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "UNK 2\nz 3\ny 2\n"
        );
        let loaded = Vocab::load(&path, 2).unwrap();
        assert_eq!(loaded.words, vocab.words);
        assert_eq!(loaded.corpus_len(), 7);

        let stricter = Vocab::load(&path, 3).unwrap();
        assert_eq!(stricter.words().collect::<Vec<_>>(), [UNK, "z"]);
        assert_eq!(stricter.count(0), 4);
    }

    #[test]
    fn malformed_vocab_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.txt");
        std::fs::write(&path, "UNK 0\ncat three\n").unwrap();
        assert!(matches!(Vocab::load(&path, 1), Err(Error::DataIntegrity(_))));
    }
}
