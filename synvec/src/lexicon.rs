//! The lexical resource: where synonyms and antonyms come from.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::Result;

/// Something that knows the synonyms and antonyms of a word.
///
/// A word the resource knows nothing about just gets an empty list.
pub trait LexicalResource {
    fn synonyms(&self, word: &str) -> Vec<String>;
    fn antonyms(&self, word: &str) -> Vec<String>;
}

/// In-memory synonym/antonym lists.
///
/// The file format is one entry per line:
///
/// ```text
/// # comment
/// syn big large huge
/// ant big small little
/// ```
///
/// Repeated entries for the same word are appended.
#[derive(Debug, Default, Clone)]
pub struct Thesaurus {
    syns: HashMap<String, Vec<String>>,
    ants: HashMap<String, Vec<String>>,
}

impl Thesaurus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_synonyms<I, S>(&mut self, word: &str, synonyms: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.syns
            .entry(word.to_string())
            .or_default()
            .extend(synonyms.into_iter().map(Into::into));
    }

    pub fn insert_antonyms<I, S>(&mut self, word: &str, antonyms: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ants
            .entry(word.to_string())
            .or_default()
            .extend(antonyms.into_iter().map(Into::into));
    }

    pub fn load(path: &Path) -> Result<Self> {
        let fin = BufReader::new(File::open(path)?);
        let mut thesaurus = Thesaurus::new();
        let mut skipped = 0usize;
        for (line_num, line) in fin.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (tag, word) = match (fields.next(), fields.next()) {
                (Some(tag), Some(word)) => (tag, word),
                _ => {
                    skipped += 1;
                    continue;
                }
            };
            match tag {
                "syn" => thesaurus.insert_synonyms(word, fields),
                "ant" => thesaurus.insert_antonyms(word, fields),
                _ => {
                    debug!("lexicon line {}: unknown relation {tag:?}", line_num + 1);
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            warn!("skipped {skipped} malformed lines in lexicon {}", path.display());
        }
        Ok(thesaurus)
    }
}

impl LexicalResource for Thesaurus {
    fn synonyms(&self, word: &str) -> Vec<String> {
        self.syns.get(word).cloned().unwrap_or_default()
    }

    fn antonyms(&self, word: &str) -> Vec<String> {
        self.ants.get(word).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexicon.txt");
        std::fs::write(
            &path,
            "# test lexicon\n\
             syn big large huge\n\
             ant big small\n\
             \n\
             syn big great\n\
             hyp big thing\n\
             lonely\n",
        )
        .unwrap();
        let t = Thesaurus::load(&path).unwrap();
        assert_eq!(t.synonyms("big"), ["large", "huge", "great"]);
        assert_eq!(t.antonyms("big"), ["small"]);
        assert!(t.synonyms("small").is_empty());
        assert!(t.antonyms("lonely").is_empty());
    }
}
