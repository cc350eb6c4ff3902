use crate::error::{Error, Result};
use std::{collections::HashSet, fs, path::Path};
use tracing::debug;

/// Marker used by pronunciation dictionaries for alternate entries, e.g. `read(2)`.
const VARIANT_MARKER: char = '(';

/// Ordered, deduplicated list of words to transliterate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordSource {
    words: Vec<String>,
}

/// A consecutive slice of the word list processed as one retry unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Sequential chunk index (0-based)
    pub index: usize,

    /// Offset of the first word in the full list
    pub start: usize,

    /// Words in this chunk
    pub words: &'a [String],
}

impl Chunk<'_> {
    /// Offset one past the last word of this chunk.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.start + self.words.len()
    }

    /// Number of words in this chunk.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.words.len()
    }

    /// Returns true if this chunk is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl WordSource {
    /// Reads a newline-delimited word list.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not UTF-8.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
        let text = String::from_utf8(bytes).map_err(|_| Error::invalid_utf8(path))?;

        let source = Self::from_words(text.lines());
        debug!("Loaded {} words from {}", source.len(), path.display());
        Ok(source)
    }

    /// Builds a word list from arbitrary tokens.
    ///
    /// Tokens are trimmed and lowercased. Single characters, variant entries
    /// and repeats are dropped; first-seen order is kept.
    #[must_use]
    pub fn from_words<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let words = tokens
            .into_iter()
            .filter_map(|token| normalize_word(token.as_ref()))
            .filter(|word| seen.insert(word.clone()))
            .collect();

        Self { words }
    }

    /// All words in order.
    #[must_use]
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Number of words.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Returns true if there are no words.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Partitions the list into consecutive chunks of `size` words.
    ///
    /// The last chunk may be shorter. A `size` of zero is treated as one.
    pub fn chunks(&self, size: usize) -> impl Iterator<Item = Chunk<'_>> {
        let size = size.max(1);
        self.words
            .chunks(size)
            .enumerate()
            .map(move |(index, words)| Chunk {
                index,
                start: index * size,
                words,
            })
    }
}

fn normalize_word(token: &str) -> Option<String> {
    let word = token.trim().to_lowercase();
    if word.chars().count() <= 1 || word.contains(VARIANT_MARKER) {
        return None;
    }
    Some(word)
}
