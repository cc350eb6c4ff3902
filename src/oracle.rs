//! The generation oracle seam.
//!
//! A [`GenerationClient`] turns a batch of words into candidate
//! transliterations. Nothing it returns is trusted: callers must check
//! coverage and validity themselves.

use crate::error::Result;
use std::collections::BTreeMap;
use tracing::trace;

/// Candidate transliterations keyed by the word the oracle echoed back.
pub type Candidates = BTreeMap<String, String>;

/// External, stateless word → katakana oracle.
///
/// Each call must be independent of every previous one. The response may
/// omit requested words, contain unrequested ones, or hold non-katakana
/// values.
pub trait GenerationClient {
    /// Requests transliterations for `words`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Oracle`](crate::Error::Oracle) on transport failures
    /// or unusable responses. These are always retried by the caller.
    fn generate(&self, words: &[String]) -> Result<Candidates>;
}

impl<T: GenerationClient + ?Sized> GenerationClient for &T {
    fn generate(&self, words: &[String]) -> Result<Candidates> {
        (**self).generate(words)
    }
}

impl<T: GenerationClient + ?Sized> GenerationClient for Box<T> {
    fn generate(&self, words: &[String]) -> Result<Candidates> {
        (**self).generate(words)
    }
}

/// Builds the request body: one word per line.
#[must_use]
pub fn format_request(words: &[String]) -> String {
    words.join("\n")
}

/// Parses `word,transliteration` rows from an oracle reply.
///
/// Rows with a field count other than two are skipped. Spaces inside the
/// transliteration are removed. A later row for the same word wins.
///
/// # Errors
///
/// Returns an oracle error if the text cannot be tokenized as CSV.
pub fn parse_response(text: &str) -> Result<Candidates> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut candidates = Candidates::new();
    for record in reader.records() {
        let record = record?;
        if record.len() != 2 {
            trace!("Discarding malformed row: {:?}", record);
            continue;
        }

        let word = record[0].trim();
        let value: String = record[1].chars().filter(|c| *c != ' ').collect();
        if word.is_empty() {
            continue;
        }
        candidates.insert(word.to_string(), value);
    }

    Ok(candidates)
}
