use crate::{
    config::Config,
    error::Result,
    katakana::is_katakana,
    oracle::{Candidates, GenerationClient},
    retry::RetryPolicy,
    store::MapStore,
    words::Chunk,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Lifecycle of a chunk inside [`ChunkProcessor::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChunkState {
    /// Words waiting to be sent
    Pending,
    /// Request in flight
    Submitted,
    /// Response classified
    Triaged,
    /// Every word resolved
    Committed,
    /// Waiting before the next attempt with a smaller pending set
    Retrying,
    /// Retry budget spent with words still unresolved
    Abandoned,
}

/// Final outcome of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChunkStatus {
    /// Every word was already in the map
    Skipped,
    /// Every pending word was committed
    Committed,
    /// Some words were dropped for this run
    Abandoned,
    /// Dry run: words would have been submitted
    Planned,
}

/// What happened to one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkReport {
    /// Chunk index (0-based)
    pub index: usize,

    /// Offset of the first word in the full list
    pub start: usize,

    /// Offset one past the last word
    pub end: usize,

    /// Words sent to the oracle on the first attempt
    pub submitted: usize,

    /// Entries written to the map
    pub committed: usize,

    /// Words left unresolved when the budget ran out
    pub abandoned: Vec<String>,

    /// Oracle calls made
    pub attempts: u32,

    /// Oracle calls that failed outright
    pub oracle_failures: u32,

    /// Final outcome
    pub status: ChunkStatus,
}

impl ChunkReport {
    /// Report for a chunk whose words were all resolved already.
    #[must_use]
    pub fn skipped(chunk: &Chunk<'_>) -> Self {
        Self {
            index: chunk.index,
            start: chunk.start,
            end: chunk.end(),
            submitted: 0,
            committed: 0,
            abandoned: Vec::new(),
            attempts: 0,
            oracle_failures: 0,
            status: ChunkStatus::Skipped,
        }
    }

    /// Report for a dry-run chunk with `pending` unresolved words.
    #[must_use]
    pub fn planned(chunk: &Chunk<'_>, pending: usize) -> Self {
        Self {
            submitted: pending,
            status: ChunkStatus::Planned,
            ..Self::skipped(chunk)
        }
    }
}

/// Classification of one oracle response against the pending set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Triage {
    /// Requested words with a katakana value
    pub valid: Candidates,

    /// Requested words whose value is not katakana
    pub invalid: Candidates,

    /// Requested words absent from the response
    pub missing: Vec<String>,

    /// Returned words that were never requested
    pub extra: Vec<String>,
}

impl Triage {
    /// Splits `response` into valid, invalid, missing and extra words.
    #[must_use]
    pub fn classify(pending: &[String], mut response: Candidates) -> Self {
        let mut triage = Self::default();

        for word in pending {
            match response.remove(word) {
                Some(value) if is_katakana(&value) => {
                    triage.valid.insert(word.clone(), value);
                }
                Some(value) => {
                    triage.invalid.insert(word.clone(), value);
                }
                None => triage.missing.push(word.clone()),
            }
        }
        triage.extra = response.into_keys().collect();

        triage
    }

    /// Words to send again: invalid and missing, in pending order.
    #[must_use]
    pub fn unresolved(&self, pending: &[String]) -> Vec<String> {
        pending
            .iter()
            .filter(|word| !self.valid.contains_key(*word))
            .cloned()
            .collect()
    }

    /// Returns true if every pending word came back valid.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.invalid.is_empty() && self.missing.is_empty()
    }
}

/// Drives one chunk through the oracle until it is resolved or abandoned.
pub struct ChunkProcessor<'a, C: ?Sized> {
    client: &'a C,
    store: &'a MapStore,
    retry: RetryPolicy,
    decoy_words: &'a [String],
}

impl<'a, C: GenerationClient + ?Sized> ChunkProcessor<'a, C> {
    /// Creates a processor sharing the pipeline's client and store.
    pub fn new(client: &'a C, store: &'a MapStore, config: &'a Config) -> Self {
        Self {
            client,
            store,
            retry: config.retry,
            decoy_words: &config.decoy_words,
        }
    }

    /// Resolves `pending` (the unresolved words of `chunk`).
    ///
    /// Valid entries are committed after every attempt, so an interrupted
    /// chunk keeps what it already resolved.
    ///
    /// # Errors
    ///
    /// Returns an error only if the map cannot be written or the client
    /// reports a non-oracle error. Oracle failures and bad answers are
    /// retried until the budget runs out.
    pub fn process(&self, chunk: &Chunk<'_>, pending: Vec<String>) -> Result<ChunkReport> {
        let mut tracker = StateTracker::new(chunk.index);
        let mut pending = pending;
        let mut report = ChunkReport {
            index: chunk.index,
            start: chunk.start,
            end: chunk.end(),
            submitted: pending.len(),
            committed: 0,
            abandoned: Vec::new(),
            attempts: 0,
            oracle_failures: 0,
            status: ChunkStatus::Committed,
        };

        while !pending.is_empty() {
            let (request, decoys) = self.build_request(&pending);

            tracker.enter(ChunkState::Submitted);
            report.attempts += 1;
            info!(
                "Processing words {} to {} (pending: {}, attempt {}/{})",
                chunk.start + 1,
                chunk.end(),
                pending.len(),
                report.attempts,
                self.retry.max_attempts
            );

            let response = match self.client.generate(&request) {
                Ok(response) => response,
                Err(e) if e.is_oracle() => {
                    report.oracle_failures += 1;
                    warn!("Error processing words: {e}");
                    if !self.retry.can_retry(report.attempts) {
                        break;
                    }
                    warn!(
                        "Retrying in {:.1}s... ({} attempts left)",
                        self.retry.delay_for(report.attempts).as_secs_f64(),
                        self.retry.remaining(report.attempts)
                    );
                    tracker.enter(ChunkState::Retrying);
                    self.retry.wait(report.attempts);
                    tracker.enter(ChunkState::Pending);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let triage = Triage::classify(&pending, strip_decoys(response, &decoys));
            tracker.enter(ChunkState::Triaged);

            if !triage.extra.is_empty() {
                info!(
                    "Extra words: {} ({} total)",
                    triage.extra.join(", "),
                    triage.extra.len()
                );
            }

            if !triage.valid.is_empty() {
                self.store.merge_and_save(&triage.valid)?;
                report.committed += triage.valid.len();
            }

            pending = triage.unresolved(&pending);
            if pending.is_empty() {
                break;
            }

            if !self.retry.can_retry(report.attempts) {
                break;
            }

            info!(
                "Retrying {} problematic words in {:.1}s ({} attempts left). invalid: [{}], missing: [{}]",
                pending.len(),
                self.retry.delay_for(report.attempts).as_secs_f64(),
                self.retry.remaining(report.attempts),
                describe_invalid(&triage.invalid),
                triage.missing.join(", ")
            );
            tracker.enter(ChunkState::Retrying);
            self.retry.wait(report.attempts);
            tracker.enter(ChunkState::Pending);
        }

        if pending.is_empty() {
            tracker.enter(ChunkState::Committed);
        } else {
            tracker.enter(ChunkState::Abandoned);
            warn!(
                "Max attempts reached. Skipping {} words: {}",
                pending.len(),
                pending.join(", ")
            );
            report.status = ChunkStatus::Abandoned;
            report.abandoned = pending;
        }

        Ok(report)
    }

    /// Pending words followed by the decoys that do not collide with them.
    fn build_request(&self, pending: &[String]) -> (Vec<String>, HashSet<&'a str>) {
        let pending_set: HashSet<&str> = pending.iter().map(String::as_str).collect();
        let decoys: HashSet<&'a str> = self
            .decoy_words
            .iter()
            .map(String::as_str)
            .filter(|decoy| !pending_set.contains(decoy))
            .collect();

        let mut request = pending.to_vec();
        request.extend(
            self.decoy_words
                .iter()
                .filter(|decoy| decoys.contains(decoy.as_str()))
                .cloned(),
        );

        (request, decoys)
    }
}

/// Removes decoy entries so they can never be committed.
fn strip_decoys(mut response: Candidates, decoys: &HashSet<&str>) -> Candidates {
    response.retain(|word, _| !decoys.contains(word.as_str()));
    response
}

fn describe_invalid(invalid: &BTreeMap<String, String>) -> String {
    invalid
        .iter()
        .map(|(word, value)| format!("{word}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

struct StateTracker {
    chunk: usize,
    state: ChunkState,
}

impl StateTracker {
    const fn new(chunk: usize) -> Self {
        Self {
            chunk,
            state: ChunkState::Pending,
        }
    }

    fn enter(&mut self, next: ChunkState) {
        debug!("Chunk {}: {:?} -> {:?}", self.chunk, self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Error, oracle::parse_response, words::WordSource};
    use std::{cell::RefCell, collections::VecDeque, time::Duration};

    /// Replays scripted replies and records every request.
    struct Scripted {
        replies: RefCell<VecDeque<Result<&'static str>>>,
        requests: RefCell<Vec<Vec<String>>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<&'static str>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl GenerationClient for Scripted {
        fn generate(&self, words: &[String]) -> Result<Candidates> {
            self.requests.borrow_mut().push(words.to_vec());
            match self.replies.borrow_mut().pop_front() {
                Some(Ok(text)) => parse_response(text),
                Some(Err(e)) => Err(e),
                None => Ok(Candidates::new()),
            }
        }
    }

    fn test_config(map: &std::path::Path, max_attempts: u32) -> Config {
        Config::builder()
            .map_path(map)
            .max_attempts(max_attempts)
            .retry_delay(Duration::ZERO)
            .build()
            .unwrap()
    }

    fn pending(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| (*w).to_string()).collect()
    }

    #[test]
    fn test_triage_classification() {
        let pending = pending(&["apple", "banana", "cherry"]);
        let response = parse_response("apple,アップル\nbanana,BANANA\nextra,エクストラ").unwrap();

        let triage = Triage::classify(&pending, response);

        assert_eq!(triage.valid.len(), 1);
        assert_eq!(triage.invalid["banana"], "BANANA");
        assert_eq!(triage.missing, vec!["cherry".to_string()]);
        assert_eq!(triage.extra, vec!["extra".to_string()]);
        assert!(!triage.is_complete());
        assert_eq!(triage.unresolved(&pending), vec!["banana", "cherry"]);
    }

    #[test]
    fn test_invalid_value_is_requeued_then_committed() {
        let temp = assert_fs::TempDir::new().unwrap();
        let map_path = temp.path().join("katakana_map.json");
        let config = test_config(&map_path, 5);
        let store = MapStore::new(&map_path);
        let client = Scripted::new(vec![
            Ok("apple,アップル\nbanana,BANANA"),
            Ok("banana,バナナ"),
        ]);
        let source = WordSource::from_words(["apple", "banana"]);
        let chunk = source.chunks(10).next().unwrap();

        let processor = ChunkProcessor::new(&client, &store, &config);
        let report = processor
            .process(&chunk, pending(&["apple", "banana"]))
            .unwrap();

        assert_eq!(report.status, ChunkStatus::Committed);
        assert_eq!(report.committed, 2);
        assert_eq!(report.attempts, 2);

        let map = store.load().unwrap();
        assert_eq!(map["apple"], "アップル");
        assert_eq!(map["banana"], "バナナ");

        // Once apple is resolved it is sent as a decoy again.
        let requests = client.requests.borrow();
        assert_eq!(requests[1].first().map(String::as_str), Some("banana"));
        assert_eq!(requests[1].len(), config.decoy_words.len());
        assert!(requests[1].contains(&"apple".to_string()));
    }

    #[test]
    fn test_always_missing_word_is_abandoned() {
        let temp = assert_fs::TempDir::new().unwrap();
        let map_path = temp.path().join("katakana_map.json");
        let config = test_config(&map_path, 4);
        let store = MapStore::new(&map_path);
        let client = Scripted::new(Vec::new());
        let source = WordSource::from_words(["zzzqx"]);
        let chunk = source.chunks(10).next().unwrap();

        let report = ChunkProcessor::new(&client, &store, &config)
            .process(&chunk, pending(&["zzzqx"]))
            .unwrap();

        assert_eq!(report.status, ChunkStatus::Abandoned);
        assert_eq!(report.attempts, 4);
        assert_eq!(report.abandoned, vec!["zzzqx".to_string()]);
        assert_eq!(client.requests.borrow().len(), 4);
        assert!(!map_path.exists());
    }

    #[test]
    fn test_oracle_failures_count_toward_budget() {
        let temp = assert_fs::TempDir::new().unwrap();
        let map_path = temp.path().join("katakana_map.json");
        let config = test_config(&map_path, 3);
        let store = MapStore::new(&map_path);
        let client = Scripted::new(vec![
            Err(Error::oracle("timeout")),
            Err(Error::oracle("503")),
            Ok("judo,ジュウドー"),
        ]);
        let source = WordSource::from_words(["judo"]);
        let chunk = source.chunks(10).next().unwrap();

        let report = ChunkProcessor::new(&client, &store, &config)
            .process(&chunk, pending(&["judo"]))
            .unwrap();

        assert_eq!(report.status, ChunkStatus::Committed);
        assert_eq!(report.oracle_failures, 2);
        assert_eq!(report.attempts, 3);
    }

    #[test]
    fn test_persistent_oracle_failure_abandons() {
        let temp = assert_fs::TempDir::new().unwrap();
        let map_path = temp.path().join("katakana_map.json");
        let config = test_config(&map_path, 2);
        let store = MapStore::new(&map_path);
        let client = Scripted::new(vec![
            Err(Error::oracle("timeout")),
            Err(Error::oracle("timeout")),
            Ok("judo,ジュウドー"),
        ]);
        let source = WordSource::from_words(["judo"]);
        let chunk = source.chunks(10).next().unwrap();

        let report = ChunkProcessor::new(&client, &store, &config)
            .process(&chunk, pending(&["judo"]))
            .unwrap();

        assert_eq!(report.status, ChunkStatus::Abandoned);
        assert_eq!(report.attempts, 2);
        assert_eq!(client.requests.borrow().len(), 2);
    }

    #[test]
    fn test_decoys_are_sent_but_never_committed() {
        let temp = assert_fs::TempDir::new().unwrap();
        let map_path = temp.path().join("katakana_map.json");
        let config = test_config(&map_path, 2);
        let store = MapStore::new(&map_path);
        let client = Scripted::new(vec![Ok(
            "judo,ジュウドー\napple,アップル\nbanana,バナナ\nwatermelon,ウォーターメロン",
        )]);
        let source = WordSource::from_words(["judo"]);
        let chunk = source.chunks(10).next().unwrap();

        ChunkProcessor::new(&client, &store, &config)
            .process(&chunk, pending(&["judo"]))
            .unwrap();

        let requests = client.requests.borrow();
        assert_eq!(requests[0].len(), 1 + config.decoy_words.len());
        assert!(requests[0].contains(&"cherry".to_string()));

        let map = store.load().unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("judo"));
    }

    #[test]
    fn test_decoy_colliding_with_pending_word_is_not_duplicated() {
        let temp = assert_fs::TempDir::new().unwrap();
        let map_path = temp.path().join("katakana_map.json");
        let config = test_config(&map_path, 1);
        let store = MapStore::new(&map_path);
        let client = Scripted::new(vec![Ok("apple,アップル")]);

        let processor = ChunkProcessor::new(&client, &store, &config);
        let (request, decoys) = processor.build_request(&pending(&["apple"]));

        assert_eq!(request.iter().filter(|w| *w == "apple").count(), 1);
        assert!(!decoys.contains("apple"));
        assert!(decoys.contains("banana"));
    }

    #[test]
    fn test_extra_words_are_ignored() {
        let temp = assert_fs::TempDir::new().unwrap();
        let map_path = temp.path().join("katakana_map.json");
        let config = test_config(&map_path, 1);
        let store = MapStore::new(&map_path);
        let client = Scripted::new(vec![Ok("judo,ジュウドー\nkarate,カラテ")]);
        let source = WordSource::from_words(["judo"]);
        let chunk = source.chunks(10).next().unwrap();

        ChunkProcessor::new(&client, &store, &config)
            .process(&chunk, pending(&["judo"]))
            .unwrap();

        assert!(!store.load().unwrap().contains_key("karate"));
    }

    #[test]
    fn test_pending_set_shrinks_with_flipping_oracle() {
        let temp = assert_fs::TempDir::new().unwrap();
        let map_path = temp.path().join("katakana_map.json");
        let config = test_config(&map_path, 10);
        let store = MapStore::new(&map_path);
        let client = Scripted::new(vec![
            Ok("aa,エーエー\nbb,BB\ncc,CC"),
            Ok("bb,ビービー\ncc,cc"),
            Ok("cc,シーシー\nbb,ビービー"),
        ]);
        let source = WordSource::from_words(["aa", "bb", "cc"]);
        let chunk = source.chunks(10).next().unwrap();

        let report = ChunkProcessor::new(&client, &store, &config)
            .process(&chunk, pending(&["aa", "bb", "cc"]))
            .unwrap();

        let sizes: Vec<usize> = client
            .requests
            .borrow()
            .iter()
            .map(|r| r.iter().filter(|w| w.len() == 2).count())
            .collect();
        assert_eq!(sizes, vec![3, 2, 1]);
        assert_eq!(report.status, ChunkStatus::Committed);
        assert_eq!(store.load().unwrap().len(), 3);
    }

    #[test]
    fn test_persistence_failure_is_fatal() {
        let temp = assert_fs::TempDir::new().unwrap();
        // A directory where the map file should be makes every read fail.
        let config = test_config(temp.path(), 3);
        let store = MapStore::new(temp.path());
        let client = Scripted::new(vec![Ok("judo,ジュウドー")]);
        let source = WordSource::from_words(["judo"]);
        let chunk = source.chunks(10).next().unwrap();

        let err = ChunkProcessor::new(&client, &store, &config)
            .process(&chunk, pending(&["judo"]))
            .unwrap_err();

        assert!(err.is_fatal());
    }
}
