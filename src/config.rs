use crate::error::{Error, Result};
use crate::retry::{Backoff, RetryPolicy};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CHUNK_SIZE: usize = 500;
const DEFAULT_MAP_PATH: &str = "katakana_map.json";

/// Filler words added to every oracle request and never persisted.
pub const DEFAULT_DECOY_WORDS: &[&str] = &["apple", "banana", "cherry", "date", "watermelon"];

/// Configuration for the generation pipeline.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Path of the persisted word → katakana JSON map
    pub map_path: PathBuf,

    /// Number of source words per chunk
    pub chunk_size: usize,

    /// Retry budget and delay applied to every chunk
    pub retry: RetryPolicy,

    /// Decoy words injected into every request
    pub decoy_words: Vec<String>,

    /// Copy the map file aside before the first rewrite of a run
    pub backup_existing: bool,

    /// Report pending work without calling the oracle or writing
    pub dry_run: bool,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use katakana_gen::Config;
    ///
    /// let config = Config::builder()
    ///     .map_path("katakana_map.json")
    ///     .chunk_size(200)
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The map path is empty
    /// - Chunk size or retry budget is zero
    /// - A decoy word is empty or contains separators
    pub fn validate(&self) -> Result<()> {
        if self.map_path.as_os_str().is_empty() {
            return Err(Error::config("map_path must not be empty"));
        }

        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size must be greater than 0"));
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::config("max_attempts must be greater than 0"));
        }

        for decoy in &self.decoy_words {
            if decoy.is_empty() {
                return Err(Error::config("decoy words must not be empty"));
            }
            if decoy.contains(|c: char| c.is_whitespace() || c == ',') {
                return Err(Error::config(format!(
                    "decoy word '{decoy}' must not contain whitespace or commas"
                )));
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            map_path: PathBuf::from(DEFAULT_MAP_PATH),
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
            decoy_words: default_decoys(),
            backup_existing: false,
            dry_run: false,
        }
    }
}

fn default_decoys() -> Vec<String> {
    DEFAULT_DECOY_WORDS.iter().map(|w| (*w).to_string()).collect()
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    map_path: Option<PathBuf>,
    chunk_size: Option<usize>,
    max_attempts: Option<u32>,
    retry_delay: Option<Duration>,
    backoff: Option<Backoff>,
    decoy_words: Option<Vec<String>>,
    backup_existing: bool,
    dry_run: bool,
}

impl ConfigBuilder {
    /// Sets the path of the persisted map.
    #[must_use]
    pub fn map_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.map_path = Some(path.into());
        self
    }

    /// Sets the number of words per chunk.
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }

    /// Sets the maximum number of oracle calls per chunk.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Sets the base delay between attempts.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Sets the delay growth strategy.
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Replaces the decoy word set.
    #[must_use]
    pub fn decoy_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.decoy_words = Some(words.into_iter().map(Into::into).collect());
        self
    }

    /// Enables or disables the one-off map backup.
    #[must_use]
    pub fn backup_existing(mut self, enabled: bool) -> Self {
        self.backup_existing = enabled;
        self
    }

    /// Enables dry run mode (no oracle calls, no writes).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let defaults = RetryPolicy::default();
        let config = Config {
            map_path: self
                .map_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MAP_PATH)),
            chunk_size: self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            retry: RetryPolicy {
                max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
                delay: self.retry_delay.unwrap_or(defaults.delay),
                backoff: self.backoff.unwrap_or(defaults.backoff),
            },
            decoy_words: self.decoy_words.unwrap_or_else(default_decoys),
            backup_existing: self.backup_existing,
            dry_run: self.dry_run,
        };

        config.validate()?;
        Ok(config)
    }
}
