//! # katakana-gen
//!
//! Builds and maintains a persistent English word → katakana map by driving
//! an unreliable text-generation oracle in bounded, resumable batches.
//!
//! ## Features
//!
//! - Strict katakana validation gating every stored value
//! - Chunked requests with decoy words and bounded retries
//! - Incremental, atomic JSON persistence that survives restarts
//! - Pluggable oracle behind the [`GenerationClient`] trait
//!
//! ## Quick Start
//!
//! ```no_run
//! use katakana_gen::{BatchPipeline, Config, GeminiClient, GeminiConfig, WordSource};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .map_path("katakana_map.json")
//!     .chunk_size(500)
//!     .build()?;
//!
//! let client = GeminiClient::new(GeminiConfig::new(std::env::var("GEMINI_API_KEY")?))?;
//! let words = WordSource::load("cmudict_words.txt")?;
//!
//! BatchPipeline::new(config, client)?.run(&words)?.print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! 1. **WordSource**: loads and slices the word list into chunks
//! 2. **BatchPipeline**: skips resolved words, hands the rest to the processor
//! 3. **ChunkProcessor**: request, triage, commit, retry
//! 4. **MapStore**: reloads and atomically rewrites the JSON map

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod audit;
mod chunk;
mod config;
mod error;
mod gemini;
mod katakana;
mod oracle;
mod pipeline;
mod prompt;
mod retry;
mod store;
mod words;

pub use audit::{audit, AuditReport};
pub use chunk::{ChunkProcessor, ChunkReport, ChunkState, ChunkStatus, Triage};
pub use config::{Config, ConfigBuilder, DEFAULT_DECOY_WORDS};
pub use error::{Error, Result};
pub use gemini::{GeminiClient, GeminiConfig, GenerationParams, DEFAULT_ENDPOINT, DEFAULT_MODEL};
pub use katakana::{
    is_katakana, is_katakana_char, normalize_katakana, MIDDLE_DOT, PROLONGED_SOUND_MARK,
};
pub use oracle::{format_request, parse_response, Candidates, GenerationClient};
pub use pipeline::{BatchPipeline, PipelineStats};
pub use retry::{Backoff, RetryPolicy};
pub use store::{to_json, KatakanaMap, MapStore};
pub use words::{Chunk, WordSource};

/// Runs the whole pipeline over `source` with the given oracle.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the map cannot be
/// read or written. Oracle failures never surface here.
///
/// # Examples
///
/// ```no_run
/// use katakana_gen::{run, Config, GeminiClient, GeminiConfig, WordSource};
///
/// # fn main() -> anyhow::Result<()> {
/// let client = GeminiClient::new(GeminiConfig::new("api-key"))?;
/// let words = WordSource::load("cmudict_words.txt")?;
///
/// run(Config::builder().build()?, client, &words)?;
/// # Ok(())
/// # }
/// ```
pub fn run<C: GenerationClient>(
    config: Config,
    client: C,
    source: &WordSource,
) -> Result<PipelineStats> {
    BatchPipeline::new(config, client)?.run(source)
}
