use crate::{
    chunk::{ChunkProcessor, ChunkReport, ChunkStatus},
    config::Config,
    error::Result,
    oracle::GenerationClient,
    store::MapStore,
    words::WordSource,
};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Statistics collected during pipeline execution.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    /// Words in the source list
    pub total_words: usize,

    /// Chunks the list was split into
    pub total_chunks: usize,

    /// Chunks whose words were all in the map already
    pub skipped_chunks: usize,

    /// Chunks fully resolved in this run
    pub committed_chunks: usize,

    /// Chunks that ran out of attempts
    pub abandoned_chunks: usize,

    /// Words that would have been submitted (dry run only)
    pub planned_words: usize,

    /// Entries written to the map in this run
    pub committed_entries: usize,

    /// Words given up on in this run
    pub abandoned_words: Vec<String>,

    /// Oracle calls made
    pub oracle_calls: u32,

    /// Oracle calls that failed outright
    pub oracle_failures: u32,

    /// Entries in the map after the run
    pub map_entries: usize,

    /// Map file path
    pub map_path: String,

    /// Local start time
    pub started_at: String,

    /// Total execution time
    pub duration: Duration,
}

impl PipelineStats {
    /// Aggregates per-chunk reports.
    #[must_use]
    pub fn new(
        total_words: usize,
        reports: &[ChunkReport],
        map_entries: usize,
        map_path: String,
        started_at: String,
        duration: Duration,
    ) -> Self {
        let count = |status: ChunkStatus| reports.iter().filter(|r| r.status == status).count();

        Self {
            total_words,
            total_chunks: reports.len(),
            skipped_chunks: count(ChunkStatus::Skipped),
            committed_chunks: count(ChunkStatus::Committed),
            abandoned_chunks: count(ChunkStatus::Abandoned),
            planned_words: reports
                .iter()
                .filter(|r| r.status == ChunkStatus::Planned)
                .map(|r| r.submitted)
                .sum(),
            committed_entries: reports.iter().map(|r| r.committed).sum(),
            abandoned_words: reports
                .iter()
                .flat_map(|r| r.abandoned.iter().cloned())
                .collect(),
            oracle_calls: reports.iter().map(|r| r.attempts).sum(),
            oracle_failures: reports.iter().map(|r| r.oracle_failures).sum(),
            map_entries,
            map_path,
            started_at,
            duration,
        }
    }

    /// Returns true if no word was abandoned.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.abandoned_words.is_empty()
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║            Generation Run Summary                     ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!("║ Started:              {:<19}             ║", self.started_at);
        println!(
            "║ Source Words:         {:>8}                        ║",
            self.total_words
        );
        println!(
            "║ Chunks:               {:>8}                        ║",
            self.total_chunks
        );
        println!(
            "║   - Skipped:          {:>8}                        ║",
            self.skipped_chunks
        );
        println!(
            "║   - Committed:        {:>8}                        ║",
            self.committed_chunks
        );
        println!(
            "║   - Abandoned:        {:>8}                        ║",
            self.abandoned_chunks
        );
        println!("║                                                       ║");
        println!(
            "║ Entries Added:        {:>8}                        ║",
            self.committed_entries
        );
        println!(
            "║ Words Abandoned:      {:>8}                        ║",
            self.abandoned_words.len()
        );
        if self.planned_words > 0 {
            println!(
                "║ Words Planned:        {:>8}                        ║",
                self.planned_words
            );
        }
        println!(
            "║ Oracle Calls:         {:>8}                        ║",
            self.oracle_calls
        );
        println!(
            "║ Oracle Failures:      {:>8}                        ║",
            self.oracle_failures
        );
        println!(
            "║ Map Entries:          {:>8}                        ║",
            self.map_entries
        );
        println!("║ Map File:                                             ║");
        println!("║   {}", self.map_path);
        println!(
            "║ Total Time:           {:>8.2}s                       ║",
            self.duration.as_secs_f64()
        );
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }
}

/// Top-level driver: walks the word list chunk by chunk.
pub struct BatchPipeline<C> {
    config: Config,
    client: C,
    store: MapStore,
}

impl<C: GenerationClient> BatchPipeline<C> {
    /// Creates a new pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn new(config: Config, client: C) -> Result<Self> {
        config.validate()?;

        let store = MapStore::new(&config.map_path);
        Ok(Self {
            config,
            client,
            store,
        })
    }

    /// The map store this pipeline writes to.
    #[must_use]
    pub fn store(&self) -> &MapStore {
        &self.store
    }

    /// Processes every chunk of `source` in order.
    ///
    /// The map is reloaded before each chunk, so words resolved by an
    /// earlier run (or added by hand) are never sent again. An abandoned
    /// chunk does not stop the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the map cannot be read or written, or if the
    /// oracle rejects its own configuration.
    #[instrument(skip_all, fields(map = %self.config.map_path.display(), words = source.len()))]
    pub fn run(&self, source: &WordSource) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let started_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let total = source.len();

        info!(
            "Starting generation for {} words in chunks of {}",
            total, self.config.chunk_size
        );

        if self.config.dry_run {
            warn!("Dry run mode enabled - no oracle calls, no writes");
        } else if self.config.backup_existing {
            self.store.backup()?;
        }

        let processor = ChunkProcessor::new(&self.client, &self.store, &self.config);
        let mut reports = Vec::new();

        for chunk in source.chunks(self.config.chunk_size) {
            let map = self.store.load()?;
            let pending: Vec<String> = chunk
                .words
                .iter()
                .filter(|word| !map.contains_key(*word))
                .cloned()
                .collect();

            if pending.is_empty() {
                info!(
                    "Skipping words {} to {} as they are already processed.",
                    chunk.start + 1,
                    chunk.end()
                );
                reports.push(ChunkReport::skipped(&chunk));
                continue;
            }

            let report = if self.config.dry_run {
                info!(
                    "Would submit {} words from {} to {}: {}",
                    pending.len(),
                    chunk.start + 1,
                    chunk.end(),
                    pending.join(", ")
                );
                ChunkReport::planned(&chunk, pending.len())
            } else {
                processor.process(&chunk, pending)?
            };
            reports.push(report);

            let remaining = total - chunk.end();
            info!(
                "Chunk {} done. {} words remaining ({:.2}% completed)",
                chunk.index + 1,
                remaining,
                percent(chunk.end(), total)
            );
        }

        let map_entries = self.store.load()?.len();
        let stats = PipelineStats::new(
            total,
            &reports,
            map_entries,
            self.config.map_path.display().to_string(),
            started_at,
            start_time.elapsed(),
        );

        if stats.is_complete() {
            info!(
                "✓ Generation completed in {:.2}s. Results saved to {}",
                stats.duration.as_secs_f64(),
                stats.map_path
            );
        } else {
            warn!(
                "Generation finished with {} abandoned words; rerun to retry them",
                stats.abandoned_words.len()
            );
        }

        Ok(stats)
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    done as f64 / total as f64 * 100.0
}
