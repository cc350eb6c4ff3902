use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use katakana_gen::{
    audit, Backoff, BatchPipeline, Candidates, Config, Error, GeminiClient, GeminiConfig,
    GenerationClient, MapStore, WordSource, DEFAULT_MODEL,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "katakana-gen",
    version,
    author,
    about = "Build an English word to katakana map with a generation oracle",
    long_about = "Build and maintain an English word → katakana JSON map.\n\n\
    Words are sent to the oracle in chunks; every answer is checked for katakana \
    before it is written. Progress is saved after every attempt, so an interrupted \
    run picks up where it stopped.\n\n\
    USAGE EXAMPLES:\n  \
      # Generate with the defaults (cmudict_words.txt → katakana_map.json)\n  \
      GEMINI_API_KEY=... katakana-gen generate\n\n  \
      # Smaller chunks, fewer attempts\n  \
      katakana-gen generate --chunk-size 200 --max-attempts 10\n\n  \
      # Check an existing map\n  \
      katakana-gen check --map katakana_map.json"
)]
struct Cli {
    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transliterate every unresolved word of the source list
    Generate(GenerateArgs),
    /// Report map entries that break the katakana rules
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Newline-delimited word list
    #[arg(short, long, default_value = "cmudict_words.txt", value_name = "FILE")]
    words: PathBuf,

    /// Word → katakana JSON map (created if missing)
    #[arg(short, long, default_value = "katakana_map.json", value_name = "FILE")]
    map: PathBuf,

    /// Words per oracle request
    #[arg(long, default_value_t = 500)]
    chunk_size: usize,

    /// Oracle calls allowed per chunk
    #[arg(long, default_value_t = 30)]
    max_attempts: u32,

    /// Base delay between attempts, in seconds
    #[arg(long, default_value_t = 5)]
    retry_delay_secs: u64,

    /// Delay growth between attempts
    #[arg(long, value_enum, default_value = "fixed")]
    backoff: CliBackoff,

    /// Decoy word added to every request (repeatable, replaces the defaults)
    #[arg(long = "decoy", value_name = "WORD")]
    decoys: Vec<String>,

    /// Gemini model name
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Per-request timeout, in seconds
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,

    /// Keep a timestamped copy of the map before the first write
    #[arg(long)]
    backup: bool,

    /// Report pending words without calling the oracle
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Word → katakana JSON map
    #[arg(short, long, default_value = "katakana_map.json", value_name = "FILE")]
    map: PathBuf,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliBackoff {
    Fixed,
    Linear,
    Exponential,
}

impl From<CliBackoff> for Backoff {
    fn from(b: CliBackoff) -> Self {
        match b {
            CliBackoff::Fixed => Self::Fixed,
            CliBackoff::Linear => Self::Linear,
            CliBackoff::Exponential => Self::Exponential,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose);

    match cli.command {
        Command::Generate(args) => generate(args),
        Command::Check(args) => check(&args),
    }
}

fn generate(args: GenerateArgs) -> anyhow::Result<()> {
    let mut builder = Config::builder()
        .map_path(args.map)
        .chunk_size(args.chunk_size)
        .max_attempts(args.max_attempts)
        .retry_delay(Duration::from_secs(args.retry_delay_secs))
        .backoff(args.backoff.into())
        .backup_existing(args.backup)
        .dry_run(args.dry_run);

    if !args.decoys.is_empty() {
        builder = builder.decoy_words(args.decoys);
    }

    let config = builder.build().context("Failed to build configuration")?;

    let words = WordSource::load(&args.words)
        .with_context(|| format!("Failed to read word list {}", args.words.display()))?;

    let client: Box<dyn GenerationClient> = if config.dry_run {
        Box::new(DryRunClient)
    } else {
        let oracle = GeminiConfig::new(args.api_key.unwrap_or_default())
            .model(args.model)
            .timeout(Duration::from_secs(args.timeout_secs));
        Box::new(GeminiClient::new(oracle).context("Failed to create Gemini client")?)
    };

    let stats = BatchPipeline::new(config, client)
        .context("Failed to create pipeline")?
        .run(&words)
        .context("Generation failed")?;

    stats.print_summary();
    Ok(())
}

fn check(args: &CheckArgs) -> anyhow::Result<()> {
    let map = MapStore::new(&args.map)
        .load()
        .with_context(|| format!("Failed to load {}", args.map.display()))?;

    let report = audit(&map);
    report.print();

    if !report.is_valid() {
        bail!("{} entries are not valid katakana", report.invalid.len());
    }
    Ok(())
}

/// Stand-in oracle for dry runs, which never reach it.
struct DryRunClient;

impl GenerationClient for DryRunClient {
    fn generate(&self, _words: &[String]) -> katakana_gen::Result<Candidates> {
        Err(Error::oracle("dry run"))
    }
}

fn setup_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => EnvFilter::new("katakana_gen=info"),
        1 => EnvFilter::new("katakana_gen=debug"),
        _ => EnvFilter::new("katakana_gen=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();
}
