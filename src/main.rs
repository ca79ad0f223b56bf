//! CLI entry point for `spamsift`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use spamsift::config::{self, Config, PipelineConfig};
use spamsift::export::corpus;
use spamsift::pipeline::{self, Stage};
use spamsift::report::RunSummary;

#[derive(Parser)]
#[command(
    name = "spamsift",
    version,
    about = "Ingest a corpus of raw spam/phishing .eml files into normalized JSON records"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (defaults to $SPAMSIFT_CONFIG or the user config dir)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Worker threads (0 = one per CPU)
    #[arg(short = 'j', long, global = true, value_name = "N")]
    workers: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode every message under a directory into the raw corpus
    Parse {
        /// Corpus root (defaults to [input] dir from the config file)
        input: Option<PathBuf>,
        /// Raw corpus destination
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Normalize an existing raw corpus
    Normalize {
        /// Raw corpus JSON
        raw: Option<PathBuf>,
        /// Normalized corpus destination
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also export the normalized corpus as CSV
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },
    /// Run both stages
    Run {
        /// Corpus root (defaults to [input] dir from the config file)
        input: Option<PathBuf>,
        /// Raw corpus destination
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Normalized corpus destination
        #[arg(short, long)]
        normalized: Option<PathBuf>,
        /// Also export the normalized corpus as CSV
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show statistics for a normalized corpus
    Stats {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => config::load_config_from(path),
        None => config::load_config(),
    };

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    let workers = cli.workers;
    match cli.command {
        Commands::Parse { input, output } => {
            let mut settings = pipeline_config(&config, input, workers)?;
            if let Some(output) = output {
                settings.raw_output = output;
            }
            cmd_parse(&settings)
        }
        Commands::Normalize { raw, output, csv } => {
            let raw = raw.unwrap_or_else(|| config.output.raw_corpus.clone());
            let mut settings = PipelineConfig::from_config(&config, PathBuf::new());
            if let Some(output) = output {
                settings.normalized_output = output;
            }
            if csv.is_some() {
                settings.csv_output = csv;
            }
            if let Some(workers) = workers {
                settings.workers = workers;
            }
            cmd_normalize(&raw, &settings)
        }
        Commands::Run {
            input,
            output,
            normalized,
            csv,
            json,
        } => {
            let mut settings = pipeline_config(&config, input, workers)?;
            if let Some(output) = output {
                settings.raw_output = output;
            }
            if let Some(normalized) = normalized {
                settings.normalized_output = normalized;
            }
            if csv.is_some() {
                settings.csv_output = csv;
            }
            cmd_run(&settings, json)
        }
        Commands::Stats { path, json } => cmd_stats(&path, json),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Merge the corpus root and worker override into the file configuration.
fn pipeline_config(
    config: &Config,
    input: Option<PathBuf>,
    workers: Option<usize>,
) -> anyhow::Result<PipelineConfig> {
    let Some(input) = input.or_else(|| config.input.dir.clone()) else {
        anyhow::bail!("No input directory given and none configured under [input] dir");
    };
    let mut settings = PipelineConfig::from_config(config, input);
    if let Some(workers) = workers {
        settings.workers = workers;
    }
    Ok(settings)
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "spamsift.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// A progress bar over a known number of records.
fn progress_bar(label: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} {label} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})"
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Decode the corpus and write the raw snapshot.
fn cmd_parse(settings: &PipelineConfig) -> anyhow::Result<()> {
    let start = Instant::now();
    let pb = progress_bar("Parsing")?;
    let ingested = pipeline::ingest(
        settings,
        Some(&|done, total| {
            pb.set_length(total);
            pb.set_position(done);
        }),
    )?;
    pb.finish_and_clear();

    corpus::write_corpus(&ingested.records, &settings.raw_output, settings.pretty)?;

    let summary = RunSummary::from_raw(&ingested.records).with_bytes_read(ingested.bytes_read);
    print_summary_table(&summary, start.elapsed());
    println!("  {:<22} {}", "Raw corpus", settings.raw_output.display());
    println!();
    Ok(())
}

/// Normalize an existing raw snapshot.
fn cmd_normalize(raw: &Path, settings: &PipelineConfig) -> anyhow::Result<()> {
    if !raw.exists() {
        anyhow::bail!("Raw corpus not found: {}", raw.display());
    }

    let start = Instant::now();
    let records = corpus::read_raw_corpus(raw)?;

    let pb = progress_bar("Normalizing")?;
    let normalized = pipeline::normalize_all(
        &records,
        settings.workers,
        Some(&|done, total| {
            pb.set_length(total);
            pb.set_position(done);
        }),
    )?;
    pb.finish_and_clear();

    pipeline::write_normalized(&normalized, settings)?;

    print_summary_table(&RunSummary::from_normalized(&normalized), start.elapsed());
    print_outputs(None, settings);
    Ok(())
}

/// Run both stages with progress bars.
fn cmd_run(settings: &PipelineConfig, json: bool) -> anyhow::Result<()> {
    let start = Instant::now();

    let pb = progress_bar("{msg}")?;
    let output = pipeline::run(
        settings,
        Some(&|stage: Stage, done, total| {
            pb.set_message(stage.label());
            pb.set_length(total);
            pb.set_position(done);
        }),
    )?;
    pb.finish_and_clear();

    if json {
        print_summary_json(&output.summary, start.elapsed())?;
    } else {
        print_summary_table(&output.summary, start.elapsed());
        print_outputs(Some(&settings.raw_output), settings);
    }
    Ok(())
}

/// Show statistics for a normalized corpus.
fn cmd_stats(path: &Path, json: bool) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("Corpus not found: {}", path.display());
    }

    let start = Instant::now();
    let records = corpus::read_normalized_corpus(path)?;
    let summary = RunSummary::from_normalized(&records);

    if json {
        print_summary_json(&summary, start.elapsed())
    } else {
        println!();
        println!("  {:<22} {}", "Corpus", path.display());
        print_summary_table(&summary, start.elapsed());
        Ok(())
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "spamsift", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Print a run summary in a human-readable table.
fn print_summary_table(summary: &RunSummary, elapsed: std::time::Duration) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<22} {}", "Messages", summary.total);
    println!("  {:<22} {}", "Parsed", summary.parsed());
    println!("  {:<22} {}", "Failed", summary.failed.len());
    if summary.bytes_read > 0 {
        println!(
            "  {:<22} {}",
            "Input size",
            format_size(summary.bytes_read, BINARY)
        );
    }
    println!(
        "  {:<22} {} ({:.1}%)",
        "With attachments",
        summary.with_attachments,
        percent(summary.with_attachments, summary.total)
    );
    println!(
        "  {:<22} {} ({:.1}%)",
        "With originating IP",
        summary.with_ip,
        percent(summary.with_ip, summary.total)
    );
    println!(
        "  {:<22} {} ({:.1}%)",
        "With valid sender",
        summary.with_sender,
        percent(summary.with_sender, summary.total)
    );
    if let (Some(oldest), Some(newest)) = (summary.oldest, summary.newest) {
        println!(
            "  {:<22} {} to {}",
            "Date range",
            oldest.format("%Y-%m-%d"),
            newest.format("%Y-%m-%d")
        );
    }
    println!("  {:<22} {:.2?}", "Elapsed", elapsed);

    if !summary.top_senders.is_empty() {
        println!();
        println!("  Top senders:");
        for (sender, count) in &summary.top_senders {
            println!("    {count:>6}  {sender}");
        }
    }
    if !summary.top_attachment_types.is_empty() {
        println!();
        println!("  Top attachment types:");
        for (content_type, count) in &summary.top_attachment_types {
            println!("    {count:>6}  {content_type}");
        }
    }
    if !summary.failed.is_empty() {
        println!();
        println!("  Failed files:");
        for failed in &summary.failed {
            println!("    {}: {}", failed.file, failed.error);
        }
    }
    println!();
}

fn print_outputs(raw: Option<&Path>, settings: &PipelineConfig) {
    if let Some(raw) = raw {
        println!("  {:<22} {}", "Raw corpus", raw.display());
    }
    println!(
        "  {:<22} {}",
        "Normalized corpus",
        settings.normalized_output.display()
    );
    if let Some(ref csv) = settings.csv_output {
        println!("  {:<22} {}", "CSV export", csv.display());
    }
    println!();
}

/// Print a run summary as JSON.
fn print_summary_json(summary: &RunSummary, elapsed: std::time::Duration) -> anyhow::Result<()> {
    let mut stats = serde_json::to_value(summary)?;
    if let Some(object) = stats.as_object_mut() {
        object.insert(
            "elapsed_ms".to_string(),
            serde_json::json!(elapsed.as_millis() as u64),
        );
    }
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
