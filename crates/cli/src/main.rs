use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use dashmetrics_core::aggregate::{SourcePaths, Sources};
use dashmetrics_core::split::{COMPLETE_KEY, INCOMPLETE_KEY, load_records};
use dashmetrics_core::{
    Aggregator, ColumnBinding, DEFAULT_REQUIRED, Document, Extractor, Family, JsonFormatter, Period, Platform,
    combine_behavior, combine_retention, load_config, split_by_completeness,
};
use owo_colors::OwoColorize;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod echo;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Extract app analytics from saved dashboard pages and merge them per application
#[derive(Parser, Debug)]
#[command(name = "dashmetrics")]
#[command(version)]
#[command(about = "Extract app analytics from saved dashboard pages", long_about = None)]
struct Cli {
    /// Extraction config file (default: <config dir>/dashmetrics/config.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract downloads and basic metrics from an overview page
    Downloads {
        /// Saved overview page
        #[arg(value_name = "HTML")]
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Extract revenue by device
    Revenue {
        /// Saved revenue page
        #[arg(value_name = "HTML")]
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Extract per-country user behavior for one or both platforms
    Behavior {
        /// Saved Android behavior page
        #[arg(long, value_name = "HTML")]
        android: Option<PathBuf>,

        /// Saved iOS behavior page
        #[arg(long, value_name = "HTML")]
        ios: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Extract monthly and overall retention for one or both platforms
    Retention {
        /// Saved Android retention page
        #[arg(long, value_name = "HTML")]
        android: Option<PathBuf>,

        /// Saved iOS retention page
        #[arg(long, value_name = "HTML")]
        ios: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Merge per-family JSON documents into one application record
    Aggregate {
        /// Downloads document
        #[arg(long, value_name = "JSON")]
        downloads: Option<PathBuf>,

        /// Revenue document (repeatable; later files win per platform)
        #[arg(long, value_name = "JSON")]
        revenue: Vec<PathBuf>,

        /// Behavior document
        #[arg(long, value_name = "JSON")]
        behavior: Option<PathBuf>,

        /// Retention document
        #[arg(long, value_name = "JSON")]
        retention: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Remove platforms, families, countries or periods from aggregated records
    Clean {
        /// Aggregated record files
        #[arg(value_name = "JSON", required = true)]
        inputs: Vec<PathBuf>,

        /// Platform bucket to drop (e.g. Android, iOS)
        #[arg(long = "drop-platform", value_name = "PLATFORM")]
        platforms: Vec<String>,

        /// Metric family to drop
        #[arg(long = "drop-family", value_name = "FAMILY")]
        families: Vec<Family>,

        /// Country/Region row to drop from the behavior data
        #[arg(long = "drop-country", value_name = "COUNTRY")]
        countries: Vec<String>,

        /// Only drop countries from this platform bucket
        #[arg(long = "country-platform", value_name = "PLATFORM", requires = "countries")]
        country_platform: Option<String>,

        /// Year or month of trend and monthly retention data to drop
        #[arg(long = "drop-period", value_name = "YYYY[-MM]")]
        periods: Vec<Period>,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Split aggregated records into complete and incomplete sets
    Split {
        /// Aggregated record files
        #[arg(value_name = "JSON", required = true)]
        inputs: Vec<PathBuf>,

        /// Directory receiving the two envelope files
        #[arg(long, value_name = "DIR")]
        out_dir: PathBuf,

        /// Families a record needs to be complete (default: downloads, revenue, behavior)
        #[arg(long = "require", value_name = "FAMILY")]
        required: Vec<Family>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Reads and parses one saved page.
fn read_page(path: &Path, verbose: bool) -> anyhow::Result<Document> {
    if !path.exists() {
        bail!("Input file not found: {}", path.display());
    }
    let html = fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    let doc = Document::parse(&html);
    debug!(path = %path.display(), bytes = html.len(), "page parsed");

    if verbose {
        echo::print_step(&format!("Parsing {}", path.display().bright_white()));
        eprintln!("  {} {}", "Size:".dimmed(), echo::format_size(html.len()).bright_white());
        if let Some(title) = doc.title() {
            eprintln!("  {} {}", "Title:".dimmed(), title.bright_white());
        }
    }

    Ok(doc)
}

/// Writes `value` as JSON to `output`, or stdout.
fn emit<T: Serialize + ?Sized>(value: &T, output: Option<&Path>) -> anyhow::Result<()> {
    let formatter = JsonFormatter::default();
    match output {
        Some(path) => {
            formatter
                .write(path, value)
                .with_context(|| format!("Failed to write to file: {}", path.display()))?;
            echo::print_success(&format!("Output written to {}", path.display().bright_white()));
        }
        None => {
            let text = formatter.convert(value).context("Failed to serialise output")?;
            print!("{}", text);
        }
    }
    Ok(())
}

/// Reads every given platform page, failing before any extraction if one is
/// missing.
fn platform_pages(
    android: Option<&Path>, ios: Option<&Path>, verbose: bool,
) -> anyhow::Result<Vec<(Platform, Document)>> {
    if android.is_none() && ios.is_none() {
        bail!("At least one of --android or --ios is required");
    }
    [(Platform::Android, android), (Platform::Ios, ios)]
        .into_iter()
        .filter_map(|(platform, path)| path.map(|p| (platform, p)))
        .map(|(platform, path)| read_page(path, verbose).map(|doc| (platform, doc)))
        .collect()
}

fn report_bindings(platform: Platform, bindings: &[ColumnBinding]) {
    for binding in bindings {
        match binding {
            ColumnBinding::Guessed { field, key, pattern } => echo::print_warning(&format!(
                "{}: {} guessed from key {} (pattern {:?})",
                platform,
                field.name(),
                key,
                pattern
            )),
            ColumnBinding::Missing { field } => {
                echo::print_warning(&format!("{}: no column for {}", platform, field.name()))
            }
            ColumnBinding::Header { .. } => {}
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        echo::print_banner();
    }

    let config = load_config(cli.config.as_deref()).context("Failed to load config")?;
    let extractor = Extractor::with_config(config.clone()).context("Invalid selector configuration")?;

    match cli.command {
        Command::Downloads { input, output } => {
            let doc = read_page(&input, cli.verbose)?;
            let downloads = extractor.downloads(&doc);
            if downloads.is_empty() {
                warn!(path = %input.display(), "no downloads rows found");
            }
            if cli.verbose {
                echo::print_info(&format!("{} applications", downloads.len()));
            }
            emit(&downloads, output.as_deref())?;
        }
        Command::Revenue { input, output } => {
            let doc = read_page(&input, cli.verbose)?;
            let report = extractor.revenue(&doc);
            if cli.verbose {
                echo::print_info(&format!("{} on {}: {} rows", report.application, report.platform, report.rows.len()));
            }
            emit(&report, output.as_deref())?;
        }
        Command::Behavior { android, ios, output } => {
            let pages = platform_pages(android.as_deref(), ios.as_deref(), cli.verbose)?;
            let mut reports = Vec::with_capacity(pages.len());
            for (platform, doc) in &pages {
                let extraction = extractor.behavior(doc, *platform);
                if cli.verbose {
                    report_bindings(*platform, &extraction.bindings);
                }
                if extraction.report.platform != platform.store_label() {
                    debug!(%platform, inferred = %extraction.report.platform, "page storefront differs from flag");
                }
                reports.push((*platform, extraction.report));
            }

            let combined = combine_behavior(reports).context("No behavior report produced")?;
            emit(&combined, output.as_deref())?;
        }
        Command::Retention { android, ios, output } => {
            let pages = platform_pages(android.as_deref(), ios.as_deref(), cli.verbose)?;
            let reports = pages.iter().map(|(platform, doc)| (*platform, extractor.retention(doc)));
            let combined = combine_retention(reports).context("No retention report produced")?;
            emit(&combined, output.as_deref())?;
        }
        Command::Aggregate { downloads, revenue, behavior, retention, output } => {
            let paths = SourcePaths { downloads, revenue, behavior, retention };
            let sources = Sources::load(&paths);
            if sources.is_empty() {
                warn!("no source document could be read");
            }

            let record = Aggregator::from_config(&config).aggregate(&sources, OffsetDateTime::now_utc());
            if cli.verbose {
                for family in Family::ALL {
                    let availability = format!("{:?}", record.data_sources.get(family));
                    eprintln!("  {} {}", format!("{}:", family).dimmed(), availability.bright_white());
                }
            }
            emit(std::slice::from_ref(&record), output.as_deref())?;
        }
        Command::Clean { inputs, platforms, families, countries, country_platform, periods, output } => {
            let mut records = load_records(&inputs).context("Failed to read aggregated records")?;
            let mut removed = 0;
            for record in &mut records {
                for family in &families {
                    removed += record.remove_family(*family);
                }
                if !countries.is_empty() {
                    removed += record.remove_countries(countries.as_slice(), country_platform.as_deref());
                }
                for period in &periods {
                    removed += record.remove_period(*period);
                }
                for platform in &platforms {
                    if record.remove_platform(platform) {
                        removed += 1;
                    } else {
                        warn!(application = %record.application, %platform, "platform not found");
                    }
                }
            }
            info!(records = records.len(), removed, "records cleaned");
            if cli.verbose {
                echo::print_info(&format!("{} entries removed from {} records", removed, records.len()));
            }
            emit(&records, output.as_deref())?;
        }
        Command::Split { inputs, out_dir, required } => {
            let records = load_records(&inputs).context("Failed to read aggregated records")?;
            let required = if required.is_empty() { DEFAULT_REQUIRED.to_vec() } else { required };
            let split = split_by_completeness(records, &required);
            let (complete, incomplete) = split.envelopes(OffsetDateTime::now_utc());

            for (key, envelope) in [(COMPLETE_KEY, &complete), (INCOMPLETE_KEY, &incomplete)] {
                let path = out_dir.join(format!("{}.json", key));
                emit(envelope, Some(&path))?;
            }
            echo::print_info(&format!(
                "{} complete, {} incomplete",
                split.complete.len(),
                split.incomplete.len()
            ));
            if cli.verbose {
                let labels: Vec<&str> = required.iter().map(|f| f.source_label()).collect();
                eprintln!("  {} {}", "Required:".dimmed(), labels.join(", ").bright_white());
            }
        }
    }

    Ok(())
}
