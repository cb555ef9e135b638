mod common;
mod config;
mod logic;
mod sources;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use pi_engine::{Language, SeedPartition};
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use common::split_csv;
use config::HarvestConfig;
use logic::{CollectRequest, Harvest, build_compendium, recompute_all, reports, run_collect};
use sources::SourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Colored terminal output
    Console,
    /// Pretty-printed JSON
    Json,
    /// Markdown tables
    Markdown,
}

#[derive(Debug, Parser)]
#[command(name = "pi-harvester", version)]
#[command(about = "Sweep procedural item seeds, score every roll and compile the compendium")]
struct Args {
    /// Harvester configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output root, overriding the configuration
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Collect one slice of the seed space for the selected items
    Collect {
        /// Zero-based slice to collect
        #[arg(long, default_value_t = 0)]
        iteration: u32,

        /// Number of slices the seed space is split into
        #[arg(long, default_value_t = 1)]
        iterations: u32,

        /// Items to collect (comma-separated inventories, ids or ids with tier)
        #[arg(long, default_value = "")]
        items: String,

        /// Where samples come from
        #[arg(long, value_enum, default_value_t = SourceKind::Recorded)]
        source: SourceKind,

        /// Directory holding `<ITEM>.jsonl` captures
        #[arg(long, default_value = "captures")]
        captures: PathBuf,

        /// Language the captured names are in
        #[arg(long, value_parser = parse_language)]
        language: Option<Language>,

        /// Concurrent item workers
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Rescore every stored table with the current catalog
    Recompute {
        /// Output report format
        #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
        report: ReportFormat,
    },
    /// Build the compendium from the stored tables
    Compile {
        /// Output report format
        #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
        report: ReportFormat,

        /// Optional path to write the report to instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Language of the names shown
        #[arg(long, value_parser = parse_language)]
        language: Option<Language>,
    },
    /// Print the selected catalog entries
    List {
        /// Items to list (comma-separated)
        #[arg(long, default_value = "")]
        items: String,
    },
}

fn parse_language(value: &str) -> Result<Language, String> {
    value.parse().map_err(|()| {
        let known: Vec<&str> = Language::ALL.iter().map(|l| l.code()).collect();
        format!("unknown language {value:?} (expected one of {})", known.join(", "))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = HarvestConfig::load(args.config.as_deref())?;
    if let Some(root) = &args.root {
        config.output_root.clone_from(root);
    }

    let failed = match args.command {
        Command::Collect {
            iteration,
            iterations,
            items,
            source,
            captures,
            language,
            workers,
        } => {
            if let Some(language) = language {
                config.language = language;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            config.validate().context("invalid harvester configuration")?;
            let partition = SeedPartition::new(iteration, iterations, config.total_seeds)?;
            let request = CollectRequest {
                partition,
                filters: split_csv(&items),
                source,
                captures,
            };
            collect(config, request).await?
        }
        Command::Recompute { report } => recompute(config, report)?,
        Command::Compile {
            report,
            output,
            language,
        } => {
            let language = language.unwrap_or(config.language);
            compile(config, report, output, language)?
        }
        Command::List { items } => {
            list(config, &items)?;
            false
        }
    };

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    if verbose && std::env::var_os("RUST_LOG").is_none() {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }
}

fn announce_banner() {
    println!("{}", "🛰  Procedural Item Harvester".bright_cyan().bold());
    println!("{}", "=============================".cyan());
}

async fn collect(config: HarvestConfig, request: CollectRequest) -> Result<bool> {
    announce_banner();
    let slice = request.partition.range();
    println!(
        "Slice {}/{} covers seeds {}..{}",
        request.partition.iteration + 1,
        request.partition.total_iterations,
        slice.start,
        slice.end
    );

    let harvest = Arc::new(Harvest::open(config)?);
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "🛑 Cancelling after the running items finish".yellow());
            flag.store(true, Ordering::SeqCst);
        }
    });

    let summary = run_collect(harvest, request, cancel).await?;
    let mut output_target = OutputTarget::new(None)?;
    reports::generate_batch_report(output_target.writer(), &summary)?;
    output_target.flush_inner()?;
    Ok(summary.outcomes.iter().any(logic::ItemOutcome::is_failure))
}

fn recompute(config: HarvestConfig, report: ReportFormat) -> Result<bool> {
    let harvest = Harvest::open(config)?;
    let summary = recompute_all(&harvest)?;
    let mut output_target = OutputTarget::new(None)?;
    match report {
        ReportFormat::Json => reports::generate_json_report(output_target.writer(), &summary)?,
        ReportFormat::Console => {
            reports::generate_recompute_report(output_target.writer(), &summary)?;
        }
        ReportFormat::Markdown => {
            reports::generate_recompute_markdown(output_target.writer(), &summary)?;
        }
    }
    output_target.flush_inner()?;
    Ok(false)
}

fn compile(
    config: HarvestConfig,
    report: ReportFormat,
    output: Option<PathBuf>,
    language: Language,
) -> Result<bool> {
    let harvest = Harvest::open(config)?;
    let compendium = build_compendium(&harvest, language)?;
    if output.is_some() {
        colored::control::set_override(false);
    }
    let mut output_target = OutputTarget::new(output)?;
    match report {
        ReportFormat::Console => reports::generate_console_report(&mut output_target, &compendium)?,
        ReportFormat::Json => reports::generate_json_report(&mut output_target, &compendium)?,
        ReportFormat::Markdown => reports::generate_markdown_report(&mut output_target, &compendium)?,
    }
    output_target.flush_inner()?;
    Ok(false)
}

fn list(config: HarvestConfig, items: &str) -> Result<()> {
    let harvest = Harvest::open(config)?;
    let tiers = harvest.catalog.select(&split_csv(items));
    let mut output_target = OutputTarget::new(None)?;
    writeln!(output_target.writer(), "Catalog entries ({}):", tiers.len())?;
    reports::generate_listing(output_target.writer(), &tiers)?;
    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "pi-harvester",
            "collect",
            "--iterations",
            "4",
            "--iteration",
            "3",
            "--items",
            "Suit,UP_JETX",
            "--source",
            "synthetic",
            "--root",
            "out",
            "--verbose",
        ])
        .unwrap();
        assert!(args.verbose);
        assert_eq!(args.root, Some(PathBuf::from("out")));
        match args.command {
            Command::Collect {
                iteration,
                iterations,
                items,
                source,
                ..
            } => {
                assert_eq!((iteration, iterations), (3, 4));
                assert_eq!(split_csv(&items), vec!["Suit", "UP_JETX"]);
                assert_eq!(source, SourceKind::Synthetic);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn language_codes_are_validated() {
        assert_eq!(parse_language("zh-Hans"), Ok(Language::ZhHans));
        assert!(parse_language("xx").unwrap_err().contains("en"));
    }

    #[test]
    fn output_target_writes_files() {
        let path = std::env::temp_dir().join(format!(
            "pi-output-{}/report.md",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        let mut target = OutputTarget::new(Some(path.clone())).unwrap();
        writeln!(target, "# Compendium").unwrap();
        target.flush_inner().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Compendium\n");
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
