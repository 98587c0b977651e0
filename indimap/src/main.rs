use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indimap_core::{MappingSet, PreviewConfig, Previewer};
use log::{LevelFilter, info};
use std::path::PathBuf;

mod formatter;

#[derive(Parser)]
#[command(name = "indimap")]
#[command(about = "Preview indicator values mapped from HC/HOSP workbooks", long_about = None)]
#[command(version)]
struct Cli {
    /// Mapping rules and indicator catalog (JSON or TOML)
    #[arg(short, long, value_name = "RULES")]
    rules: PathBuf,

    /// Health-center workbook
    #[arg(long, value_name = "FILE", required_unless_present = "hosp")]
    hc: Option<PathBuf>,

    /// Hospital workbook
    #[arg(long, value_name = "FILE")]
    hosp: Option<PathBuf>,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormat,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for further processing
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        PreviewConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        // Try to load default config from current directory if it exists
        let default_config_path = PathBuf::from("indimap.toml");
        if default_config_path.exists() {
            PreviewConfig::from_file(&default_config_path).with_context(|| {
                format!(
                    "Failed to load config from {}",
                    default_config_path.display()
                )
            })?
        } else {
            PreviewConfig::default()
        }
    };

    let set = MappingSet::from_file(&cli.rules)
        .with_context(|| format!("Failed to load mapping rules from {}", cli.rules.display()))?;
    info!(
        "loaded {} rules and {} indicators",
        set.rules.len(),
        set.indicators.len()
    );

    let previewer = Previewer::with_config(config);
    let report = previewer.preview_files(cli.hc.as_deref(), cli.hosp.as_deref(), &set)?;

    match cli.format {
        OutputFormat::Human => {
            formatter::print_human(cli.hc.as_deref(), cli.hosp.as_deref(), &report);
        }
        OutputFormat::Json => {
            formatter::print_json(cli.hc.as_deref(), cli.hosp.as_deref(), &report)?;
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise warnings plus one level per `-v`
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}
