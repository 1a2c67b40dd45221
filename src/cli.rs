use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::visualize::AnalysisContext;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Discover statistical insights in CSV data and narrate them",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run discovery, chart selection, enrichment and journey synthesis, writing a JSON report
    Analyze(AnalyzeArgs),
    /// Print the statistical discoveries for a CSV file as a table
    Discover(DiscoverArgs),
    /// Show which headers the semantic columns resolve to
    Columns(ColumnsArgs),
    /// Show the detected hardware profile and the tuned generation parameters
    Tier(TierArgs),
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Input CSV file to analyse (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Output JSON report (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Analysis context that drives chart selection and finding priority
    #[arg(long, value_enum, default_value_t = AnalysisContext::Overview)]
    pub context: AnalysisContext,
    /// YAML configuration file (gateway, policy, aliases, currency)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Skip all model calls and use the statistical fallbacks
    #[arg(long)]
    pub offline: bool,
    /// Model endpoint URL, overriding the configuration file
    #[arg(long)]
    pub endpoint: Option<String>,
    /// Model name, overriding the configuration file
    #[arg(long)]
    pub model: Option<String>,
    /// Tune generation parameters to the detected hardware
    #[arg(long = "auto-tune")]
    pub auto_tune: bool,
    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
    /// Number of journeys to write six-part story narratives for
    #[arg(long, default_value_t = 0)]
    pub narratives: usize,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Input CSV file to analyse (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// YAML configuration file (policy thresholds and aliases are used)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Emit the discoveries as JSON instead of a table
    #[arg(long)]
    pub json: bool,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ColumnsArgs {
    /// Input CSV file to inspect (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// YAML configuration file with extra aliases
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct TierArgs {
    /// Model endpoint the parameters would be sent to
    #[arg(long)]
    pub endpoint: Option<String>,
    /// YAML configuration file
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
