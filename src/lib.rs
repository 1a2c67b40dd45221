pub mod cli;
pub mod columns;
pub mod config;
pub mod data;
pub mod dataset;
pub mod discovery;
pub mod frequency;
pub mod gateway;
pub mod io_utils;
pub mod journey;
pub mod metrics;
pub mod narrative;
pub mod parser;
pub mod pipeline;
pub mod policy;
pub mod report;
pub mod stats;
pub mod table;
pub mod visualize;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{AnalyzeArgs, Cli, Commands, DiscoverArgs, TierArgs},
    columns::{ColumnResolver, SemanticColumns},
    config::AppConfig,
    dataset::Dataset,
    discovery::DiscoveryEngine,
    gateway::{
        GenerationRequest, HardwareProfile, OfflineGateway, OllamaGateway, TextGenerator,
        effective_params,
    },
    journey::JourneySynthesizer,
    metrics::MetricSnapshot,
    narrative::NarrativeGenerator,
    pipeline::{Pipeline, PipelineInputs},
    report::AnalysisReport,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_insights", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze(args) => handle_analyze(&args),
        Commands::Discover(args) => handle_discover(&args),
        Commands::Columns(args) => columns::execute(&args),
        Commands::Tier(args) => handle_tier(&args),
    }
}

pub fn load_dataset(path: &Path, delimiter: Option<u8>, encoding: Option<&str>) -> Result<Dataset> {
    let delimiter = io_utils::resolve_input_delimiter(path, delimiter);
    let encoding = io_utils::resolve_encoding(encoding)?;
    info!(
        "Reading '{}' with delimiter '{}' ({})",
        path.display(),
        printable_delimiter(delimiter),
        encoding.name()
    );
    dataset::load_csv(path, delimiter, encoding)
}

fn apply_gateway_overrides(config: &mut AppConfig, args: &AnalyzeArgs) {
    if let Some(endpoint) = &args.endpoint {
        config.gateway.endpoint = endpoint.clone();
    }
    if let Some(model) = &args.model {
        config.gateway.model = model.clone();
    }
    if let Some(timeout) = args.timeout {
        config.gateway.timeout_secs = timeout;
    }
    if args.auto_tune {
        config.gateway.auto_tune = true;
    }
}

fn handle_analyze(args: &AnalyzeArgs) -> Result<()> {
    let mut config = AppConfig::load_optional(args.config.as_deref())?;
    apply_gateway_overrides(&mut config, args);
    let dataset = load_dataset(&args.input, args.delimiter, args.input_encoding.as_deref())
        .with_context(|| format!("Loading dataset from {:?}", args.input))?;

    let resolver = ColumnResolver::new(config.alias_table());
    let semantic_columns = SemanticColumns::resolve(&resolver, &dataset);
    debug!("Semantic columns: {semantic_columns:?}");
    let discoveries =
        DiscoveryEngine::with_columns(&dataset, semantic_columns.clone(), &config.policy).run();
    let metrics = MetricSnapshot::from_dataset(&dataset, &semantic_columns);
    info!(
        "{} discovery(ies) and {} metric(s) computed",
        discoveries.len(),
        metrics.len()
    );

    let gateway: Box<dyn TextGenerator> = if args.offline {
        info!("Offline mode: statistical fallbacks only");
        Box::new(OfflineGateway)
    } else {
        info!(
            "Using model '{}' at {}",
            config.gateway.model, config.gateway.endpoint
        );
        Box::new(OllamaGateway::new(config.gateway.clone()))
    };

    let inputs = PipelineInputs {
        dataset: &dataset,
        metrics: &metrics,
        discoveries: &discoveries,
        columns: &semantic_columns,
    };
    let state = Pipeline::new(inputs, gateway.as_ref(), config.gateway.clone())
        .with_currency(config.currency.as_str())
        .run(args.context)
        .with_context(|| format!("Analysing {:?}", args.input))?;

    let journeys = JourneySynthesizer::new(gateway.as_ref(), config.gateway.clone())
        .with_currency(config.currency.as_str())
        .synthesize(&discoveries, &metrics);

    let narratives = if args.narratives > 0 {
        NarrativeGenerator::new(gateway.as_ref(), config.gateway.clone())
            .with_currency(config.currency.as_str())
            .narrate_journeys(&journeys.journeys, &discoveries, &metrics, args.narratives)
    } else {
        Vec::new()
    };

    info!(
        "Report: {} chart(s), {} finding(s), {} recommendation(s), {} journey(s), {} narrative(s)",
        state.visualizations.len(),
        state.findings.len(),
        state.recommendations.len(),
        journeys.journeys.len(),
        narratives.len()
    );
    AnalysisReport::assemble(state, journeys, metrics, discoveries, narratives)
        .write(args.output.as_deref())
}

fn handle_discover(args: &DiscoverArgs) -> Result<()> {
    let config = AppConfig::load_optional(args.config.as_deref())?;
    let dataset = load_dataset(&args.input, args.delimiter, args.input_encoding.as_deref())
        .with_context(|| format!("Loading dataset from {:?}", args.input))?;
    let resolver = ColumnResolver::new(config.alias_table());
    let discoveries = DiscoveryEngine::new(&dataset, &resolver, &config.policy).run();
    if args.json {
        let json = serde_json::to_string_pretty(&discoveries).context("Serialising discoveries")?;
        io_utils::write_output(None, &json)?;
    } else {
        report::print_discoveries(&discoveries);
    }
    info!("{} discovery(ies) found", discoveries.len());
    Ok(())
}

fn handle_tier(args: &TierArgs) -> Result<()> {
    let config = AppConfig::load_optional(args.config.as_deref())?;
    let endpoint = args
        .endpoint
        .clone()
        .unwrap_or_else(|| config.gateway.endpoint.clone());
    let hardware = HardwareProfile::detect();
    let request = GenerationRequest::from_config(String::new(), &config.gateway).auto_tune(true);
    let params = effective_params(&request, &hardware, &endpoint);

    let optional = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
    let rows = vec![
        vec!["cpus".to_string(), hardware.cpus.to_string()],
        vec![
            "memory_gib".to_string(),
            optional(hardware.memory_gib.map(|m| format!("{m:.1}"))),
        ],
        vec!["gpu".to_string(), hardware.gpu.to_string()],
        vec!["tier".to_string(), format!("{:?}", hardware.tier()).to_lowercase()],
        vec!["endpoint".to_string(), endpoint.clone()],
        vec!["remote".to_string(), params.remote.to_string()],
        vec!["num_ctx".to_string(), params.num_ctx.to_string()],
        vec!["num_predict".to_string(), params.num_predict.to_string()],
        vec![
            "num_thread".to_string(),
            optional(params.num_thread.map(|t| t.to_string())),
        ],
        vec![
            "num_batch".to_string(),
            optional(params.num_batch.map(|b| b.to_string())),
        ],
        vec![
            "timeout_secs".to_string(),
            params.timeout.as_secs().to_string(),
        ],
    ];
    table::print_table(&["setting".to_string(), "value".to_string()], &rows);
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
