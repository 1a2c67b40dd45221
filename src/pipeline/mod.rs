//! Four-phase narrative enrichment.
//!
//! 1. select visualizations for the context;
//! 2. ask the model for one insight per chart;
//! 3. derive three findings and three recommendations deterministically;
//! 4. ask the model to extend each finding and recommendation.
//!
//! Model calls are made one at a time. Every call that fails, or whose
//! output cannot be parsed, is replaced by a deterministic fallback, so a
//! run over a non-empty dataset always produces a complete result even
//! when the gateway never answers.
//!
//! All progress lives in a caller-owned [`PipelineState`]. Each phase reads
//! the previous phase's output from it and overwrites only its own output,
//! so any phase can be re-run on its own.

mod fallback;
mod findings;
mod prompts;

use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::{
    columns::SemanticColumns,
    dataset::Dataset,
    discovery::{Discovery, DiscoveryCategory, Evidence},
    gateway::{GatewayConfig, GenerationRequest, TextGenerator},
    metrics::MetricSnapshot,
    parser::{parse_structured, string_field},
    visualize::{AnalysisContext, select_visualizations},
};

pub use crate::visualize::VisualizationSpec;

pub const FINDING_COUNT: usize = 3;
pub const RECOMMENDATION_COUNT: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("cannot analyse an empty dataset")]
    EmptyDataset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Selection,
    ChartInsights,
    BasicFindings,
    DeepEnrichment,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::Selection,
        Phase::ChartInsights,
        Phase::BasicFindings,
        Phase::DeepEnrichment,
    ];
}

/// Where an item came from and the numbers its fallback enrichment needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<DiscoveryCategory>,
    pub key: String,
    pub evidence: Evidence,
}

impl ItemContext {
    pub fn from_discovery(discovery: &Discovery) -> Self {
        Self {
            category: Some(discovery.category),
            key: discovery.key.clone(),
            evidence: discovery.evidence.clone(),
        }
    }

    pub fn from_metric(key: &str, value: f64) -> Self {
        Self {
            category: None,
            key: key.to_string(),
            evidence: Evidence::default().metric(key, value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Model,
    Fallback,
}

/// A finding or recommendation. `text` always begins with `basic_text`;
/// enrichment only ever appends to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindingOrRecommendation {
    pub text: String,
    #[serde(skip)]
    pub basic_text: String,
    pub context: ItemContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Source>,
}

impl FindingOrRecommendation {
    pub fn new(text: impl Into<String>, context: ItemContext) -> Self {
        let text = text.into();
        Self {
            basic_text: text.clone(),
            text,
            context,
            enrichment: None,
        }
    }

    fn enrich(&mut self, clause: &str, source: Source) {
        self.text = format!("{} {}", self.basic_text, clause.trim());
        self.enrichment = Some(source);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallCounters {
    pub model_calls: usize,
    pub model_answers: usize,
    pub fallbacks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineState {
    pub context: AnalysisContext,
    pub visualizations: Vec<VisualizationSpec>,
    pub findings: Vec<FindingOrRecommendation>,
    pub recommendations: Vec<FindingOrRecommendation>,
    pub completed: Vec<Phase>,
    pub counters: CallCounters,
}

impl PipelineState {
    pub fn new(context: AnalysisContext) -> Self {
        Self {
            context,
            visualizations: Vec::new(),
            findings: Vec::new(),
            recommendations: Vec::new(),
            completed: Vec::new(),
            counters: CallCounters::default(),
        }
    }

    pub fn is_complete(&self) -> bool {
        Phase::ALL.iter().all(|phase| self.completed.contains(phase))
    }

    fn mark(&mut self, phase: Phase) {
        if !self.completed.contains(&phase) {
            self.completed.push(phase);
        }
    }
}

/// Read-only inputs shared by every phase of one run.
#[derive(Clone, Copy)]
pub struct PipelineInputs<'a> {
    pub dataset: &'a Dataset,
    pub metrics: &'a MetricSnapshot,
    pub discoveries: &'a [Discovery],
    pub columns: &'a SemanticColumns,
}

pub struct Pipeline<'a, G> {
    inputs: PipelineInputs<'a>,
    gateway: G,
    request: GatewayConfig,
    currency: String,
}

impl<'a, G: TextGenerator> Pipeline<'a, G> {
    pub fn new(inputs: PipelineInputs<'a>, gateway: G, request: GatewayConfig) -> Self {
        Self {
            inputs,
            gateway,
            request,
            currency: "AED".to_string(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Runs all four phases in order on a fresh state.
    pub fn run(&self, context: AnalysisContext) -> Result<PipelineState, PipelineError> {
        if self.inputs.dataset.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }
        let mut state = PipelineState::new(context);
        for phase in Phase::ALL {
            self.run_phase(phase, &mut state);
        }
        Ok(state)
    }

    pub fn run_phase(&self, phase: Phase, state: &mut PipelineState) {
        info!("Phase {phase:?} ({} context)", state.context);
        match phase {
            Phase::Selection => self.select(state),
            Phase::ChartInsights => self.chart_insights(state),
            Phase::BasicFindings => self.basic_findings(state),
            Phase::DeepEnrichment => self.deep_enrichment(state),
        }
        state.mark(phase);
    }

    fn select(&self, state: &mut PipelineState) {
        state.visualizations =
            select_visualizations(state.context, self.inputs.dataset, self.inputs.columns);
        info!("Selected {} visualization(s)", state.visualizations.len());
    }

    fn chart_insights(&self, state: &mut PipelineState) {
        for idx in 0..state.visualizations.len() {
            let spec = &state.visualizations[idx];
            let prompt = prompts::chart_prompt(spec, self.inputs.dataset, &self.currency);
            let insight = self
                .ask(Phase::ChartInsights, &spec.title, &prompt, &mut state.counters)
                .and_then(|value| string_field(&value, "insight"));
            let insight = match insight {
                Some(text) => {
                    state.counters.model_answers += 1;
                    text
                }
                None => {
                    debug!("Using statistical insight for chart '{}'", spec.title);
                    state.counters.fallbacks += 1;
                    fallback::chart_insight(
                        spec,
                        self.inputs.dataset,
                        self.inputs.columns,
                        &self.currency,
                    )
                }
            };
            state.visualizations[idx].insight = Some(insight);
        }
    }

    fn basic_findings(&self, state: &mut PipelineState) {
        let (findings, recommendations) = findings::derive(
            state.context,
            self.inputs.discoveries,
            self.inputs.metrics,
            self.inputs.columns,
            &self.currency,
        );
        debug_assert_eq!(findings.len(), FINDING_COUNT);
        debug_assert_eq!(recommendations.len(), RECOMMENDATION_COUNT);
        state.findings = findings;
        state.recommendations = recommendations;
    }

    fn deep_enrichment(&self, state: &mut PipelineState) {
        let mut findings = std::mem::take(&mut state.findings);
        for finding in &mut findings {
            let prompt = prompts::finding_prompt(
                state.context,
                finding,
                self.inputs.metrics,
                &self.currency,
            );
            let clause = self
                .ask(Phase::DeepEnrichment, &finding.context.key, &prompt, &mut state.counters)
                .and_then(|value| prompts::finding_clause(&value));
            self.apply(finding, clause, &mut state.counters, fallback::finding_clause);
        }
        state.findings = findings;

        let mut recommendations = std::mem::take(&mut state.recommendations);
        for recommendation in &mut recommendations {
            let prompt = prompts::recommendation_prompt(
                state.context,
                recommendation,
                self.inputs.metrics,
                &self.currency,
            );
            let clause = self
                .ask(
                    Phase::DeepEnrichment,
                    &recommendation.context.key,
                    &prompt,
                    &mut state.counters,
                )
                .and_then(|value| prompts::recommendation_clause(&value));
            self.apply(
                recommendation,
                clause,
                &mut state.counters,
                fallback::recommendation_clause,
            );
        }
        state.recommendations = recommendations;
    }

    fn apply(
        &self,
        item: &mut FindingOrRecommendation,
        clause: Option<String>,
        counters: &mut CallCounters,
        fallback: fn(&ItemContext, &str) -> String,
    ) {
        match clause {
            Some(clause) => {
                counters.model_answers += 1;
                item.enrich(&clause, Source::Model);
            }
            None => {
                debug!("Using templated enrichment for '{}'", item.context.key);
                counters.fallbacks += 1;
                let clause = fallback(&item.context, &self.currency);
                item.enrich(&clause, Source::Fallback);
            }
        }
    }

    /// One gateway call followed by structured parsing. Any failure is logged and yields `None`.
    fn ask(
        &self,
        phase: Phase,
        item: &str,
        prompt: &str,
        counters: &mut CallCounters,
    ) -> Option<serde_json::Value> {
        counters.model_calls += 1;
        let request = GenerationRequest::from_config(prompt, &self.request);
        match self.gateway.generate(&request) {
            Ok(text) => {
                let parsed = parse_structured(&text);
                if parsed.is_none() {
                    warn!(
                        "{phase:?} '{item}': model output could not be parsed ({} chars)",
                        text.len()
                    );
                }
                parsed
            }
            Err(err) => {
                warn!("{phase:?} '{item}': {err}");
                None
            }
        }
    }
}
