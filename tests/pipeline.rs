mod common;

use clap::ValueEnum;
use csv_insights::columns::{AliasTable, ColumnResolver, SemanticColumns};
use csv_insights::discovery::DiscoveryEngine;
use csv_insights::gateway::{GatewayConfig, GatewayError};
use csv_insights::journey::{JourneySynthesizer, MIN_JOURNEYS};
use csv_insights::metrics::MetricSnapshot;
use csv_insights::pipeline::{
    FINDING_COUNT, Phase, Pipeline, PipelineError, PipelineInputs, PipelineState,
    RECOMMENDATION_COUNT, Source,
};
use csv_insights::policy::AnalysisPolicy;
use csv_insights::visualize::AnalysisContext;

use common::{FailingGateway, ScriptedGateway, dataset_from_rows, student_dataset};

struct Prepared {
    dataset: csv_insights::dataset::Dataset,
    columns: SemanticColumns,
    metrics: MetricSnapshot,
    discoveries: Vec<csv_insights::discovery::Discovery>,
}

fn prepare(dataset: csv_insights::dataset::Dataset) -> Prepared {
    let resolver = ColumnResolver::new(AliasTable::builtin());
    let columns = SemanticColumns::resolve(&resolver, &dataset);
    let policy = AnalysisPolicy::default();
    let discoveries = DiscoveryEngine::with_columns(&dataset, columns.clone(), &policy).run();
    let metrics = MetricSnapshot::from_dataset(&dataset, &columns);
    Prepared {
        dataset,
        columns,
        metrics,
        discoveries,
    }
}

impl Prepared {
    fn inputs(&self) -> PipelineInputs<'_> {
        PipelineInputs {
            dataset: &self.dataset,
            metrics: &self.metrics,
            discoveries: &self.discoveries,
            columns: &self.columns,
        }
    }
}

#[test]
fn failing_gateway_still_yields_complete_output_in_every_context() {
    let prepared = prepare(student_dataset(300));
    for context in AnalysisContext::value_variants() {
        let gateway = FailingGateway::default();
        let state = Pipeline::new(prepared.inputs(), &gateway, GatewayConfig::default())
            .run(*context)
            .expect("non-empty dataset");
        assert!(state.is_complete());
        assert!(!state.visualizations.is_empty(), "{context}");
        assert!(
            state
                .visualizations
                .iter()
                .all(|v| v.insight.as_deref().is_some_and(|i| !i.is_empty()))
        );
        assert_eq!(state.findings.len(), FINDING_COUNT);
        assert_eq!(state.recommendations.len(), RECOMMENDATION_COUNT);
        assert!(state.findings.iter().all(|f| f.enrichment == Some(Source::Fallback)));
        assert!(state.recommendations.iter().all(|r| r.text.contains("Action:")));
        assert_eq!(state.counters.model_answers, 0);
        assert_eq!(gateway.calls(), state.counters.model_calls);

        let journeys = JourneySynthesizer::new(&gateway, GatewayConfig::default())
            .synthesize(&prepared.discoveries, &prepared.metrics);
        assert_eq!(journeys.origin, Source::Fallback);
        assert!(journeys.journeys.len() >= MIN_JOURNEYS);
    }
}

#[test]
fn sparse_dataset_still_produces_findings() {
    let rows = (0..12)
        .map(|i| vec![format!("{}", i * 2), format!("item {}", i % 3)])
        .collect::<Vec<_>>();
    let prepared = prepare(dataset_from_rows(&["weight", "label"], &rows));
    let gateway = FailingGateway::default();
    let state = Pipeline::new(prepared.inputs(), &gateway, GatewayConfig::default())
        .run(AnalysisContext::Financial)
        .expect("non-empty dataset");
    assert_eq!(state.findings.len(), FINDING_COUNT);
    assert_eq!(state.recommendations.len(), RECOMMENDATION_COUNT);
    assert!(state.findings.iter().all(|f| !f.text.is_empty()));
}

#[test]
fn fenced_model_answers_are_used() {
    let prepared = prepare(student_dataset(100));
    let reply = "```json\n{\"insight\": \"GPA clusters near 3.0\"}\n```";
    let gateway = ScriptedGateway::always(reply, 1);
    let state = Pipeline::new(prepared.inputs(), &gateway, GatewayConfig::default())
        .run(AnalysisContext::Academic)
        .expect("non-empty dataset");
    assert_eq!(state.visualizations[0].insight.as_deref(), Some("GPA clusters near 3.0"));
    assert_eq!(state.counters.model_answers, 1);
    assert!(gateway.prompts()[0].contains("Column statistics"));
}

#[test]
fn deep_enrichment_can_be_rerun_without_stacking_clauses() {
    let prepared = prepare(student_dataset(150));
    let gateway = FailingGateway::default();
    let pipeline = Pipeline::new(prepared.inputs(), &gateway, GatewayConfig::default());
    let mut state = PipelineState::new(AnalysisContext::Risk);
    for phase in Phase::ALL {
        pipeline.run_phase(phase, &mut state);
    }
    let first = state.findings.clone();
    pipeline.run_phase(Phase::DeepEnrichment, &mut state);
    assert_eq!(state.findings, first);
}

#[test]
fn enrichment_reply_with_root_cause_is_appended() {
    let prepared = prepare(student_dataset(150));
    let gateway = ScriptedGateway::new([
        Ok("{\"root_cause\": \"late withdrawals\", \"impact\": \"lower averages\"}".to_string()),
        Err(GatewayError::Status { status: 503 }),
    ]);
    let pipeline = Pipeline::new(prepared.inputs(), &gateway, GatewayConfig::default());
    let mut state = PipelineState::new(AnalysisContext::Overview);
    pipeline.run_phase(Phase::BasicFindings, &mut state);
    pipeline.run_phase(Phase::DeepEnrichment, &mut state);

    let first = &state.findings[0];
    assert_eq!(first.enrichment, Some(Source::Model));
    assert!(first.text.ends_with("Root cause: late withdrawals. Impact: lower averages."));
    assert_eq!(state.findings[1].enrichment, Some(Source::Fallback));
    assert!(state.findings[1].text.contains("Root cause:"));
    assert_eq!(state.counters.model_calls, FINDING_COUNT + RECOMMENDATION_COUNT);
}

#[test]
fn empty_dataset_is_rejected_before_any_phase() {
    let prepared = prepare(dataset_from_rows(&["gpa"], &[]));
    let gateway = FailingGateway::default();
    let result = Pipeline::new(prepared.inputs(), &gateway, GatewayConfig::default())
        .run(AnalysisContext::Overview);
    assert!(matches!(result, Err(PipelineError::EmptyDataset)));
    assert_eq!(gateway.calls(), 0);
}
