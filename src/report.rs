//! The JSON report handed to presentation layers, plus the discovery listing.
//!
//! The first four fields (`visualizations`, `findings`, `recommendations`,
//! `journeys`) are the contract consumers rely on; the rest is context.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::{
    discovery::Discovery,
    io_utils,
    journey::{Journey, JourneySet},
    metrics::MetricSnapshot,
    narrative::StoryNarrative,
    pipeline::{CallCounters, PipelineState, Source},
    table,
    visualize::{AnalysisContext, VisualizationSpec},
};

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub visualizations: Vec<VisualizationSpec>,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub journeys: Vec<Journey>,
    pub context: AnalysisContext,
    pub generated_at: String,
    pub journey_origin: Source,
    pub metrics: MetricSnapshot,
    pub discoveries: Vec<Discovery>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub narratives: Vec<StoryNarrative>,
    pub model_calls: CallCounters,
}

impl AnalysisReport {
    pub fn assemble(
        state: PipelineState,
        journeys: JourneySet,
        metrics: MetricSnapshot,
        discoveries: Vec<Discovery>,
        narratives: Vec<StoryNarrative>,
    ) -> Self {
        Self {
            findings: state.findings.into_iter().map(|f| f.text).collect(),
            recommendations: state.recommendations.into_iter().map(|r| r.text).collect(),
            visualizations: state.visualizations,
            journeys: journeys.journeys,
            context: state.context,
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            journey_origin: journeys.origin,
            metrics,
            discoveries,
            narratives,
            model_calls: state.counters,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Serialising analysis report")
    }

    pub fn write(&self, path: Option<&Path>) -> Result<()> {
        io_utils::write_output(path, &self.to_json()?)
    }
}

pub fn discovery_headers() -> Vec<String> {
    ["category", "key", "severity", "columns", "insight"]
        .iter()
        .map(|h| h.to_string())
        .collect()
}

pub fn discovery_rows(discoveries: &[Discovery]) -> Vec<Vec<String>> {
    discoveries
        .iter()
        .map(|d| {
            vec![
                d.category.as_str().to_string(),
                d.key.clone(),
                d.evidence
                    .severity
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_else(|| "-".to_string()),
                d.evidence.columns.join(","),
                d.insight.clone(),
            ]
        })
        .collect()
}

pub fn print_discoveries(discoveries: &[Discovery]) {
    table::print_table(&discovery_headers(), &discovery_rows(discoveries));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{DiscoveryCategory, Evidence, Severity};

    #[test]
    fn rows_show_dash_without_severity() {
        let discoveries = vec![
            Discovery::new(
                DiscoveryCategory::Risks,
                "nationality_concentration",
                "Top 3 nationalities hold 66.0% of records",
                Evidence::from_columns(["nationality"]).severity(Severity::High),
            ),
            Discovery::new(
                DiscoveryCategory::AcademicPatterns,
                "gpa_distribution",
                "Most records sit in the 3.0-3.5 band",
                Evidence::from_columns(["gpa"]),
            ),
        ];
        let rows = discovery_rows(&discoveries);
        assert_eq!(rows[0][2], "high");
        assert_eq!(rows[1][2], "-");
        assert_eq!(rows[1][0], "academic_patterns");
    }
}
