//! Statistical discovery engine.
//!
//! Eight independent analyses run over a borrowed [`Dataset`], each
//! contributing zero or more [`Discovery`] records. An analysis whose
//! columns did not resolve contributes nothing; none of them can fail.
//! Results are ordered by [`DiscoveryCategory`] declaration order and,
//! within a category, by the order each analysis emits them.

mod outliers;
mod patterns;
mod relationships;
mod risk;

use std::{collections::BTreeMap, fmt};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    columns::{ColumnResolver, SemanticColumns},
    dataset::Dataset,
    policy::AnalysisPolicy,
};

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryCategory {
    Correlations,
    Segments,
    Anomalies,
    Opportunities,
    Risks,
    FinancialPatterns,
    AcademicPatterns,
    MarketPatterns,
}

impl DiscoveryCategory {
    pub const ALL: [DiscoveryCategory; 8] = [
        DiscoveryCategory::Correlations,
        DiscoveryCategory::Segments,
        DiscoveryCategory::Anomalies,
        DiscoveryCategory::Opportunities,
        DiscoveryCategory::Risks,
        DiscoveryCategory::FinancialPatterns,
        DiscoveryCategory::AcademicPatterns,
        DiscoveryCategory::MarketPatterns,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryCategory::Correlations => "correlations",
            DiscoveryCategory::Segments => "segments",
            DiscoveryCategory::Anomalies => "anomalies",
            DiscoveryCategory::Opportunities => "opportunities",
            DiscoveryCategory::Risks => "risks",
            DiscoveryCategory::FinancialPatterns => "financial_patterns",
            DiscoveryCategory::AcademicPatterns => "academic_patterns",
            DiscoveryCategory::MarketPatterns => "market_patterns",
        }
    }

    /// Short human label used in names and digests.
    pub fn keyword(&self) -> &'static str {
        match self {
            DiscoveryCategory::Correlations => "Relationship",
            DiscoveryCategory::Segments => "Segment",
            DiscoveryCategory::Anomalies => "Anomaly",
            DiscoveryCategory::Opportunities => "Opportunity",
            DiscoveryCategory::Risks => "Risk",
            DiscoveryCategory::FinancialPatterns => "Financial",
            DiscoveryCategory::AcademicPatterns => "Academic",
            DiscoveryCategory::MarketPatterns => "Market",
        }
    }

    pub fn position(&self) -> usize {
        Self::ALL.iter().position(|c| c == self).unwrap_or(Self::ALL.len())
    }
}

impl fmt::Display for DiscoveryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

impl Severity {
    /// Buckets `value` by strictly-greater-than thresholds, highest tier first.
    pub fn classify(value: f64, critical: Option<f64>, high: f64, moderate: f64) -> Self {
        if critical.is_some_and(|limit| value > limit) {
            Severity::Critical
        } else if value > high {
            Severity::High
        } else if value > moderate {
            Severity::Moderate
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Moderate => "moderate",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric evidence behind a discovery. `columns` lists every dataset
/// column the numbers were computed from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub columns: Vec<String>,
}

impl Evidence {
    pub fn from_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn percentage(mut self, percentage: f64) -> Self {
        self.percentage = Some(percentage);
        self
    }

    pub fn amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn correlation(mut self, correlation: f64) -> Self {
        self.correlation = Some(correlation);
        self
    }

    pub fn variance(mut self, variance: f64) -> Self {
        self.variance = Some(variance);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn metric(mut self, name: &str, value: f64) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }

    pub fn label(mut self, name: &str, value: impl Into<String>) -> Self {
        self.labels.insert(name.to_string(), value.into());
        self
    }

    pub fn get_metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    pub category: DiscoveryCategory,
    pub key: String,
    pub insight: String,
    pub evidence: Evidence,
}

impl Discovery {
    pub fn new(
        category: DiscoveryCategory,
        key: impl Into<String>,
        insight: impl Into<String>,
        evidence: Evidence,
    ) -> Self {
        Self {
            category,
            key: key.into(),
            insight: insight.into(),
            evidence,
        }
    }
}

/// Everything one analysis needs, borrowed for the duration of a run.
pub(crate) struct Scope<'a> {
    pub dataset: &'a Dataset,
    pub policy: &'a AnalysisPolicy,
    pub columns: &'a SemanticColumns,
}

type Analysis = fn(&Scope<'_>) -> Vec<Discovery>;

const ANALYSES: [(DiscoveryCategory, Analysis); 8] = [
    (DiscoveryCategory::Correlations, relationships::correlations),
    (DiscoveryCategory::Segments, relationships::segments),
    (DiscoveryCategory::Anomalies, outliers::anomalies),
    (DiscoveryCategory::Opportunities, outliers::opportunities),
    (DiscoveryCategory::Risks, risk::risks),
    (DiscoveryCategory::FinancialPatterns, patterns::financial),
    (DiscoveryCategory::AcademicPatterns, patterns::academic),
    (DiscoveryCategory::MarketPatterns, patterns::market),
];

pub struct DiscoveryEngine<'a> {
    dataset: &'a Dataset,
    policy: &'a AnalysisPolicy,
    columns: SemanticColumns,
}

impl<'a> DiscoveryEngine<'a> {
    pub fn new(
        dataset: &'a Dataset,
        resolver: &ColumnResolver,
        policy: &'a AnalysisPolicy,
    ) -> Self {
        Self {
            dataset,
            policy,
            columns: SemanticColumns::resolve(resolver, dataset),
        }
    }

    pub fn with_columns(
        dataset: &'a Dataset,
        columns: SemanticColumns,
        policy: &'a AnalysisPolicy,
    ) -> Self {
        Self {
            dataset,
            policy,
            columns,
        }
    }

    pub fn columns(&self) -> &SemanticColumns {
        &self.columns
    }

    /// Runs all eight analyses and returns a fresh, fully replaced set.
    pub fn run(&self) -> Vec<Discovery> {
        let scope = Scope {
            dataset: self.dataset,
            policy: self.policy,
            columns: &self.columns,
        };
        let mut discoveries = Vec::new();
        for (category, analysis) in ANALYSES {
            let found = analysis(&scope);
            debug!("{category}: {} discovery(ies)", found.len());
            debug_assert!(found.iter().all(|d| d.category == category));
            discoveries.extend(
                found
                    .into_iter()
                    .filter(|d| d.evidence.columns.iter().all(|c| self.dataset.has_column(c))),
            );
        }
        discoveries
    }

    pub fn run_category(&self, category: DiscoveryCategory) -> Vec<Discovery> {
        let scope = Scope {
            dataset: self.dataset,
            policy: self.policy,
            columns: &self.columns,
        };
        ANALYSES
            .iter()
            .filter(|(c, _)| *c == category)
            .flat_map(|(_, analysis)| analysis(&scope))
            .collect()
    }
}

pub fn by_category(discoveries: &[Discovery], category: DiscoveryCategory) -> Vec<&Discovery> {
    discoveries
        .iter()
        .filter(|d| d.category == category)
        .collect()
}

pub(crate) fn fmt_pct(value: f64) -> String {
    format!("{value:.1}%")
}

pub(crate) fn fmt_amount(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}
