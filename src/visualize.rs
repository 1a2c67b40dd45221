//! Chart selection per analysis context.
//!
//! Each context owns a fixed, ordered rule list. A rule names the semantic
//! roles it needs; it only produces a [`VisualizationSpec`] when every role
//! resolved to a column present in the dataset. Earlier rules win when the
//! list is truncated to [`MAX_VISUALIZATIONS`]. Columns left unclaimed by
//! the semantic roles are offered as generic charts at the end of every
//! list so that arbitrary datasets still get something to look at.

use std::fmt;

use clap::ValueEnum;
use heck::ToTitleCase;
use serde::{Deserialize, Serialize};

use crate::{
    columns::SemanticColumns,
    data::{ColumnKind, normalize_key},
    dataset::Dataset,
};

pub const MAX_VISUALIZATIONS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisContext {
    #[default]
    Overview,
    Academic,
    Financial,
    Risk,
    Market,
}

impl AnalysisContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisContext::Overview => "overview",
            AnalysisContext::Academic => "academic",
            AnalysisContext::Financial => "financial",
            AnalysisContext::Risk => "risk",
            AnalysisContext::Market => "market",
        }
    }
}

impl fmt::Display for AnalysisContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Histogram,
    Bar,
    Pie,
    Scatter,
    BoxPlot,
    Line,
    Treemap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Count,
    Mean,
    Sum,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bins: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationSpec {
    pub title: String,
    pub chart_kind: ChartKind,
    pub target_columns: Vec<String>,
    pub rationale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ChartConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,
}

impl VisualizationSpec {
    /// The column the chart is mainly about; for two-column charts, the measured one.
    pub fn primary_column(&self) -> &str {
        self.target_columns
            .last()
            .map(String::as_str)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Score,
    Aid,
    Revenue,
    Nationality,
    Program,
    Gender,
    Cohort,
}

impl Role {
    fn column(self, columns: &SemanticColumns) -> Option<&str> {
        match self {
            Role::Score => columns.score.as_deref(),
            Role::Aid => columns.aid.as_deref(),
            Role::Revenue => columns.revenue.as_deref(),
            Role::Nationality => columns.nationality.as_deref(),
            Role::Program => columns.program.as_deref(),
            Role::Gender => columns.gender.as_deref(),
            Role::Cohort => columns.cohort.as_deref(),
        }
    }
}

struct Rule {
    title: &'static str,
    kind: ChartKind,
    roles: &'static [Role],
    rationale: &'static str,
    bins: Option<usize>,
    top_n: Option<usize>,
    aggregation: Option<Aggregation>,
}

const fn rule(
    title: &'static str,
    kind: ChartKind,
    roles: &'static [Role],
    rationale: &'static str,
) -> Rule {
    Rule {
        title,
        kind,
        roles,
        rationale,
        bins: None,
        top_n: None,
        aggregation: None,
    }
}

impl Rule {
    const fn bins(mut self, bins: usize) -> Self {
        self.bins = Some(bins);
        self
    }

    const fn top(mut self, top_n: usize) -> Self {
        self.top_n = Some(top_n);
        self
    }

    const fn aggregate(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    fn config(&self) -> Option<ChartConfig> {
        let config = ChartConfig {
            bins: self.bins,
            top_n: self.top_n,
            aggregation: self.aggregation,
        };
        (config != ChartConfig::default()).then_some(config)
    }
}

use Aggregation::{Count, Mean, Sum};
use ChartKind::{Bar, BoxPlot, Histogram, Line, Pie, Scatter, Treemap};
use Role::{Aid, Cohort, Gender, Nationality, Program, Revenue, Score};

const OVERVIEW_RULES: &[Rule] = &[
    rule(
        "{0} Distribution",
        Histogram,
        &[Score],
        "Shows how performance is spread across the whole population",
    )
    .bins(20),
    rule("{0} Mix", Bar, &[Nationality], "Largest markets by headcount").top(10).aggregate(Count),
    rule("Enrollment by {0}", Bar, &[Program], "Relative size of each program")
        .top(10)
        .aggregate(Count),
    rule("{0} vs {1}", Scatter, &[Aid, Score], "Tests whether support tracks performance"),
    rule("{0} Balance", Pie, &[Gender], "Composition of the population"),
    rule("{1} by {0}", Bar, &[Program, Revenue], "Where revenue is earned").top(10).aggregate(Sum),
    rule("Records per {0}", Bar, &[Cohort], "Intake volume over time").aggregate(Count),
];

const ACADEMIC_RULES: &[Rule] = &[
    rule(
        "{0} Distribution",
        Histogram,
        &[Score],
        "Bounded score distribution with fine bins to expose clusters at the floor and ceiling",
    )
    .bins(20),
    rule("{1} by {0}", BoxPlot, &[Program, Score], "Compares spread and medians across programs"),
    rule("{1} by {0}", BoxPlot, &[Gender, Score], "Checks for performance gaps between groups"),
    rule("Average {1} by {0}", Bar, &[Nationality, Score], "Markets ranked by mean performance")
        .top(10)
        .aggregate(Mean),
    rule("{0} vs {1}", Scatter, &[Aid, Score], "Relates support received to performance"),
    rule("Average {1} by {0}", Line, &[Cohort, Score], "Performance trend across intakes")
        .aggregate(Mean),
];

const FINANCIAL_RULES: &[Rule] = &[
    rule("{0} Distribution", Histogram, &[Aid], "Size profile of individual awards").bins(15),
    rule("{1} by {0}", Bar, &[Program, Revenue], "Revenue contribution per program")
        .top(10)
        .aggregate(Sum),
    rule("{0} vs {1}", Scatter, &[Aid, Score], "Return on support measured in performance"),
    rule("{1} by {0}", Bar, &[Nationality, Aid], "Where support is concentrated")
        .top(10)
        .aggregate(Sum),
    rule("{0} Distribution", Histogram, &[Revenue], "Spread of revenue per record").bins(15),
    rule("Average {1} by {0}", Bar, &[Program, Aid], "Average award size per program")
        .top(10)
        .aggregate(Mean),
];

const RISK_RULES: &[Rule] = &[
    rule("{0} Concentration", Pie, &[Nationality], "Dependence on a small number of markets")
        .top(10),
    rule("{0} Concentration", Pie, &[Program], "Dependence on a small number of programs").top(10),
    rule(
        "{1} Exposure by {0}",
        Bar,
        &[Program, Aid],
        "Support spend that would be exposed by program",
    )
    .top(10)
    .aggregate(Sum),
    rule("{0} Distribution", Histogram, &[Score], "Size of the low-performance tail").bins(20),
    rule("{0} vs {1}", Scatter, &[Aid, Score], "Identifies high-support, low-performance records"),
    rule("{0} Balance", Pie, &[Gender], "Composition risk in the population"),
];

const MARKET_RULES: &[Rule] = &[
    rule("{0} Mix", Bar, &[Nationality], "Headcount by market").top(15).aggregate(Count),
    rule("{0} Share", Treemap, &[Nationality], "Relative weight of each market").top(20),
    rule("Average {1} by {0}", Bar, &[Nationality, Score], "Performance of each market")
        .top(10)
        .aggregate(Mean),
    rule("{1} by {0}", Bar, &[Nationality, Revenue], "Revenue earned per market")
        .top(10)
        .aggregate(Sum),
    rule("Enrollment by {0}", Bar, &[Program], "Program demand").top(10).aggregate(Count),
    rule("{0} Balance", Pie, &[Gender], "Population composition"),
];

fn rules_for(context: AnalysisContext) -> &'static [Rule] {
    match context {
        AnalysisContext::Overview => OVERVIEW_RULES,
        AnalysisContext::Academic => ACADEMIC_RULES,
        AnalysisContext::Financial => FINANCIAL_RULES,
        AnalysisContext::Risk => RISK_RULES,
        AnalysisContext::Market => MARKET_RULES,
    }
}

fn render_title(template: &str, targets: &[String]) -> String {
    targets
        .iter()
        .enumerate()
        .fold(template.to_string(), |title, (idx, column)| {
            title.replace(&format!("{{{idx}}}"), &column.to_title_case())
        })
}

fn is_identifier(column: &str) -> bool {
    let key = normalize_key(column);
    key == "id" || key.ends_with("_id") || key.starts_with("id_")
}

/// Builds at most [`MAX_VISUALIZATIONS`] specs for `context`, in rule order.
pub fn select_visualizations(
    context: AnalysisContext,
    dataset: &Dataset,
    columns: &SemanticColumns,
) -> Vec<VisualizationSpec> {
    let mut specs = Vec::new();
    for rule in rules_for(context) {
        let targets = rule
            .roles
            .iter()
            .map(|role| role.column(columns).filter(|c| dataset.has_column(c)))
            .collect::<Option<Vec<_>>>();
        let Some(targets) = targets else {
            continue;
        };
        let targets = targets.into_iter().map(str::to_string).collect::<Vec<_>>();
        specs.push(VisualizationSpec {
            title: render_title(rule.title, &targets),
            chart_kind: rule.kind,
            target_columns: targets,
            rationale: rule.rationale.to_string(),
            config: rule.config(),
            insight: None,
        });
        if specs.len() == MAX_VISUALIZATIONS {
            return specs;
        }
    }

    for column in dataset.columns() {
        if specs.len() == MAX_VISUALIZATIONS {
            break;
        }
        if columns.role_of(&column.name).is_some()
            || is_identifier(&column.name)
            || specs.iter().any(|s| s.target_columns.contains(&column.name))
        {
            continue;
        }
        let (kind, rationale, config) = match column.kind {
            ColumnKind::Numeric => (
                Histogram,
                "Distribution of an unclassified numeric column",
                ChartConfig {
                    bins: Some(20),
                    ..ChartConfig::default()
                },
            ),
            ColumnKind::Categorical => (
                Bar,
                "Most frequent values of an unclassified categorical column",
                ChartConfig {
                    top_n: Some(10),
                    aggregation: Some(Count),
                    ..ChartConfig::default()
                },
            ),
            ColumnKind::Date => continue,
        };
        specs.push(VisualizationSpec {
            title: format!("{} Distribution", column.name.to_title_case()),
            chart_kind: kind,
            target_columns: vec![column.name.clone()],
            rationale: rationale.to_string(),
            config: Some(config),
            insight: None,
        });
    }
    specs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        columns::{AliasTable, ColumnResolver},
        data::Value,
        dataset::ColumnMeta,
    };

    fn dataset(columns: &[(&str, ColumnKind)]) -> Dataset {
        let meta = columns
            .iter()
            .map(|(name, kind)| ColumnMeta {
                name: name.to_string(),
                kind: *kind,
            })
            .collect::<Vec<_>>();
        let row = columns
            .iter()
            .map(|(_, kind)| match kind {
                ColumnKind::Numeric => Value::Numeric(1.0),
                _ => Value::Categorical("x".into()),
            })
            .collect::<Vec<_>>();
        Dataset::new(meta, vec![row]).expect("dataset")
    }

    fn semantic(dataset: &Dataset) -> SemanticColumns {
        SemanticColumns::resolve(&ColumnResolver::new(AliasTable::builtin()), dataset)
    }

    #[test]
    fn rules_skip_unresolved_roles() {
        let data = dataset(&[("cgpa", ColumnKind::Numeric), ("sex", ColumnKind::Categorical)]);
        let specs = select_visualizations(AnalysisContext::Academic, &data, &semantic(&data));
        assert_eq!(specs[0].title, "Cgpa Distribution");
        assert_eq!(specs[0].chart_kind, ChartKind::Histogram);
        assert_eq!(specs[1].target_columns, vec!["sex".to_string(), "cgpa".to_string()]);
        assert!(specs.iter().all(|s| s.target_columns.iter().all(|c| data.has_column(c))));
    }

    #[test]
    fn output_is_capped_and_keeps_rule_order() {
        let data = dataset(&[
            ("student_id", ColumnKind::Numeric),
            ("gpa", ColumnKind::Numeric),
            ("scholarship_amount", ColumnKind::Numeric),
            ("tuition_fee", ColumnKind::Numeric),
            ("nationality", ColumnKind::Categorical),
            ("program", ColumnKind::Categorical),
            ("gender", ColumnKind::Categorical),
            ("cohort", ColumnKind::Categorical),
            ("credits", ColumnKind::Numeric),
        ]);
        for context in AnalysisContext::value_variants() {
            let specs = select_visualizations(*context, &data, &semantic(&data));
            assert!(specs.len() <= MAX_VISUALIZATIONS, "{context}");
        }
        let overview = select_visualizations(AnalysisContext::Overview, &data, &semantic(&data));
        assert_eq!(overview.len(), MAX_VISUALIZATIONS);
        assert_eq!(overview[0].title, "Gpa Distribution");
        assert_eq!(overview[3].title, "Scholarship Amount vs Gpa");
    }

    #[test]
    fn unclaimed_columns_become_generic_charts() {
        let data = dataset(&[
            ("row_id", ColumnKind::Numeric),
            ("weight", ColumnKind::Numeric),
            ("colour", ColumnKind::Categorical),
        ]);
        let specs = select_visualizations(AnalysisContext::Risk, &data, &semantic(&data));
        let titles = specs.iter().map(|s| s.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["Weight Distribution", "Colour Distribution"]);
    }
}
