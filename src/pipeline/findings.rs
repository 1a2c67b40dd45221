//! Deterministic findings and recommendations.

use crate::{
    columns::{AID, GENDER, NATIONALITY, PROGRAM, REVENUE, SCORE, SEMANTIC_COLUMNS, SemanticColumns},
    discovery::{Discovery, DiscoveryCategory, Severity, fmt_amount, fmt_pct},
    metrics::{MetricSnapshot, format_metric_value},
    visualize::AnalysisContext,
};

use super::{FINDING_COUNT, FindingOrRecommendation, ItemContext, RECOMMENDATION_COUNT};

use DiscoveryCategory::*;

/// Categories in the order a context cares about them.
pub(super) fn category_priority(context: AnalysisContext) -> [DiscoveryCategory; 8] {
    match context {
        AnalysisContext::Overview => [
            Risks,
            Anomalies,
            Correlations,
            Opportunities,
            Segments,
            FinancialPatterns,
            AcademicPatterns,
            MarketPatterns,
        ],
        AnalysisContext::Academic => [
            AcademicPatterns,
            Anomalies,
            Segments,
            Correlations,
            Opportunities,
            FinancialPatterns,
            Risks,
            MarketPatterns,
        ],
        AnalysisContext::Financial => [
            FinancialPatterns,
            Risks,
            Anomalies,
            Correlations,
            Opportunities,
            Segments,
            AcademicPatterns,
            MarketPatterns,
        ],
        AnalysisContext::Risk => [
            Risks,
            Anomalies,
            Segments,
            MarketPatterns,
            FinancialPatterns,
            Correlations,
            Opportunities,
            AcademicPatterns,
        ],
        AnalysisContext::Market => [
            MarketPatterns,
            Risks,
            Opportunities,
            Segments,
            Correlations,
            Anomalies,
            FinancialPatterns,
            AcademicPatterns,
        ],
    }
}

/// Up to `limit` discoveries: the most severe one per category in priority
/// order first, then the remaining ones in the same order.
pub(super) fn prioritised<'a>(
    context: AnalysisContext,
    discoveries: &'a [Discovery],
    limit: usize,
) -> Vec<&'a Discovery> {
    let priority = category_priority(context);
    let mut ordered = discoveries.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|d| {
        (
            priority.iter().position(|c| *c == d.category),
            std::cmp::Reverse(d.evidence.severity),
        )
    });
    let mut picked: Vec<&Discovery> = Vec::with_capacity(limit);
    for category in priority {
        if picked.len() == limit {
            return picked;
        }
        if let Some(first) = ordered.iter().find(|d| d.category == category).copied() {
            picked.push(first);
        }
    }
    for discovery in ordered {
        if picked.len() == limit {
            break;
        }
        if !picked.iter().any(|p| std::ptr::eq(*p, discovery)) {
            picked.push(discovery);
        }
    }
    picked
}

fn severity_prefix(discovery: &Discovery) -> String {
    match discovery.evidence.severity {
        Some(severity @ (Severity::High | Severity::Critical)) => {
            let keyword = discovery.category.keyword().to_lowercase();
            format!("{} {keyword}: ", capitalise(severity.as_str()))
        }
        _ => String::new(),
    }
}

fn capitalise(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn finding_text(discovery: &Discovery) -> String {
    format!("{}{}.", severity_prefix(discovery), discovery.insight.trim_end_matches('.'))
}

fn metric(discovery: &Discovery, name: &str) -> f64 {
    discovery.evidence.get_metric(name).unwrap_or_default()
}

fn label<'a>(discovery: &'a Discovery, name: &str) -> &'a str {
    discovery
        .evidence
        .labels
        .get(name)
        .map(String::as_str)
        .unwrap_or("the leading group")
}

fn column(discovery: &Discovery, idx: usize) -> &str {
    discovery
        .evidence
        .columns
        .get(idx)
        .map(String::as_str)
        .unwrap_or("this column")
}

fn recommendation_text(discovery: &Discovery, currency: &str) -> String {
    let evidence = &discovery.evidence;
    let count = evidence.count.unwrap_or_default();
    let key = discovery.key.as_str();
    match discovery.category {
        Correlations if key == "aid_impact_on_performance" => format!(
            "Tie {} renewals to academic progress so that support keeps translating into performance",
            column(discovery, 0)
        ),
        Correlations => format!(
            "Track {} alongside {} in planning dashboards and treat movements in one as an early signal for the other",
            column(discovery, 0),
            column(discovery, 1)
        ),
        Segments => format!(
            "Investigate why {} trails {} on {} and pilot targeted support for the lower group",
            label(discovery, "bottom_group"),
            label(discovery, "top_group"),
            column(discovery, 1)
        ),
        Anomalies if key == "high_aid_low_gpa" => format!(
            "Review the {count} high-support, low-performance awards ({currency} {} in total) with academic advising before renewal",
            fmt_amount(evidence.amount.unwrap_or_default())
        ),
        Anomalies if key == "perfect_gpa" => format!(
            "Check grading consistency for the {count} records at the top of the scale"
        ),
        Anomalies => format!(
            "Audit the {count} records at the floor of {} for withdrawals or missing grades before they distort reporting",
            column(discovery, 0)
        ),
        Opportunities if key == "unfunded_high_achievers" => format!(
            "Offer merit awards to the {count} high performers currently receiving no {}",
            column(discovery, 0)
        ),
        Opportunities => format!(
            "Grow recruitment from {} given its strong results on a small base",
            label(discovery, "group")
        ),
        Risks if key == "aid_sustainability" => format!(
            "Cap {} growth at current revenue levels and link new awards to outcomes to keep coverage under control",
            column(discovery, 0)
        ),
        Risks => format!(
            "Diversify {} beyond {} to reduce dependence on a few groups",
            column(discovery, 0),
            label(discovery, "leaders")
        ),
        FinancialPatterns => match evidence.pattern.as_deref() {
            Some("increasing") => "Prioritise larger awards where they demonstrably lift outcomes".to_string(),
            Some("decreasing") => "Rebalance award tiers toward smaller, wider awards since larger ones show weaker outcomes".to_string(),
            _ => "Redesign award tiers around outcomes, since award size currently makes little difference".to_string(),
        },
        AcademicPatterns => format!(
            "Introduce early-warning support for records in the lowest {} band",
            column(discovery, 0)
        ),
        MarketPatterns if evidence.pattern.as_deref() == Some("low") => format!(
            "Broaden {} recruitment to raise a diversity index of {:.1}",
            column(discovery, 0),
            metric(discovery, "diversity_index")
        ),
        MarketPatterns => format!(
            "Protect the current {} mix while monitoring shifts between intakes",
            column(discovery, 0)
        ),
    }
}

/// Metric-based items used when there are not enough discoveries.
fn metric_items(
    context: AnalysisContext,
    metrics: &MetricSnapshot,
    columns: &SemanticColumns,
    currency: &str,
) -> Vec<(String, String, ItemContext)> {
    let fmt = |value: f64| format_metric_value(value, currency);
    let mut items = Vec::new();
    let entry = |key: &str, finding: String, recommendation: String| {
        let value = metrics.get(key).unwrap_or_default();
        (finding, recommendation, ItemContext::from_metric(key, value))
    };

    let score = metrics.get(&format!("avg_{SCORE}"));
    let aid = metrics.get(&format!("total_{AID}"));
    let revenue = metrics.get(&format!("total_{REVENUE}"));
    let markets = metrics.get(&format!("unique_{NATIONALITY}"));
    let programs = metrics.get(&format!("unique_{PROGRAM}"));
    let gender_share = metrics.get(&format!("top_{GENDER}_share"));

    let mut ordered: Vec<&str> = match context {
        AnalysisContext::Academic => {
            vec!["score", "programs", "gender", "aid", "revenue", "markets"]
        }
        AnalysisContext::Financial => {
            vec!["aid", "revenue", "score", "programs", "markets", "gender"]
        }
        AnalysisContext::Risk | AnalysisContext::Market => {
            vec!["markets", "programs", "revenue", "aid", "score", "gender"]
        }
        AnalysisContext::Overview => {
            vec!["score", "aid", "markets", "revenue", "programs", "gender"]
        }
    };
    ordered.extend(["records", "completeness", "coverage"]);

    for item in ordered {
        match item {
            "score" => {
                if let Some(avg) = score {
                    let median = metrics.get(&format!("median_{SCORE}")).unwrap_or(avg);
                    items.push(entry(
                        &format!("avg_{SCORE}"),
                        format!("Average {SCORE} is {avg:.2} with a median of {median:.2}."),
                        format!("Set a performance target relative to the current average {SCORE} of {avg:.2} and report progress each term."),
                    ));
                }
            }
            "aid" => {
                if let Some(total) = aid {
                    let recipients = metrics.get(&format!("{AID}_recipients")).unwrap_or_default();
                    items.push(entry(
                        &format!("total_{AID}"),
                        format!(
                            "{} in financial aid is spread across {} recipients.",
                            fmt(total),
                            fmt_amount(recipients),
                        ),
                        format!(
                            "Measure outcomes per recipient to establish the return on the {} awarded.",
                            fmt(total),
                        ),
                    ));
                }
            }
            "revenue" => {
                if let Some(total) = revenue {
                    items.push(entry(
                        &format!("total_{REVENUE}"),
                        format!("Tuition revenue in this dataset totals {}.", fmt(total)),
                        "Reconcile revenue by program with enrolment plans before the next budget cycle.".to_string(),
                    ));
                }
            }
            "markets" => {
                if let Some(count) = markets {
                    let share = metrics
                        .get(&format!("top_{NATIONALITY}_share"))
                        .unwrap_or_default();
                    items.push(entry(
                        &format!("unique_{NATIONALITY}"),
                        format!(
                            "{} nationalities are represented; the largest accounts for {}.",
                            fmt_amount(count),
                            fmt_pct(share * 100.0),
                        ),
                        "Review market mix every intake so that shifts in the largest markets are caught early.".to_string(),
                    ));
                }
            }
            "programs" => {
                if let Some(count) = programs {
                    let share = metrics.get(&format!("top_{PROGRAM}_share")).unwrap_or_default();
                    items.push(entry(
                        &format!("unique_{PROGRAM}"),
                        format!(
                            "Enrolment spans {} programs; the largest holds {}.",
                            fmt_amount(count),
                            fmt_pct(share * 100.0),
                        ),
                        "Compare program sizes with capacity to find programs that can absorb growth.".to_string(),
                    ));
                }
            }
            "gender" => {
                if let Some(share) = gender_share {
                    items.push(entry(
                        &format!("top_{GENDER}_share"),
                        format!(
                            "The larger gender group makes up {} of records.",
                            fmt_pct(share * 100.0),
                        ),
                        "Monitor gender balance by program to spot programs drifting from the institutional mix.".to_string(),
                    ));
                }
            }
            "records" => {
                let records = metrics.get("total_records").unwrap_or_default();
                let fields = metrics.get("total_columns").unwrap_or_default();
                items.push(entry(
                    "total_records",
                    format!(
                        "The dataset holds {} records across {} columns.",
                        fmt_amount(records),
                        fmt_amount(fields),
                    ),
                    format!(
                        "Re-run this analysis each intake and compare against this baseline of {} records.",
                        fmt_amount(records),
                    ),
                ));
            }
            "completeness" => {
                let completeness = metrics.get("completeness").unwrap_or(1.0);
                items.push(entry(
                    "completeness",
                    format!("{} of all cells are populated.", fmt_pct(completeness * 100.0)),
                    "Close the gaps in the source export so that every analysis runs on complete records.".to_string(),
                ));
            }
            _ => {
                let resolved = SEMANTIC_COLUMNS
                    .iter()
                    .filter(|semantic| columns_resolved(columns, semantic))
                    .count();
                items.push((
                    format!(
                        "{resolved} of {} known data roles were recognised in the column headers.",
                        SEMANTIC_COLUMNS.len(),
                    ),
                    "Map the remaining columns through the alias table in the configuration file to unlock further analyses.".to_string(),
                    ItemContext::from_metric("resolved_roles", resolved as f64),
                ));
            }
        }
    }
    items
}

fn columns_resolved(columns: &SemanticColumns, semantic: &str) -> bool {
    [
        &columns.score,
        &columns.aid,
        &columns.revenue,
        &columns.nationality,
        &columns.program,
        &columns.gender,
        &columns.cohort,
        &columns.student_id,
    ]
    .into_iter()
    .flatten()
    .any(|column| columns.role_of(column) == Some(semantic))
}

/// Exactly [`FINDING_COUNT`] findings and [`RECOMMENDATION_COUNT`] recommendations.
pub(super) fn derive(
    context: AnalysisContext,
    discoveries: &[Discovery],
    metrics: &MetricSnapshot,
    columns: &SemanticColumns,
    currency: &str,
) -> (Vec<FindingOrRecommendation>, Vec<FindingOrRecommendation>) {
    let wanted = FINDING_COUNT.max(RECOMMENDATION_COUNT);
    let mut findings = Vec::with_capacity(FINDING_COUNT);
    let mut recommendations = Vec::with_capacity(RECOMMENDATION_COUNT);
    for discovery in prioritised(context, discoveries, wanted) {
        let item = ItemContext::from_discovery(discovery);
        findings.push(FindingOrRecommendation::new(finding_text(discovery), item.clone()));
        recommendations.push(FindingOrRecommendation::new(
            format!("{}.", recommendation_text(discovery, currency)),
            item,
        ));
    }
    if findings.len() < wanted {
        for (finding, recommendation, item) in metric_items(context, metrics, columns, currency) {
            if findings.len() == wanted {
                break;
            }
            findings.push(FindingOrRecommendation::new(finding, item.clone()));
            recommendations.push(FindingOrRecommendation::new(recommendation, item));
        }
    }
    findings.truncate(FINDING_COUNT);
    recommendations.truncate(RECOMMENDATION_COUNT);
    (findings, recommendations)
}
