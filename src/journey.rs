//! Journey synthesis.
//!
//! All discoveries are condensed into one digest and sent to the model in a
//! single call that asks for descriptive and action journeys in a fixed
//! schema. A reply that cannot be parsed, or that yields fewer than
//! [`MIN_JOURNEYS`] journeys, is discarded in favour of a deterministic
//! generator that names two journeys per discovery. Either way the list is
//! deduplicated on normalised `(key, name)`, given unique keys, ranked and
//! capped at [`MAX_JOURNEYS`].

use std::collections::HashSet;

use heck::ToTitleCase;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::{
    columns::{AID, NATIONALITY, SCORE},
    data::normalize_key,
    discovery::{Discovery, DiscoveryCategory, Severity},
    gateway::{GatewayConfig, GenerationRequest, TextGenerator},
    metrics::{MetricSnapshot, format_metrics_for_prompt},
    parser::{parse_structured, string_field},
    pipeline::Source,
};

pub const MIN_JOURNEYS: usize = 5;
pub const MAX_JOURNEYS: usize = 15;
pub const DIGEST_ITEMS_PER_CATEGORY: usize = 3;
const JOURNEY_PREDICT_TOKENS: u32 = 1536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JourneyKind {
    Descriptive,
    Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journey {
    pub name: String,
    pub key: String,
    pub icon: String,
    pub priority: u32,
    #[serde(rename = "type")]
    pub kind: JourneyKind,
    pub rationale: String,
    pub business_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Journey {
    /// Normalised `(key, name)` pair used for deduplication.
    pub fn identity(&self) -> (String, String) {
        (normalize_key(&self.key), normalize_key(&self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JourneySet {
    pub journeys: Vec<Journey>,
    pub origin: Source,
}

pub fn icon_for(category: Option<DiscoveryCategory>, kind: JourneyKind) -> &'static str {
    if kind == JourneyKind::Action {
        return "target";
    }
    match category {
        Some(DiscoveryCategory::Correlations) => "link",
        Some(DiscoveryCategory::Segments) => "layers",
        Some(DiscoveryCategory::Anomalies) => "alert-triangle",
        Some(DiscoveryCategory::Opportunities) => "trending-up",
        Some(DiscoveryCategory::Risks) => "shield",
        Some(DiscoveryCategory::FinancialPatterns) => "dollar-sign",
        Some(DiscoveryCategory::AcademicPatterns) => "book-open",
        Some(DiscoveryCategory::MarketPatterns) => "globe",
        None => "bar-chart",
    }
}

/// Compact per-category listing of discoveries for the aggregate prompt.
pub fn build_digest(discoveries: &[Discovery]) -> String {
    let mut sections = Vec::new();
    for category in DiscoveryCategory::ALL {
        let items = discoveries
            .iter()
            .filter(|d| d.category == category)
            .collect::<Vec<_>>();
        if items.is_empty() {
            continue;
        }
        let mut lines = vec![format!("{} ({}):", category.as_str().to_title_case(), items.len())];
        for discovery in items.iter().take(DIGEST_ITEMS_PER_CATEGORY) {
            let severity = discovery
                .evidence
                .severity
                .map(|s| format!(" [{s}]"))
                .unwrap_or_default();
            lines.push(format!("- {}{severity}: {}", discovery.key, discovery.insight));
        }
        if items.len() > DIGEST_ITEMS_PER_CATEGORY {
            lines.push(format!("- ... and {} more", items.len() - DIGEST_ITEMS_PER_CATEGORY));
        }
        sections.push(lines.join("\n"));
    }
    if sections.is_empty() {
        "No statistical discoveries were found.".to_string()
    } else {
        sections.join("\n\n")
    }
}

fn journey_prompt(digest: &str, metrics: &MetricSnapshot, currency: &str) -> String {
    format!(
        "You are a university analytics lead grouping discoveries into analysis journeys.\n\n\
         Discoveries:\n{digest}\n\n\
         Key Metrics:\n{metrics}\n\n\
         Propose between {MIN_JOURNEYS} and {MAX_JOURNEYS} journeys in total. Descriptive journeys explain a pattern; \
         action journeys recommend a response. Use the discovery key in \"source\".\n\
         Respond with JSON only, in this form:\n\
         {{\"descriptive_journeys\": [{{\"name\": \"...\", \"key\": \"snake_case\", \"icon\": \"...\", \"priority\": 1, \
         \"rationale\": \"...\", \"business_value\": \"...\", \"source\": \"...\"}}], \
         \"action_journeys\": [...same fields...]}}",
        metrics = format_metrics_for_prompt(metrics, 10, currency),
    )
}

fn journey_from_json(value: &Json, kind: JourneyKind, position: usize) -> Option<Journey> {
    let name = string_field(value, "name")?;
    let key = string_field(value, "key")
        .map(|k| normalize_key(&k))
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| normalize_key(&name));
    let priority = value
        .get("priority")
        .and_then(|p| p.as_u64().or_else(|| p.as_str().and_then(|s| s.trim().parse().ok())))
        .map_or(position as u32 + 1, |p| p.min(u32::MAX as u64) as u32);
    Some(Journey {
        icon: string_field(value, "icon").unwrap_or_else(|| icon_for(None, kind).to_string()),
        rationale: string_field(value, "rationale").unwrap_or_default(),
        business_value: string_field(value, "business_value").unwrap_or_default(),
        source: string_field(value, "source"),
        name,
        key,
        priority,
        kind,
    })
}

/// Journeys from a parsed model reply; `None` when fewer than [`MIN_JOURNEYS`]
/// distinct journeys survive.
pub fn journeys_from_reply(value: &Json) -> Option<Vec<Journey>> {
    let mut journeys = Vec::new();
    for (field, kind) in [
        ("descriptive_journeys", JourneyKind::Descriptive),
        ("action_journeys", JourneyKind::Action),
    ] {
        if let Some(items) = value.get(field).and_then(Json::as_array) {
            journeys.extend(
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, item)| journey_from_json(item, kind, idx)),
            );
        }
    }
    (distinct_count(&journeys) >= MIN_JOURNEYS).then_some(journeys)
}

const CURATED_NAMES: &[(&str, &str, &str)] = &[
    ("zero_gpa", "Zero GPA Investigation", "Recover Zero-GPA Students"),
    ("perfect_gpa", "Top Performer Profile", "Recognise Perfect Scores"),
    ("high_aid_low_gpa", "Aid Effectiveness Gap", "Realign Aid with Outcomes"),
    ("unfunded_high_achievers", "Unfunded High Achievers", "Launch Merit Awards"),
    ("aid_impact_on_performance", "Aid Impact on Performance", "Optimise Aid Allocation"),
    ("market_concentration", "Market Concentration Risk", "Diversify Recruitment Markets"),
    ("program_concentration", "Program Portfolio Concentration", "Balance the Program Portfolio"),
    ("aid_sustainability", "Aid Sustainability Review", "Secure Aid Sustainability"),
    ("aid_roi_by_tier", "Aid Return by Tier", "Rebalance Aid Tiers"),
];

fn titled(text: &str) -> String {
    text.to_title_case()
}

/// Descriptive and action names for a discovery key.
pub fn journey_names(discovery: &Discovery) -> (String, String) {
    let key = discovery.key.as_str();
    if let Some((_, descriptive, action)) = CURATED_NAMES.iter().find(|(k, _, _)| *k == key) {
        return (descriptive.to_string(), action.to_string());
    }
    if let Some((left, right)) = key.split_once("_vs_") {
        return (
            format!("{} and {} Relationship", titled(left), titled(right)),
            format!("Leverage the {} Link", titled(right)),
        );
    }
    if let Some((outcome, group)) = key.split_once("_by_") {
        return (
            format!("{} Gaps by {}", titled(outcome), titled(group)),
            format!("Close {} Performance Gaps", titled(group)),
        );
    }
    if let Some(rest) = key.strip_prefix("emerging_") {
        let group = discovery
            .evidence
            .labels
            .get("group")
            .cloned()
            .unwrap_or_else(|| titled(rest));
        return (
            format!("Emerging Talent from {group}"),
            format!("Grow the {group} Pipeline"),
        );
    }
    if let Some(subject) = key.strip_suffix("_distribution") {
        return (
            format!("{} Distribution Story", titled(subject)),
            format!("Reshape {} Outcomes", titled(subject)),
        );
    }
    if let Some(subject) = key.strip_suffix("_diversity") {
        return (
            format!("{} Diversity Profile", titled(subject)),
            format!("Strengthen {} Diversity", titled(subject)),
        );
    }
    if key.contains("concentration") {
        return (
            format!("{} Risk", titled(key)),
            format!("Reduce {}", titled(key)),
        );
    }
    let keyword = discovery.category.keyword();
    (
        format!("{keyword} Insight: {}", titled(key)),
        format!("{keyword} Response: {}", titled(key)),
    )
}

fn severity_rank(severity: Option<Severity>) -> u32 {
    match severity {
        Some(Severity::Critical) => 1,
        Some(Severity::High) => 2,
        Some(Severity::Moderate) => 3,
        _ => 4,
    }
}

/// Two journeys per discovery, ranked by severity and then category order.
pub fn journeys_from_discoveries(discoveries: &[Discovery]) -> Vec<Journey> {
    let mut journeys = Vec::with_capacity(discoveries.len() * 2);
    for discovery in discoveries {
        let (descriptive, action) = journey_names(discovery);
        let base = severity_rank(discovery.evidence.severity) * 100
            + discovery.category.position() as u32 * 10;
        let key = normalize_key(&discovery.key);
        journeys.push(Journey {
            icon: icon_for(Some(discovery.category), JourneyKind::Descriptive).to_string(),
            key: key.clone(),
            name: descriptive,
            priority: base,
            kind: JourneyKind::Descriptive,
            rationale: discovery.insight.clone(),
            business_value: format!(
                "Explains a {} pattern leadership can act on",
                discovery.category.keyword().to_lowercase()
            ),
            source: Some(discovery.key.clone()),
        });
        journeys.push(Journey {
            icon: icon_for(Some(discovery.category), JourneyKind::Action).to_string(),
            key: format!("{key}_action"),
            name: action,
            priority: base + 1,
            kind: JourneyKind::Action,
            rationale: format!("Responds to: {}", discovery.insight),
            business_value: "Turns the finding into a measurable intervention".to_string(),
            source: Some(discovery.key.clone()),
        });
    }
    journeys
}

/// Journeys that exist for every dataset, described from the metric snapshot.
pub fn baseline_journeys(metrics: &MetricSnapshot) -> Vec<Journey> {
    let records = metrics.get("total_records").unwrap_or_default();
    let mut specs: Vec<(&str, &str, JourneyKind, String)> = vec![(
        "population_overview",
        "Population Overview",
        JourneyKind::Descriptive,
        format!("Profiles all {records:.0} records before drilling into specific patterns"),
    )];
    if let Some(avg) = metrics.get(&format!("avg_{SCORE}")) {
        specs.push((
            "academic_performance_overview",
            "Academic Performance Overview",
            JourneyKind::Descriptive,
            format!("Average {SCORE} of {avg:.2} sets the academic baseline"),
        ));
    }
    if metrics.get(&format!("total_{AID}")).is_some() {
        specs.push((
            "financial_aid_overview",
            "Financial Aid Overview",
            JourneyKind::Descriptive,
            "Shows where support is going and to whom".to_string(),
        ));
    }
    if let Some(markets) = metrics.get(&format!("unique_{NATIONALITY}")) {
        specs.push((
            "market_mix_overview",
            "Market Mix Overview",
            JourneyKind::Descriptive,
            format!("{markets:.0} markets contribute to the population"),
        ));
    }
    specs.extend([
        (
            "executive_summary",
            "Executive Summary",
            JourneyKind::Descriptive,
            "Condenses the strongest signals into one briefing".to_string(),
        ),
        (
            "data_quality_review",
            "Data Quality Review",
            JourneyKind::Action,
            "Missing and out-of-range values limit every other analysis".to_string(),
        ),
        (
            "action_plan_roadmap",
            "Action Plan Roadmap",
            JourneyKind::Action,
            "Sequences the recommended interventions over the next two terms".to_string(),
        ),
        (
            "cohort_monitoring_plan",
            "Cohort Monitoring Plan",
            JourneyKind::Action,
            "Tracks the same indicators for every new intake".to_string(),
        ),
    ]);
    specs
        .into_iter()
        .enumerate()
        .map(|(idx, (key, name, kind, rationale))| Journey {
            name: name.to_string(),
            key: key.to_string(),
            icon: icon_for(None, kind).to_string(),
            priority: 1000 + idx as u32,
            kind,
            rationale,
            business_value: "Keeps the analysis anchored to institution-wide figures".to_string(),
            source: None,
        })
        .collect()
}

/// Deduplicates on normalised `(key, name)`, makes keys unique, sorts by
/// priority, caps at [`MAX_JOURNEYS`] and renumbers priorities from 1.
pub fn finalize(journeys: Vec<Journey>) -> Vec<Journey> {
    let mut seen = HashSet::new();
    let mut unique = journeys
        .into_iter()
        .filter(|journey| seen.insert(journey.identity()))
        .collect::<Vec<_>>();
    unique.sort_by_key(|journey| journey.priority);
    unique.truncate(MAX_JOURNEYS);

    let mut keys = HashSet::new();
    for journey in &mut unique {
        let base = match normalize_key(&journey.key) {
            key if key.is_empty() => normalize_key(&journey.name),
            key => key,
        };
        let base = if base.is_empty() { "journey".to_string() } else { base };
        let mut key = base.clone();
        let mut suffix = 2;
        while !keys.insert(key.clone()) {
            key = format!("{base}_{suffix}");
            suffix += 1;
        }
        journey.key = key;
    }
    for (idx, journey) in unique.iter_mut().enumerate() {
        journey.priority = idx as u32 + 1;
    }
    unique
}

fn distinct_count(journeys: &[Journey]) -> usize {
    journeys
        .iter()
        .map(Journey::identity)
        .collect::<HashSet<_>>()
        .len()
}

/// Fully deterministic journeys, padded with baseline ones to at least [`MIN_JOURNEYS`].
pub fn fallback_journeys(discoveries: &[Discovery], metrics: &MetricSnapshot) -> Vec<Journey> {
    let mut journeys = journeys_from_discoveries(discoveries);
    if distinct_count(&journeys) < MIN_JOURNEYS {
        journeys.extend(baseline_journeys(metrics));
    }
    finalize(journeys)
}

pub struct JourneySynthesizer<G> {
    gateway: G,
    request: GatewayConfig,
    currency: String,
}

impl<G: TextGenerator> JourneySynthesizer<G> {
    pub fn new(gateway: G, request: GatewayConfig) -> Self {
        Self {
            gateway,
            request,
            currency: "AED".to_string(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn synthesize(&self, discoveries: &[Discovery], metrics: &MetricSnapshot) -> JourneySet {
        let digest = build_digest(discoveries);
        let prompt = journey_prompt(&digest, metrics, &self.currency);
        let request = GenerationRequest::from_config(prompt, &self.request)
            .num_predict(self.request.num_predict.max(JOURNEY_PREDICT_TOKENS));

        let reply = match self.gateway.generate(&request) {
            Ok(text) => match parse_structured(&text) {
                Some(value) => journeys_from_reply(&value).or_else(|| {
                    warn!("Journey reply held fewer than {MIN_JOURNEYS} usable journeys");
                    None
                }),
                None => {
                    warn!("Journey reply could not be parsed ({} chars)", text.len());
                    None
                }
            },
            Err(err) => {
                warn!("Journey synthesis call failed: {err}");
                None
            }
        };

        match reply {
            Some(journeys) => {
                let journeys = finalize(journeys);
                info!("Model proposed {} journey(s)", journeys.len());
                JourneySet {
                    journeys,
                    origin: Source::Model,
                }
            }
            None => {
                debug!("Synthesizing journeys from {} discovery(ies)", discoveries.len());
                JourneySet {
                    journeys: fallback_journeys(discoveries, metrics),
                    origin: Source::Fallback,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::discovery::Evidence;

    fn discovery(category: DiscoveryCategory, key: &str) -> Discovery {
        Discovery::new(category, key, format!("{key} insight"), Evidence::from_columns(["gpa"]))
    }

    fn journey(key: &str, name: &str, priority: u32) -> Journey {
        Journey {
            name: name.into(),
            key: key.into(),
            icon: "x".into(),
            priority,
            kind: JourneyKind::Descriptive,
            rationale: String::new(),
            business_value: String::new(),
            source: None,
        }
    }

    #[test]
    fn names_use_curated_table_then_patterns_then_keyword() {
        let curated = journey_names(&discovery(DiscoveryCategory::Risks, "market_concentration"));
        assert_eq!(curated.0, "Market Concentration Risk");
        let pattern = journey_names(&discovery(DiscoveryCategory::Segments, "gpa_by_program"));
        assert_eq!(pattern.0, "Gpa Gaps by Program");
        let generic = journey_names(&discovery(DiscoveryCategory::Anomalies, "odd_thing"));
        assert_eq!(generic.0, "Anomaly Insight: Odd Thing");
    }

    #[test]
    fn finalize_dedups_and_suffixes_keys() {
        let journeys = vec![
            journey("risk", "Risk", 3),
            journey("Risk ", "risk", 1),
            journey("risk", "Other Risk", 2),
        ];
        let finalized = finalize(journeys);
        assert_eq!(finalized.len(), 2);
        assert_eq!(finalized[0].name, "Other Risk");
        assert_eq!(finalized[0].key, "risk");
        assert_eq!(finalized[0].priority, 1);
        assert_eq!(finalized[1].name, "Risk");
        assert_eq!(finalized[1].key, "risk_2");
        assert_eq!(finalized[1].priority, 2);
    }

    #[test]
    fn digest_is_bounded_per_category() {
        let discoveries = (0..5)
            .map(|i| discovery(DiscoveryCategory::Segments, &format!("seg_{i}")))
            .collect::<Vec<_>>();
        let digest = build_digest(&discoveries);
        assert!(digest.contains("seg_2"));
        assert!(!digest.contains("seg_3"));
        assert!(digest.contains("and 2 more"));
    }

    #[test]
    fn short_replies_are_rejected() {
        let reply = json!({
            "descriptive_journeys": [{"name": "A"}, {"name": "B"}],
            "action_journeys": [{"name": "C"}, {"title": "no name"}]
        });
        assert!(journeys_from_reply(&reply).is_none());
    }

    #[test]
    fn repeated_journeys_count_once() {
        let item = json!({"name": "Market Mix", "key": "market_mix"});
        let reply = json!({
            "descriptive_journeys": [item.clone(), item.clone(), item.clone()],
            "action_journeys": [item.clone(), {"name": "market mix", "key": "Market Mix"}]
        });
        assert!(journeys_from_reply(&reply).is_none());
    }

    #[test]
    fn fallback_always_reaches_minimum() {
        let journeys = fallback_journeys(&[], &MetricSnapshot::new());
        assert!(journeys.len() >= MIN_JOURNEYS);
        let zero = [discovery(DiscoveryCategory::Anomalies, "zero_gpa")];
        let one = fallback_journeys(&zero, &MetricSnapshot::new());
        assert_eq!(one[0].name, "Zero GPA Investigation");
        assert!(one.len() >= MIN_JOURNEYS);
    }
}
