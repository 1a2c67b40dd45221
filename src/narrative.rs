//! Six-part story narratives for journeys.
//!
//! Components are generated in a fixed order and later prompts quote the
//! earlier output: the business context feeds the data insights, which
//! feed the business impact, which together with the insights feeds the
//! findings summary, and the action plan sees both impact and findings.
//! A component whose call fails or comes back empty gets a fixed
//! fallback paragraph instead.

use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    data::normalize_key,
    discovery::Discovery,
    gateway::{GatewayConfig, GenerationRequest, TextGenerator},
    journey::Journey,
    metrics::{MetricSnapshot, format_metrics_for_prompt},
    pipeline::Source,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryComponent {
    BusinessContext,
    OpeningNarrative,
    DataInsights,
    BusinessImpact,
    FindingsSummary,
    ActionPlan,
}

impl StoryComponent {
    pub const ALL: [StoryComponent; 6] = [
        StoryComponent::BusinessContext,
        StoryComponent::OpeningNarrative,
        StoryComponent::DataInsights,
        StoryComponent::BusinessImpact,
        StoryComponent::FindingsSummary,
        StoryComponent::ActionPlan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoryComponent::BusinessContext => "business_context",
            StoryComponent::OpeningNarrative => "opening_narrative",
            StoryComponent::DataInsights => "data_insights",
            StoryComponent::BusinessImpact => "business_impact",
            StoryComponent::FindingsSummary => "findings_summary",
            StoryComponent::ActionPlan => "action_plan",
        }
    }

    /// How many metrics the component's prompt quotes.
    pub fn metric_limit(&self) -> usize {
        match self {
            StoryComponent::BusinessContext => 10,
            StoryComponent::OpeningNarrative => 15,
            StoryComponent::DataInsights => 20,
            StoryComponent::BusinessImpact => 15,
            StoryComponent::FindingsSummary => 15,
            StoryComponent::ActionPlan => 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NarrativeSection {
    pub component: StoryComponent,
    pub text: String,
    pub source: Source,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryNarrative {
    pub journey_key: String,
    pub title: String,
    pub sections: Vec<NarrativeSection>,
}

impl StoryNarrative {
    pub fn section(&self, component: StoryComponent) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.component == component)
            .map(|s| s.text.as_str())
    }
}

/// Earlier component output quoted by later prompts.
#[derive(Debug, Default)]
struct ChainContext {
    story_context: Option<String>,
    insights: Option<String>,
    impact: Option<String>,
    findings: Option<String>,
}

fn labelled(label: &str, text: &Option<String>) -> String {
    text.as_deref()
        .map(|t| format!("{label}: {t}\n\n"))
        .unwrap_or_default()
}

fn component_prompt(
    component: StoryComponent,
    title: &str,
    focus: &str,
    metrics: &str,
    chain: &ChainContext,
) -> String {
    let header = format!("Story: {title}\nFocus Area: {focus}\n\n");
    match component {
        StoryComponent::BusinessContext => format!(
            "You are a higher education business analyst writing a strategic business context paragraph.\n\n\
             {header}Key Metrics:\n{metrics}\n\n\
             Write a 3-4 sentence business context paragraph that explains why this analysis matters to university \
             leadership and connects it to revenue, quality, reputation or student success. Do not include numbers. \
             Write in present tense, active voice.\n\nBusiness Context Paragraph:"
        ),
        StoryComponent::OpeningNarrative => format!(
            "You are a data storyteller writing an engaging opening narrative for a university analytics story.\n\n\
             {header}Key Metrics:\n{metrics}\n\n\
             Write a 4-5 sentence opening that leads with the most striking metric, weaves in 3-5 key numbers and sets \
             up why the reader should care. Use present tense.\n\nOpening Narrative:"
        ),
        StoryComponent::DataInsights => format!(
            "You are a university data analyst writing a detailed data insights section.\n\n\
             {header}{context}Complete Metrics:\n{metrics}\n\n\
             Write 6-8 sentences analysing patterns, comparisons and relationships between the metrics, covering both \
             strengths and concerns. Include at least 8 specific numbers.\n\nData Insights:",
            context = labelled("Context", &chain.story_context),
        ),
        StoryComponent::BusinessImpact => format!(
            "You are a higher education CFO analysing business impact and financial implications.\n\n\
             {header}{insights}Key Metrics:\n{metrics}\n\n\
             Write 5-7 sentences quantifying financial impact, strategic implications, risks and opportunities. \
             Be specific about amounts.\n\nBusiness Impact:",
            insights = labelled("Data Insights", &chain.insights),
        ),
        StoryComponent::FindingsSummary => format!(
            "You are summarising key findings from a university data analysis.\n\n\
             {header}{insights}{impact}Key Metrics:\n{metrics}\n\n\
             Create 4-6 bullet points starting with \"•\", each with at least one specific number, mixing positive \
             findings and concerns.\n\nKey Findings:",
            insights = labelled("Data Insights", &chain.insights),
            impact = labelled("Business Impact", &chain.impact),
        ),
        StoryComponent::ActionPlan => format!(
            "You are a university strategy consultant creating an action plan.\n\n\
             {header}{impact}{findings}Metrics:\n{metrics}\n\n\
             Create 3-5 actions formatted as \"• [Action]: [Description] (Timeline: [X] | Budget: [Amount] | \
             Expected Impact: [Outcome])\", most important first.\n\nRecommended Action Plan:",
            impact = labelled("Business Impact", &chain.impact),
            findings = labelled("Key Findings", &chain.findings),
        ),
    }
}

pub fn fallback_text(component: StoryComponent, title: &str) -> String {
    let subject = title.to_lowercase();
    match component {
        StoryComponent::BusinessContext => format!(
            "This analysis examines {subject} to inform strategic decision-making and identify opportunities for improvement."
        ),
        StoryComponent::OpeningNarrative => format!(
            "Our analysis of {subject} reveals important patterns in the data that require attention."
        ),
        StoryComponent::DataInsights => format!(
            "Analysis of the data shows key metrics and trends across {subject}. Further investigation of these patterns is recommended."
        ),
        StoryComponent::BusinessImpact => "These findings have significant implications for institutional performance and should be considered in strategic planning.".to_string(),
        StoryComponent::FindingsSummary => "• Key metrics identified\n• Patterns observed in the data\n• Areas requiring attention noted\n• Opportunities for improvement identified".to_string(),
        StoryComponent::ActionPlan => "• Review findings with the leadership team (Timeline: 30 days)\n• Develop a detailed action plan (Timeline: 60 days)\n• Implement the recommended changes (Timeline: 90 days)".to_string(),
    }
}

/// Request settings for narrative text: a little warmer and longer than the pipeline's.
pub fn narrative_request(prompt: String, config: &GatewayConfig) -> GenerationRequest {
    GenerationRequest {
        prompt,
        temperature: 0.4,
        num_predict: 800,
        num_ctx: 4096,
        top_k: 40,
        top_p: 0.9,
        timeout: Duration::from_secs(config.timeout_secs),
        auto_tune: false,
    }
}

/// Snapshot metrics plus the numeric evidence of the journey's source discovery.
pub fn story_metrics(
    journey: &Journey,
    discoveries: &[Discovery],
    snapshot: &MetricSnapshot,
) -> MetricSnapshot {
    let mut metrics = snapshot.clone();
    let Some(discovery) = journey
        .source
        .as_deref()
        .and_then(|key| discoveries.iter().find(|d| d.key == key))
    else {
        return metrics;
    };
    let prefix = normalize_key(&discovery.key);
    let evidence = &discovery.evidence;
    for (name, value) in [
        ("count", evidence.count.map(|c| c as f64)),
        ("percentage", evidence.percentage),
        ("amount", evidence.amount),
        ("correlation", evidence.correlation),
        ("variance", evidence.variance),
    ] {
        if let Some(value) = value {
            metrics.insert(&format!("{prefix}_{name}"), value);
        }
    }
    for (name, value) in &evidence.metrics {
        metrics.insert(&format!("{prefix}_{name}"), *value);
    }
    metrics
}

pub struct NarrativeGenerator<G> {
    gateway: G,
    request: GatewayConfig,
    currency: String,
}

impl<G: TextGenerator> NarrativeGenerator<G> {
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

    fn component(
        &self,
        component: StoryComponent,
        title: &str,
        focus: &str,
        metrics: &MetricSnapshot,
        chain: &ChainContext,
    ) -> NarrativeSection {
        let rendered = format_metrics_for_prompt(metrics, component.metric_limit(), &self.currency);
        let prompt = component_prompt(component, title, focus, &rendered, chain);
        let text = match self.gateway.generate(&narrative_request(prompt, &self.request)) {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                warn!("Empty narrative for {} of '{title}'", component.as_str());
                None
            }
            Err(err) => {
                warn!("Narrative {} of '{title}' failed: {err}", component.as_str());
                None
            }
        };
        match text {
            Some(text) => NarrativeSection {
                component,
                text,
                source: Source::Model,
            },
            None => {
                debug!("Using fallback {} for '{title}'", component.as_str());
                NarrativeSection {
                    component,
                    text: fallback_text(component, title),
                    source: Source::Fallback,
                }
            }
        }
    }

    /// All six components for one story, in order.
    pub fn story(
        &self,
        key: &str,
        title: &str,
        focus: &str,
        metrics: &MetricSnapshot,
    ) -> StoryNarrative {
        let mut chain = ChainContext::default();
        let mut sections = Vec::with_capacity(StoryComponent::ALL.len());
        for component in StoryComponent::ALL {
            let section = self.component(component, title, focus, metrics, &chain);
            let text = Some(section.text.clone());
            match component {
                StoryComponent::BusinessContext => chain.story_context = text,
                StoryComponent::DataInsights => chain.insights = text,
                StoryComponent::BusinessImpact => chain.impact = text,
                StoryComponent::FindingsSummary => chain.findings = text,
                StoryComponent::OpeningNarrative | StoryComponent::ActionPlan => {}
            }
            sections.push(section);
        }
        StoryNarrative {
            journey_key: key.to_string(),
            title: title.to_string(),
            sections,
        }
    }

    /// Narratives for the first `limit` journeys; stories without metrics are skipped.
    pub fn narrate_journeys(
        &self,
        journeys: &[Journey],
        discoveries: &[Discovery],
        snapshot: &MetricSnapshot,
        limit: usize,
    ) -> Vec<StoryNarrative> {
        let selected = &journeys[..limit.min(journeys.len())];
        let mut narratives = Vec::with_capacity(selected.len());
        for (idx, journey) in selected.iter().enumerate() {
            let metrics = story_metrics(journey, discoveries, snapshot);
            if metrics.is_empty() {
                warn!("No metrics found for journey '{}'; skipping", journey.key);
                continue;
            }
            info!("Narrating story {}/{}: {}", idx + 1, selected.len(), journey.name);
            narratives.push(self.story(&journey.key, &journey.name, &journey.rationale, &metrics));
        }
        narratives
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::gateway::{GatewayError, OfflineGateway};

    struct Recording {
        prompts: RefCell<Vec<String>>,
    }

    impl TextGenerator for Recording {
        fn generate(&self, request: &GenerationRequest) -> Result<String, GatewayError> {
            let mut prompts = self.prompts.borrow_mut();
            prompts.push(request.prompt.clone());
            Ok(format!("section {}", prompts.len()))
        }
    }

    fn metrics() -> MetricSnapshot {
        [("total_records".to_string(), 1000.0)].into_iter().collect()
    }

    #[test]
    fn later_components_quote_earlier_output() {
        let gateway = Recording {
            prompts: RefCell::new(Vec::new()),
        };
        let generator = NarrativeGenerator::new(&gateway, GatewayConfig::default());
        let story = generator.story("k", "Market Mix", "where students come from", &metrics());
        assert_eq!(story.sections.len(), 6);
        let prompts = gateway.prompts.borrow();
        assert!(prompts[2].contains("Context: section 1"));
        assert!(prompts[3].contains("Data Insights: section 3"));
        assert!(prompts[4].contains("Business Impact: section 4"));
        assert!(prompts[5].contains("Key Findings: section 5"));
        assert!(!prompts[1].contains("section 1"));
    }

    #[test]
    fn failures_use_fallback_paragraphs() {
        let generator = NarrativeGenerator::new(OfflineGateway, GatewayConfig::default());
        let story = generator.story("k", "Aid Impact", "aid", &metrics());
        assert!(story.sections.iter().all(|s| s.source == Source::Fallback));
        assert_eq!(
            story.section(StoryComponent::OpeningNarrative),
            Some("Our analysis of aid impact reveals important patterns in the data that require attention.")
        );
    }

    #[test]
    fn empty_metrics_skip_the_story() {
        let generator = NarrativeGenerator::new(OfflineGateway, GatewayConfig::default());
        let journey = Journey {
            name: "A".into(),
            key: "a".into(),
            icon: "x".into(),
            priority: 1,
            kind: crate::journey::JourneyKind::Descriptive,
            rationale: String::new(),
            business_value: String::new(),
            source: None,
        };
        assert!(generator.narrate_journeys(&[journey], &[], &MetricSnapshot::new(), 3).is_empty());
    }
}
