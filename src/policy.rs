//! Thresholds used by the discovery engine.
//!
//! The defaults were tuned on higher-education enrolment exports (a 0-4
//! grade scale, tuition and scholarship amounts, nationality as the market
//! dimension). They are policy, not law: every value can be overridden from
//! the `policy` section of the configuration file.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisPolicy {
    /// Minimum |r| for a numeric pair to be reported.
    pub correlation_threshold: f64,
    pub max_correlations: usize,
    /// |r| above which a reported correlation is called strong, then moderate.
    pub correlation_strong: f64,
    pub correlation_moderate: f64,
    /// Group-mean gap separating positive/negative from neutral exposure effects.
    pub mean_difference_threshold: f64,
    pub min_group_size: usize,
    pub max_segment_distinct: usize,
    /// Std-dev of group means above which a segmentation is flagged.
    pub segment_variance_high: f64,
    pub segment_variance_moderate: f64,
    pub score_floor: f64,
    pub score_ceiling: f64,
    pub high_input_percentile: f64,
    pub low_outcome_threshold: f64,
    pub high_outcome_threshold: f64,
    /// Share (percent) under which a group counts as under-represented.
    pub underrepresented_share: f64,
    /// Share (percent) of affected records that grades an anomaly.
    pub anomaly_critical: f64,
    pub anomaly_high: f64,
    pub anomaly_moderate: f64,
    pub min_opportunity_group: usize,
    pub max_opportunity_groups: usize,
    pub concentration_critical: f64,
    pub concentration_high: f64,
    pub concentration_moderate: f64,
    pub sustainability_critical: f64,
    pub sustainability_high: f64,
    pub sustainability_moderate: f64,
    pub distribution_bins: usize,
    /// Diversity index (0-100) above which a market mix is high, then moderate.
    pub diversity_high: f64,
    pub diversity_moderate: f64,
}

impl Default for AnalysisPolicy {
    fn default() -> Self {
        Self {
            correlation_threshold: 0.3,
            max_correlations: 5,
            correlation_strong: 0.7,
            correlation_moderate: 0.5,
            mean_difference_threshold: 0.1,
            min_group_size: 5,
            max_segment_distinct: 50,
            segment_variance_high: 0.5,
            segment_variance_moderate: 0.3,
            score_floor: 0.0,
            score_ceiling: 4.0,
            high_input_percentile: 75.0,
            low_outcome_threshold: 2.0,
            high_outcome_threshold: 3.5,
            underrepresented_share: 5.0,
            anomaly_critical: 10.0,
            anomaly_high: 5.0,
            anomaly_moderate: 2.0,
            min_opportunity_group: 3,
            max_opportunity_groups: 3,
            concentration_critical: 70.0,
            concentration_high: 60.0,
            concentration_moderate: 45.0,
            sustainability_critical: 50.0,
            sustainability_high: 30.0,
            sustainability_moderate: 15.0,
            distribution_bins: 5,
            diversity_high: 70.0,
            diversity_moderate: 40.0,
        }
    }
}
