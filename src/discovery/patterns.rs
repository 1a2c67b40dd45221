use crate::{
    data::normalize_key,
    frequency::ValueCounts,
    stats::{self, round_to},
};

use super::{Discovery, DiscoveryCategory, Evidence, Scope, fmt_amount};

const TIER_NAMES: [&str; 3] = ["low", "mid", "high"];

/// Mean outcome per input tertile, over records that received a positive input.
pub(super) fn financial(scope: &Scope<'_>) -> Vec<Discovery> {
    let (Some(aid), Some(score)) = (
        scope.columns.aid.as_deref(),
        scope.columns.score.as_deref(),
    ) else {
        return Vec::new();
    };
    let mut pairs = scope
        .dataset
        .numeric_column(aid)
        .into_iter()
        .zip(scope.dataset.numeric_column(score))
        .filter_map(|(input, outcome)| match (input, outcome) {
            (Some(i), Some(o)) if i > 0.0 => Some((i, o)),
            _ => None,
        })
        .collect::<Vec<_>>();
    if pairs.len() < TIER_NAMES.len() {
        return Vec::new();
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let n = pairs.len();
    let mut evidence = Evidence::from_columns([aid, score])
        .count(n)
        .amount(round_to(pairs.iter().map(|(i, _)| i).sum::<f64>(), 2));
    let mut tier_means = [0.0; 3];
    for (tier, name) in TIER_NAMES.iter().enumerate() {
        let chunk = &pairs[tier * n / 3..(tier + 1) * n / 3];
        let outcomes = chunk.iter().map(|(_, o)| *o).collect::<Vec<_>>();
        let avg = stats::mean(&outcomes).unwrap_or_default();
        tier_means[tier] = avg;
        let max_input = chunk.last().map_or(0.0, |(i, _)| *i);
        evidence = evidence
            .metric(&format!("{name}_tier_mean_outcome"), round_to(avg, 3))
            .metric(&format!("{name}_tier_max_input"), round_to(max_input, 2));
    }

    let lift = tier_means[2] - tier_means[0];
    let threshold = scope.policy.mean_difference_threshold;
    let pattern = if lift > threshold {
        "increasing"
    } else if lift < -threshold {
        "decreasing"
    } else {
        "flat"
    };
    let insight = format!(
        "Splitting {n} supported records into {aid} tertiles gives average {score} of {:.2} (low), {:.2} (mid) and {:.2} (high); return on larger awards is {pattern}",
        tier_means[0], tier_means[1], tier_means[2]
    );
    vec![Discovery::new(
        DiscoveryCategory::FinancialPatterns,
        "aid_roi_by_tier",
        insight,
        evidence
            .pattern(pattern)
            .metric("tier_lift", round_to(lift, 3))
            .label("tiering", "tertile"),
    )]
}

/// Five fixed bins over the bounded score range, classified by shape.
pub(super) fn academic(scope: &Scope<'_>) -> Vec<Discovery> {
    let Some(score) = scope.columns.score.as_deref() else {
        return Vec::new();
    };
    let values = scope.dataset.numeric_values(score);
    let policy = scope.policy;
    let bins = policy.distribution_bins.max(3);
    let span = policy.score_ceiling - policy.score_floor;
    if values.is_empty() || span <= 0.0 {
        return Vec::new();
    }
    let width = span / bins as f64;
    let mut counts = vec![0usize; bins];
    for value in &values {
        let idx = ((value - policy.score_floor) / width).floor();
        let idx = (idx.max(0.0) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    let first = counts[0];
    let middle = counts[bins / 2];
    let last = counts[bins - 1];
    let (shape, direction) = if first > middle && last > middle {
        ("bimodal", "both_ends")
    } else if middle >= first && middle >= last {
        ("normal", "centre")
    } else if last > first {
        ("skewed", "high")
    } else {
        ("skewed", "low")
    };

    let summary = stats::Summary::from_values(&values);
    let mut evidence = Evidence::from_columns([score])
        .count(values.len())
        .pattern(shape)
        .label("direction", direction);
    if let Some(summary) = &summary {
        evidence = evidence
            .variance(round_to(summary.std_dev, 3))
            .metric("mean", round_to(summary.mean, 3))
            .metric("median", round_to(summary.median, 3));
    }
    let mut described = Vec::with_capacity(bins);
    for (idx, count) in counts.iter().enumerate() {
        let low = policy.score_floor + width * idx as f64;
        let high = low + width;
        evidence = evidence.metric(&format!("bin_{}", idx + 1), *count as f64);
        described.push(format!("{low:.1}-{high:.1}: {count}"));
    }
    let insight = match shape {
        "bimodal" => format!(
            "{score} is bimodal: both the lowest and highest bands outnumber the middle ({})",
            described.join(", ")
        ),
        "normal" => format!(
            "{score} clusters around the middle of the scale ({})",
            described.join(", ")
        ),
        _ => format!(
            "{score} is skewed toward the {direction} end of the scale ({})",
            described.join(", ")
        ),
    };
    vec![Discovery::new(
        DiscoveryCategory::AcademicPatterns,
        format!("{}_distribution", normalize_key(score)),
        insight,
        evidence,
    )]
}

/// Normalised Shannon diversity of the market column.
pub(super) fn market(scope: &Scope<'_>) -> Vec<Discovery> {
    let Some(column) = scope.columns.nationality.as_deref() else {
        return Vec::new();
    };
    let counts = ValueCounts::for_column(scope.dataset, column);
    if counts.distinct() < 2 {
        return Vec::new();
    }
    let index = counts.diversity_index();
    let tier = if index > scope.policy.diversity_high {
        "high"
    } else if index > scope.policy.diversity_moderate {
        "moderate"
    } else {
        "low"
    };
    let mut evidence = Evidence::from_columns([column])
        .count(counts.total())
        .pattern(tier)
        .metric("diversity_index", round_to(index, 2))
        .metric("distinct_values", counts.distinct() as f64);
    if let Some(revenue) = scope.columns.revenue.as_deref() {
        let total = scope.dataset.numeric_values(revenue).iter().sum::<f64>();
        if total > 0.0 {
            evidence.columns.push(revenue.to_string());
            evidence = evidence.amount(round_to(total, 2));
        }
    }
    let insight = format!(
        "{} distinct {column} values give a diversity index of {index:.1}/100 ({tier}){}",
        counts.distinct(),
        evidence
            .amount
            .map(|a| format!(", spread across {} in revenue", fmt_amount(a)))
            .unwrap_or_default()
    );
    vec![Discovery::new(
        DiscoveryCategory::MarketPatterns,
        format!("{}_diversity", normalize_key(column)),
        insight,
        evidence,
    )]
}
