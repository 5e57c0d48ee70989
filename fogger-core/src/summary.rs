//! Summaries and filters over batches of analysis results

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AnalysisResult, Category, RiskLevel};

/// Distribution key for results without a detected CDN
pub const NO_CDN_PROVIDER: &str = "none";

/// Campaign-level overview of a batch of results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub total_domains: usize,
    pub high_risk_domains: usize,
    pub medium_risk_domains: usize,
    pub low_risk_domains: usize,
    pub high_risk_percentage: f64,
    pub average_score: f64,
    /// Number of domains per CDN provider
    pub cdn_distribution: BTreeMap<String, usize>,
    /// Number of signals seen per category across all results
    pub category_distribution: BTreeMap<Category, usize>,
}

impl ResultSummary {
    pub fn from_results(results: &[AnalysisResult]) -> Self {
        if results.is_empty() {
            return Self::default();
        }

        let mut summary = Self {
            total_domains: results.len(),
            ..Self::default()
        };

        let mut total_score = 0.0;
        for result in results {
            match result.level {
                RiskLevel::High => summary.high_risk_domains += 1,
                RiskLevel::Medium => summary.medium_risk_domains += 1,
                RiskLevel::Low => summary.low_risk_domains += 1,
            }
            total_score += result.score;

            let provider = result.cdn_provider().unwrap_or(NO_CDN_PROVIDER);
            *summary
                .cdn_distribution
                .entry(provider.to_string())
                .or_insert(0) += 1;

            for signal in result.signals() {
                *summary
                    .category_distribution
                    .entry(signal.category.clone())
                    .or_insert(0) += 1;
            }
        }

        let total = results.len() as f64;
        summary.average_score = total_score / total;
        summary.high_risk_percentage = summary.high_risk_domains as f64 / total * 100.0;
        summary
    }
}

/// Results whose score lies within `[min, max]`
pub fn filter_by_score(results: &[AnalysisResult], min: f64, max: f64) -> Vec<&AnalysisResult> {
    results
        .iter()
        .filter(|r| r.score >= min && r.score <= max)
        .collect()
}

/// Results fronted by exactly `provider`
pub fn filter_by_cdn_provider<'a>(
    results: &'a [AnalysisResult],
    provider: &str,
) -> Vec<&'a AnalysisResult> {
    results
        .iter()
        .filter(|r| r.cdn_provider() == Some(provider))
        .collect()
}

/// Results last seen strictly between `start` and `end`
pub fn filter_by_time(
    results: &[AnalysisResult],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<&AnalysisResult> {
    results
        .iter()
        .filter(|r| r.domain.last_seen > start && r.domain.last_seen < end)
        .collect()
}
