//! Analysis pipeline - signals in, [`AnalysisResult`] out
//!
//! The [`Analyzer`] runs category aggregation and risk scoring for one
//! domain. Results are produced fresh per evaluation and never mutated.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    aggregate_categories, Category, CategoryBreakdown, RiskLevel, RiskScorer, ScoreFactors,
    ScoringProfile, Signal,
};

/// The domain as observed during one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSnapshot {
    pub domain: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// CDN fronting the domain, as reported by the collaborator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdn_provider: Option<String>,
    pub signals: Vec<Signal>,
}

/// Composite risk verdict for one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub domain: DomainSnapshot,
    /// Composite risk score (JLI), within [0, 1]
    #[serde(rename = "jli_score")]
    pub score: f64,
    #[serde(rename = "jli_level")]
    pub level: RiskLevel,
    pub category_breakdown: BTreeMap<Category, CategoryBreakdown>,
    pub profile_used: String,
    pub factors: ScoreFactors,
}

impl AnalysisResult {
    pub fn domain_name(&self) -> &str {
        &self.domain.domain
    }

    pub fn cdn_provider(&self) -> Option<&str> {
        self.domain.cdn_provider.as_deref()
    }

    pub fn signals(&self) -> &[Signal] {
        &self.domain.signals
    }

    /// Distinct signal ids in this result
    pub fn signal_ids(&self) -> HashSet<&str> {
        self.domain.signals.iter().map(|s| s.id.as_str()).collect()
    }

    /// Sum of category contributions before modifiers
    pub fn total_contribution(&self) -> f64 {
        self.category_breakdown.values().map(|b| b.contribution).sum()
    }
}

/// Aggregator + scorer pipeline bound to one profile
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    scorer: RiskScorer,
}

impl Analyzer {
    pub fn new(profile: ScoringProfile) -> Self {
        Self {
            scorer: RiskScorer::new(profile),
        }
    }

    pub fn profile(&self) -> &ScoringProfile {
        self.scorer.profile()
    }

    /// Evaluate a domain against freshly supplied signals
    pub fn analyze(&self, domain: &str, signals: Vec<Signal>) -> AnalysisResult {
        self.analyze_with_cdn(domain, signals, None)
    }

    /// Like [`Analyzer::analyze`], recording the detected CDN provider
    pub fn analyze_with_cdn(
        &self,
        domain: &str,
        signals: Vec<Signal>,
        cdn_provider: Option<&str>,
    ) -> AnalysisResult {
        let scores = aggregate_categories(&signals);
        let assessment = self.scorer.score(&scores, &signals);
        let now = Utc::now();

        debug!(
            "Analyzed {} with {} signals: {:.3} ({})",
            domain,
            signals.len(),
            assessment.score,
            assessment.level
        );

        AnalysisResult {
            domain: DomainSnapshot {
                domain: domain.to_string(),
                first_seen: now,
                last_seen: now,
                cdn_provider: cdn_provider.map(str::to_string),
                signals,
            },
            score: assessment.score,
            level: assessment.level,
            category_breakdown: assessment.breakdown,
            profile_used: self.profile().name().to_string(),
            factors: assessment.factors,
        }
    }
}
