//! Risk scoring
//!
//! Combines per-category scores with a [`ScoringProfile`] into a composite
//! risk score (the JLI) and a discrete [`RiskLevel`]:
//!
//! ```text
//! raw   = Σ weight[c] * score[c]          (five scoring categories)
//! score = clamp(raw * confidence * signal * temporal, 0, 1)
//! ```
//!
//! The modifiers are fixed heuristics, not learned values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Category, CategoryScores, ScoringProfile, Signal};

/// Categories needed before the verdict is no longer down-weighted
pub const CORROBORATING_CATEGORIES: usize = 3;

/// Confidence factor per present category below [`CORROBORATING_CATEGORIES`]
pub const CATEGORY_FACTOR_STEP: f64 = 0.33;

/// Confidence at which a signal counts as high-confidence
pub const HIGH_CONFIDENCE: f64 = 0.8;

/// Share of high-confidence signals that triggers the consistency boost
pub const HIGH_CONFIDENCE_RATIO: f64 = 0.7;

/// Multiplier applied for consistently high-confidence evidence
pub const CONSISTENCY_BOOST: f64 = 1.2;

/// Discrete risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the human-auditable breakdown
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    /// Aggregated category score
    pub score: f64,
    /// Profile weight (zero for unweighted categories)
    pub weight: f64,
    /// score * weight, before modifiers
    pub contribution: f64,
}

/// Modifiers that turned the raw weighted sum into the final score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub raw: f64,
    pub confidence: f64,
    pub signal: f64,
    pub temporal: f64,
}

/// Output of a single scoring pass
#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub score: f64,
    pub level: RiskLevel,
    pub breakdown: BTreeMap<Category, CategoryBreakdown>,
    pub factors: ScoreFactors,
}

/// Scores category maps against a validated profile
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    profile: ScoringProfile,
}

impl RiskScorer {
    pub fn new(profile: ScoringProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &ScoringProfile {
        &self.profile
    }

    /// Score aggregated categories, using the original signals for modifiers
    pub fn score(&self, scores: &CategoryScores, signals: &[Signal]) -> RiskAssessment {
        let mut raw = 0.0;
        for category in &Category::SCORED {
            let score = category_score(scores, category);
            raw = clamp_unit(raw + self.profile.weight(category) * score);
        }

        let factors = ScoreFactors {
            raw,
            confidence: confidence_factor(scores),
            signal: signal_factor(signals),
            temporal: temporal_factor(),
        };

        let mut score = clamp_unit(factors.raw * factors.confidence);
        score = clamp_unit(score * factors.signal);
        score = clamp_unit(score * factors.temporal);
        let level = self.classify(score);

        let breakdown = scores
            .keys()
            .map(|category| {
                let score = category_score(scores, category);
                let weight = self.profile.weight(category);
                let row = CategoryBreakdown {
                    score,
                    weight,
                    contribution: clamp_unit(score * weight),
                };
                (category.clone(), row)
            })
            .collect();

        debug!(
            "Scored {} categories: raw {:.3} x conf {:.2} x signal {:.2} x temporal {:.2} = {:.3} ({})",
            scores.len(),
            factors.raw,
            factors.confidence,
            factors.signal,
            factors.temporal,
            score,
            level
        );

        RiskAssessment {
            score,
            level,
            breakdown,
            factors,
        }
    }

    /// Map a score onto a level; thresholds are inclusive
    pub fn classify(&self, score: f64) -> RiskLevel {
        let thresholds = self.profile.thresholds();
        if score >= thresholds.high {
            RiskLevel::High
        } else if score >= thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Down-weights verdicts resting on fewer than three signal families
pub fn confidence_factor(scores: &CategoryScores) -> f64 {
    let present = Category::SCORED
        .iter()
        .filter(|category| category_score(scores, category) > 0.0)
        .count();

    if present >= CORROBORATING_CATEGORIES {
        1.0
    } else {
        present as f64 * CATEGORY_FACTOR_STEP
    }
}

/// Boosts verdicts where most evidence is high-confidence
pub fn signal_factor(signals: &[Signal]) -> f64 {
    if signals.is_empty() {
        return 1.0;
    }

    let high = signals
        .iter()
        .filter(|s| s.effective_confidence() >= HIGH_CONFIDENCE)
        .count();

    if high as f64 / signals.len() as f64 >= HIGH_CONFIDENCE_RATIO {
        CONSISTENCY_BOOST
    } else {
        1.0
    }
}

/// Recency weighting hook, neutral for now
pub fn temporal_factor() -> f64 {
    1.0
}

fn category_score(scores: &CategoryScores, category: &Category) -> f64 {
    scores.get(category).copied().map(clamp_unit).unwrap_or(0.0)
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
