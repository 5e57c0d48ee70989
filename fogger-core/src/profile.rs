//! Scoring profiles - operator-supplied weights and thresholds
//!
//! A [`ScoringProfile`] can only be obtained through validation: the five
//! scoring weights must sum to 1.0 and the thresholds must be ordered and
//! within [0, 1]. Invalid profiles are rejected, never normalized.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Category;

/// Tolerance when checking that weights sum to 1.0
pub const WEIGHT_EPSILON: f64 = 1e-6;

/// Name of the default profile
pub const DEFAULT_PROFILE: &str = "standard";

/// Errors from profile validation
#[derive(Debug, Error, PartialEq)]
pub enum ProfileError {
    #[error("scoring weights sum to {0:.6}, expected 1.0")]
    WeightSum(f64),

    #[error("weight for {category} is {weight}, expected a value within [0, 1]")]
    WeightRange { category: Category, weight: f64 },

    #[error("category {0} cannot carry a scoring weight")]
    UnscoredCategory(Category),

    #[error("high threshold ({high}) must be >= medium threshold ({medium})")]
    ThresholdOrder { high: f64, medium: f64 },

    #[error("thresholds must be within [0, 1] (high {high}, medium {medium})")]
    ThresholdRange { high: f64, medium: f64 },

    #[error("profile '{0}' not found")]
    UnknownProfile(String),

    #[error("failed to parse profile: {0}")]
    Parse(String),
}

/// Classification thresholds (inclusive lower bounds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub high: f64,
    pub medium: f64,
}

/// Unvalidated profile as written by an operator
#[derive(Debug, Clone, Deserialize)]
struct RawProfile {
    #[serde(default = "default_name")]
    name: String,
    weights: BTreeMap<Category, f64>,
    thresholds: Thresholds,
}

fn default_name() -> String {
    "custom".to_string()
}

/// A validated set of category weights and classification thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawProfile")]
pub struct ScoringProfile {
    name: String,
    weights: BTreeMap<Category, f64>,
    thresholds: Thresholds,
}

impl TryFrom<RawProfile> for ScoringProfile {
    type Error = ProfileError;

    fn try_from(raw: RawProfile) -> Result<Self, Self::Error> {
        ScoringProfile::new(&raw.name, raw.weights, raw.thresholds)
    }
}

impl ScoringProfile {
    /// Validate and build a profile
    pub fn new(
        name: &str,
        weights: BTreeMap<Category, f64>,
        thresholds: Thresholds,
    ) -> Result<Self, ProfileError> {
        for (category, &weight) in &weights {
            if !category.is_scored() {
                return Err(ProfileError::UnscoredCategory(category.clone()));
            }
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(ProfileError::WeightRange {
                    category: category.clone(),
                    weight,
                });
            }
        }

        let total: f64 = weights.values().sum();
        if (total - 1.0).abs() > WEIGHT_EPSILON {
            return Err(ProfileError::WeightSum(total));
        }

        let Thresholds { high, medium } = thresholds;
        let in_range = |t: f64| t.is_finite() && (0.0..=1.0).contains(&t);
        if !in_range(high) || !in_range(medium) {
            return Err(ProfileError::ThresholdRange { high, medium });
        }
        if high < medium {
            return Err(ProfileError::ThresholdOrder { high, medium });
        }

        Ok(Self {
            name: name.to_string(),
            weights,
            thresholds,
        })
    }

    /// Build a profile from weights in UX, PAYMENT, INFRA, DNS, CDN order
    pub fn from_weights(
        name: &str,
        weights: [f64; 5],
        thresholds: Thresholds,
    ) -> Result<Self, ProfileError> {
        let weights = Category::SCORED.into_iter().zip(weights).collect();
        Self::new(name, weights, thresholds)
    }

    /// Parse and validate a profile from TOML text
    ///
    /// ```toml
    /// name = "strict"
    ///
    /// [weights]
    /// UX = 0.3
    /// PAYMENT = 0.25
    /// INFRA = 0.2
    /// DNS = 0.15
    /// CDN = 0.1
    ///
    /// [thresholds]
    /// high = 0.75
    /// medium = 0.5
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, ProfileError> {
        let raw: RawProfile =
            toml::from_str(text).map_err(|e| ProfileError::Parse(e.to_string()))?;
        Self::try_from(raw)
    }

    /// Look up one of the built-in profiles
    pub fn builtin(name: &str) -> Result<Self, ProfileError> {
        let (weights, high, medium) = match name {
            "standard" => ([0.30, 0.25, 0.20, 0.15, 0.10], 0.75, 0.50),
            "intensive" => ([0.35, 0.30, 0.20, 0.10, 0.05], 0.60, 0.30),
            "conservative" => ([0.20, 0.20, 0.25, 0.25, 0.10], 0.85, 0.65),
            "aggressive" => ([0.40, 0.30, 0.15, 0.10, 0.05], 0.50, 0.25),
            _ => return Err(ProfileError::UnknownProfile(name.to_string())),
        };
        Self::from_weights(name, weights, Thresholds { high, medium })
    }

    /// Names accepted by [`ScoringProfile::builtin`]
    pub fn builtin_names() -> &'static [&'static str] {
        &["standard", "intensive", "conservative", "aggressive"]
    }

    /// The default `standard` profile
    pub fn standard() -> Self {
        Self {
            name: DEFAULT_PROFILE.to_string(),
            weights: Category::SCORED
                .into_iter()
                .zip([0.30, 0.25, 0.20, 0.15, 0.10])
                .collect(),
            thresholds: Thresholds {
                high: 0.75,
                medium: 0.50,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn weights(&self) -> &BTreeMap<Category, f64> {
        &self.weights
    }

    /// Weight for a category, zero when the profile does not weight it
    pub fn weight(&self, category: &Category) -> f64 {
        self.weights.get(category).copied().unwrap_or(0.0)
    }
}

impl Default for ScoringProfile {
    fn default() -> Self {
        Self::standard()
    }
}
