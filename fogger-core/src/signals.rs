//! Signals - atomic, confidence-scored units of evidence about a domain
//!
//! Signals are produced by external collaborators (content matchers, payment
//! detectors, CDN classifiers, DNS probes) and are immutable once built:
//! - Each signal belongs to exactly one [`Category`]
//! - Confidence is always within [0, 1]
//! - Evidence points at the raw observation, it never embeds it
//! - Shared infrastructure can be carried as structured [`Resource`]s

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signal families
///
/// The five scoring categories feed the weighted risk score. `Monitor` is
/// informational only (emitted by the domain monitor on score changes) and
/// `Other` carries any category name a collaborator invents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    /// Gambling UI / keyword hits
    Ux,
    /// Payment-method fingerprints
    Payment,
    /// Infrastructure correlation (origin IPs, shared hosting)
    Infra,
    /// Domain churn and DNS behaviour
    Dns,
    /// CDN usage patterns
    Cdn,
    /// Monitor bookkeeping, never weighted
    Monitor,
    /// Unknown category, never weighted
    Other(String),
}

impl Category {
    /// Categories that carry a weight in a scoring profile
    pub const SCORED: [Category; 5] = [
        Category::Ux,
        Category::Payment,
        Category::Infra,
        Category::Dns,
        Category::Cdn,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Category::Ux => "UX",
            Category::Payment => "PAYMENT",
            Category::Infra => "INFRA",
            Category::Dns => "DNS",
            Category::Cdn => "CDN",
            Category::Monitor => "MONITOR",
            Category::Other(name) => name,
        }
    }

    /// Whether this category participates in the weighted score
    pub fn is_scored(&self) -> bool {
        Self::SCORED.contains(self)
    }
}

impl From<String> for Category {
    fn from(name: String) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "UX" => Category::Ux,
            "PAYMENT" => Category::Payment,
            "INFRA" => Category::Infra,
            "DNS" => Category::Dns,
            "CDN" => Category::Cdn,
            "MONITOR" => Category::Monitor,
            _ => Category::Other(name),
        }
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Category::from(name.to_string())
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        match category {
            Category::Other(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-auditable pointer backing a signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Kind of observation (keyword_match, http_header, dns_record, ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// Where the observation can be found again
    pub reference: String,
    /// When it was observed
    pub timestamp: DateTime<Utc>,
}

impl Evidence {
    pub fn new(kind: &str, reference: &str) -> Self {
        Self {
            kind: kind.to_string(),
            reference: reference.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Kinds of concrete resources that can tie domains to one operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Origin IP address behind a CDN
    Ip,
    /// Cryptocurrency wallet or payment account token
    Wallet,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Ip => "ip",
            ResourceKind::Wallet => "wallet",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete shared resource reported by a collaborator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub value: String,
}

impl Resource {
    pub fn new(kind: ResourceKind, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// A categorized, confidence-scored unit of evidence about a domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Stable identifier (e.g. "payment_method_qris", "cdn_cloudflare")
    #[serde(rename = "signal_id")]
    pub id: String,

    pub category: Category,

    /// Free-text description from the producing collaborator
    pub description: String,

    /// Producer's confidence (0.0 - 1.0)
    pub confidence: f64,

    #[serde(default)]
    pub evidence: Vec<Evidence>,

    /// Structured resources, preferred over description parsing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Resource>,
}

impl Signal {
    /// Create a new signal builder
    pub fn builder(id: &str, category: Category) -> SignalBuilder {
        SignalBuilder::new(id, category)
    }

    /// Confidence as used by scoring: non-finite values count as zero
    pub fn effective_confidence(&self) -> f64 {
        if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Builder for signals
pub struct SignalBuilder {
    id: String,
    category: Category,
    description: String,
    confidence: f64,
    evidence: Vec<Evidence>,
    resources: Vec<Resource>,
}

impl SignalBuilder {
    pub fn new(id: &str, category: Category) -> Self {
        Self {
            id: id.to_string(),
            category,
            description: String::new(),
            confidence: 1.0,
            evidence: Vec::new(),
            resources: Vec::new(),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn evidence(mut self, evidence: Evidence) -> Self {
        self.evidence.push(evidence);
        self
    }

    pub fn resource(mut self, kind: ResourceKind, value: &str) -> Self {
        self.resources.push(Resource::new(kind, value));
        self
    }

    pub fn build(self) -> Signal {
        Signal {
            id: self.id,
            category: self.category,
            description: self.description,
            confidence: self.confidence,
            evidence: self.evidence,
            resources: self.resources,
        }
    }
}
