//! Cluster engine - attributes domains to operator-level groups
//!
//! Each newly scored domain is compared against every known cluster:
//!
//! ```text
//! similarity = 0.4 * |cluster categories ∩ domain categories| / |cluster categories|
//!            + 0.6 * |matching resources| / |domain resources|
//! ```
//!
//! The best cluster at or above [`JOIN_THRESHOLD`] absorbs the domain,
//! otherwise the domain founds a new cluster. The weights are tuning
//! constants without ground-truth calibration.
//!
//! The engine does no internal locking. Mutation takes `&mut self`, so
//! sharing it across threads is left to the caller.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::{extract_resources, AnalysisResult, Category, ResourceKind, ResourceMap, Signal};

/// Weight of the shared-category term
pub const CATEGORY_SIMILARITY_WEIGHT: f64 = 0.4;

/// Weight of the shared-resource term
pub const RESOURCE_SIMILARITY_WEIGHT: f64 = 0.6;

/// Minimum similarity for a domain to join an existing cluster
pub const JOIN_THRESHOLD: f64 = 0.5;

/// Confidence at which a cluster counts as high-confidence in statistics
pub const HIGH_CONFIDENCE_CLUSTER: f64 = 0.7;

const DOMAIN_CONFIDENCE_STEP: f64 = 0.3;
const SIGNAL_CONFIDENCE_STEP: f64 = 0.2;
const RESOURCE_CONFIDENCE_STEP: f64 = 0.3;

/// Length of the hex fingerprint used as cluster id
const CLUSTER_ID_LEN: usize = 12;

/// Errors from cluster operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error("cluster {0} not found")]
    NotFound(String),

    #[error("cannot merge cluster {0} into itself")]
    SelfMerge(String),
}

/// A group of domains believed to share an operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(rename = "cluster_id")]
    pub id: String,
    pub confidence: f64,
    pub domains: BTreeSet<String>,
    /// Union of the member domains' signal categories
    pub categories: BTreeSet<Category>,
    #[serde(rename = "shared_signals")]
    pub shared_signal_ids: BTreeSet<String>,
    pub shared_resources: ResourceMap,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Cluster {
    pub fn contains(&self, domain: &str) -> bool {
        self.domains.contains(domain)
    }

    /// Similarity between this cluster and a candidate domain
    pub fn similarity(&self, categories: &BTreeSet<Category>, resources: &ResourceMap) -> f64 {
        let mut score = 0.0;

        if !self.categories.is_empty() {
            let shared = self.categories.intersection(categories).count();
            score += CATEGORY_SIMILARITY_WEIGHT * shared as f64 / self.categories.len() as f64;
        }

        if !resources.is_empty() {
            let matching = resources
                .iter()
                .filter(|&(kind, value)| self.shared_resources.get(kind) == Some(value))
                .count();
            score += RESOURCE_SIMILARITY_WEIGHT * matching as f64 / resources.len() as f64;
        }

        score
    }

    /// Add a domain, keeping resources this cluster already knows
    fn absorb(&mut self, domain: &str, categories: BTreeSet<Category>, resources: ResourceMap) {
        self.domains.insert(domain.to_string());
        self.categories.extend(categories);
        for (kind, value) in resources {
            self.shared_resources.entry(kind).or_insert(value);
        }
        self.last_seen = Utc::now();
    }
}

/// Aggregate view over the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub total_clusters: usize,
    pub total_domains: usize,
    pub high_confidence_clusters: usize,
    pub avg_domains_per_cluster: f64,
}

/// In-memory registry of clusters
#[derive(Debug, Default)]
pub struct ClusterEngine {
    clusters: BTreeMap<String, Cluster>,
}

impl ClusterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a domain to the most similar cluster or found a new one
    ///
    /// Returns the id of the cluster the domain ended up in.
    pub fn add_domain(&mut self, domain: &str, signals: &[Signal]) -> String {
        let categories: BTreeSet<Category> = signals.iter().map(|s| s.category.clone()).collect();
        let resources = extract_resources(signals);

        if let Some((id, similarity)) = self.best_match(&categories, &resources) {
            if let Some(cluster) = self.clusters.get_mut(&id) {
                cluster.absorb(domain, categories, resources);
                debug!("Domain {} joined cluster {} (similarity {:.2})", domain, id, similarity);
                return id;
            }
        }

        let id = cluster_fingerprint(domain, signals);
        if let Some(existing) = self.clusters.get_mut(&id) {
            existing.absorb(domain, categories, resources);
            debug!("Domain {} re-registered into cluster {}", domain, id);
            return id;
        }

        let now = Utc::now();
        let cluster = Cluster {
            id: id.clone(),
            confidence: 1.0,
            domains: BTreeSet::from([domain.to_string()]),
            categories,
            shared_signal_ids: signals
                .iter()
                .filter(|s| is_attribution_category(&s.category))
                .map(|s| s.id.clone())
                .collect(),
            shared_resources: resources,
            first_seen: now,
            last_seen: now,
        };

        info!(
            "New cluster {} for {} ({} shared signals, {} resources)",
            id,
            domain,
            cluster.shared_signal_ids.len(),
            cluster.shared_resources.len()
        );
        self.clusters.insert(id.clone(), cluster);
        id
    }

    /// Cluster an analysed domain
    pub fn add_result(&mut self, result: &AnalysisResult) -> String {
        self.add_domain(result.domain_name(), result.signals())
    }

    /// Highest-similarity cluster at or above the join threshold.
    /// Ties go to the lowest id.
    fn best_match(
        &self,
        categories: &BTreeSet<Category>,
        resources: &ResourceMap,
    ) -> Option<(String, f64)> {
        let mut best: Option<(&str, f64)> = None;

        for (id, cluster) in &self.clusters {
            let similarity = cluster.similarity(categories, resources);
            if best.map_or(true, |(_, top)| similarity > top) {
                best = Some((id.as_str(), similarity));
            }
        }

        best.filter(|&(_, similarity)| similarity >= JOIN_THRESHOLD)
            .map(|(id, similarity)| (id.to_string(), similarity))
    }

    /// Fold cluster `absorbed` into `target` and delete `absorbed`
    pub fn merge_clusters(&mut self, target: &str, absorbed: &str) -> Result<(), ClusterError> {
        if target == absorbed {
            return Err(ClusterError::SelfMerge(target.to_string()));
        }
        if !self.clusters.contains_key(target) {
            return Err(ClusterError::NotFound(target.to_string()));
        }
        let source = self
            .clusters
            .remove(absorbed)
            .ok_or_else(|| ClusterError::NotFound(absorbed.to_string()))?;
        let cluster = self
            .clusters
            .get_mut(target)
            .ok_or_else(|| ClusterError::NotFound(target.to_string()))?;

        cluster.domains.extend(source.domains);
        cluster.categories.extend(source.categories);
        cluster.shared_signal_ids.extend(source.shared_signal_ids);
        cluster.shared_resources.extend(source.shared_resources);
        cluster.confidence = (cluster.confidence + source.confidence) / 2.0;
        cluster.first_seen = cluster.first_seen.min(source.first_seen);
        cluster.last_seen = cluster.last_seen.max(source.last_seen);

        info!(
            "Merged cluster {} into {} ({} domains)",
            absorbed,
            target,
            cluster.domains.len()
        );
        Ok(())
    }

    /// Recompute a cluster's confidence from its size
    pub fn update_cluster_confidence(&mut self, id: &str) -> Result<f64, ClusterError> {
        let cluster = self
            .clusters
            .get_mut(id)
            .ok_or_else(|| ClusterError::NotFound(id.to_string()))?;

        let confidence = DOMAIN_CONFIDENCE_STEP * cluster.domains.len() as f64
            + SIGNAL_CONFIDENCE_STEP * cluster.shared_signal_ids.len() as f64
            + RESOURCE_CONFIDENCE_STEP * cluster.shared_resources.len() as f64;
        cluster.confidence = confidence.min(1.0);

        Ok(cluster.confidence)
    }

    pub fn get_cluster(&self, id: &str) -> Option<&Cluster> {
        self.clusters.get(id)
    }

    pub fn cluster_for_domain(&self, domain: &str) -> Option<&Cluster> {
        self.clusters.values().find(|c| c.contains(domain))
    }

    pub fn find_clusters_by_resource(&self, kind: ResourceKind, value: &str) -> Vec<&Cluster> {
        self.clusters
            .values()
            .filter(|c| c.shared_resources.get(&kind).map(String::as_str) == Some(value))
            .collect()
    }

    /// All clusters, most recently active first
    pub fn all_clusters(&self) -> Vec<&Cluster> {
        let mut clusters: Vec<&Cluster> = self.clusters.values().collect();
        clusters.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        clusters
    }

    /// All clusters, highest confidence first
    pub fn clusters_by_confidence(&self) -> Vec<&Cluster> {
        let mut clusters = self.all_clusters();
        clusters.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        clusters
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn stats(&self) -> ClusterStats {
        let total_clusters = self.clusters.len();
        let total_domains = self.clusters.values().map(|c| c.domains.len()).sum();
        let high_confidence_clusters = self
            .clusters
            .values()
            .filter(|c| c.confidence >= HIGH_CONFIDENCE_CLUSTER)
            .count();
        let avg_domains_per_cluster = if total_clusters == 0 {
            0.0
        } else {
            total_domains as f64 / total_clusters as f64
        };

        ClusterStats {
            total_clusters,
            total_domains,
            high_confidence_clusters,
            avg_domains_per_cluster,
        }
    }
}

fn is_attribution_category(category: &Category) -> bool {
    matches!(category, Category::Infra | Category::Payment)
}

/// Deterministic id over the domain and its PAYMENT/INFRA signal ids
fn cluster_fingerprint(domain: &str, signals: &[Signal]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    for signal in signals.iter().filter(|s| is_attribution_category(&s.category)) {
        hasher.update(signal.id.as_bytes());
    }
    format!("{:x}", hasher.finalize())[..CLUSTER_ID_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin_ip(ip: &str) -> Signal {
        Signal::builder("infra_origin_ip", Category::Infra)
            .description(&format!("Detected origin IP {ip} behind CDN"))
            .confidence(0.9)
            .build()
    }

    fn wallet(address: &str) -> Signal {
        Signal::builder("crypto_bitcoin", Category::Payment)
            .description(&format!("Bitcoin cryptocurrency address: {address}"))
            .confidence(0.95)
            .build()
    }

    fn keyword(id: &str) -> Signal {
        Signal::builder(id, Category::Ux).confidence(0.7).build()
    }

    #[test]
    fn test_shared_origin_ip_clusters_together() {
        let mut engine = ClusterEngine::new();

        let first = engine.add_domain("slot-a.example", &[origin_ip("203.0.113.7")]);
        let second = engine.add_domain("slot-b.example", &[origin_ip("203.0.113.7")]);

        assert_eq!(first, second);
        assert_eq!(engine.len(), 1);
        let cluster = engine.get_cluster(&first).unwrap();
        assert!(cluster.contains("slot-a.example"));
        assert!(cluster.contains("slot-b.example"));
    }

    #[test]
    fn test_different_resources_split() {
        let mut engine = ClusterEngine::new();

        let first = engine.add_domain("a.example", &[origin_ip("203.0.113.7")]);
        let second = engine.add_domain("b.example", &[origin_ip("198.51.100.9")]);

        // shared INFRA category alone gives 0.4, below the join threshold
        assert_ne!(first, second);
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn test_similarity_terms() {
        let mut engine = ClusterEngine::new();
        let id = engine.add_domain(
            "a.example",
            &[
                origin_ip("203.0.113.7"),
                keyword("kw_slot"),
                wallet("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"),
            ],
        );
        let cluster = engine.get_cluster(&id).unwrap();

        let categories = BTreeSet::from([Category::Infra]);
        let mut resources = ResourceMap::new();
        resources.insert(ResourceKind::Ip, "203.0.113.7".to_string());
        resources.insert(ResourceKind::Wallet, "other-wallet-token-0000000".to_string());

        // 0.4 * 1/3 + 0.6 * 1/2
        let similarity = cluster.similarity(&categories, &resources);
        assert!((similarity - (0.4 / 3.0 + 0.3)).abs() < 1e-12);

        assert_eq!(cluster.similarity(&BTreeSet::new(), &ResourceMap::new()), 0.0);
    }

    #[test]
    fn test_new_cluster_seeding() {
        let mut engine = ClusterEngine::new();
        let signals = vec![
            origin_ip("203.0.113.7"),
            wallet("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"),
            keyword("kw_maxwin"),
        ];

        let id = engine.add_domain("a.example", &signals);
        let cluster = engine.get_cluster(&id).unwrap();

        assert_eq!(id.len(), 12);
        assert_eq!(id, cluster_fingerprint("a.example", &signals));
        assert_eq!(cluster.confidence, 1.0);
        assert_eq!(
            cluster.shared_signal_ids,
            BTreeSet::from(["infra_origin_ip".to_string(), "crypto_bitcoin".to_string()])
        );
        assert_eq!(cluster.shared_resources.len(), 2);
        assert_eq!(cluster.categories.len(), 3);
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let signals = vec![origin_ip("203.0.113.7"), keyword("kw_slot")];
        let a = cluster_fingerprint("a.example", &signals);
        let b = cluster_fingerprint("a.example", &[origin_ip("198.51.100.1")]);
        let c = cluster_fingerprint("b.example", &signals);

        // UX signals and descriptions do not take part
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_join_keeps_existing_resources() {
        let mut engine = ClusterEngine::new();
        let id = engine.add_domain("a.example", &[origin_ip("203.0.113.7")]);

        let joined = engine.add_domain(
            "b.example",
            &[origin_ip("203.0.113.7"), wallet("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa")],
        );
        assert_eq!(joined, id);

        let cluster = engine.get_cluster(&id).unwrap();
        assert_eq!(cluster.shared_resources[&ResourceKind::Ip], "203.0.113.7");
        assert_eq!(
            cluster.shared_resources[&ResourceKind::Wallet],
            "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"
        );
        assert!(cluster.categories.contains(&Category::Payment));
    }

    #[test]
    fn test_reregistering_domain_is_deduplicated() {
        let mut engine = ClusterEngine::new();
        let signals = vec![keyword("kw_slot")];

        let first = engine.add_domain("a.example", &signals);
        let second = engine.add_domain("a.example", &signals);

        assert_eq!(first, second);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.get_cluster(&first).unwrap().domains.len(), 1);
    }

    #[test]
    fn test_merge_clusters() {
        let mut engine = ClusterEngine::new();
        let a = engine.add_domain("a.example", &[origin_ip("203.0.113.7")]);
        let b = engine.add_domain(
            "b.example",
            &[origin_ip("198.51.100.9"), wallet("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa")],
        );
        engine.update_cluster_confidence(&a).unwrap();
        let confidence_a = engine.get_cluster(&a).unwrap().confidence;
        let last_seen_b = engine.get_cluster(&b).unwrap().last_seen;

        engine.merge_clusters(&a, &b).unwrap();

        assert!(engine.get_cluster(&b).is_none());
        let merged = engine.get_cluster(&a).unwrap();
        assert_eq!(merged.domains.len(), 2);
        assert_eq!(merged.shared_resources[&ResourceKind::Ip], "198.51.100.9");
        assert!(merged.shared_resources.contains_key(&ResourceKind::Wallet));
        assert!((merged.confidence - (confidence_a + 1.0) / 2.0).abs() < 1e-12);
        assert!(merged.last_seen >= last_seen_b);
    }

    #[test]
    fn test_merge_missing_cluster_has_no_effect() {
        let mut engine = ClusterEngine::new();
        let a = engine.add_domain("a.example", &[keyword("kw_slot")]);
        let before = engine.get_cluster(&a).cloned();

        assert_eq!(
            engine.merge_clusters(&a, "missing"),
            Err(ClusterError::NotFound("missing".to_string()))
        );
        assert_eq!(
            engine.merge_clusters("missing", &a),
            Err(ClusterError::NotFound("missing".to_string()))
        );
        assert_eq!(engine.merge_clusters(&a, &a), Err(ClusterError::SelfMerge(a.clone())));
        assert_eq!(engine.get_cluster(&a).cloned(), before);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_update_confidence() {
        let mut engine = ClusterEngine::new();
        let id = engine.add_domain("a.example", &[keyword("kw_slot")]);

        // one domain, no shared signals, no resources
        let confidence = engine.update_cluster_confidence(&id).unwrap();
        assert!((confidence - 0.3).abs() < 1e-12);

        let shared = [
            origin_ip("203.0.113.7"),
            wallet("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"),
        ];
        engine.add_domain("b.example", &shared);
        let big = engine.add_domain("c.example", &shared);
        assert_eq!(engine.update_cluster_confidence(&big).unwrap(), 1.0);

        assert_eq!(
            engine.update_cluster_confidence("missing"),
            Err(ClusterError::NotFound("missing".to_string()))
        );
    }

    #[test]
    fn test_queries() {
        let mut engine = ClusterEngine::new();
        let a = engine.add_domain("a.example", &[origin_ip("203.0.113.7")]);
        engine.add_domain("b.example", &[origin_ip("203.0.113.7")]);
        let c = engine.add_domain("c.example", &[keyword("kw_slot")]);
        engine.update_cluster_confidence(&c).unwrap();

        assert_eq!(engine.cluster_for_domain("b.example").map(|c| c.id.as_str()), Some(a.as_str()));
        assert!(engine.cluster_for_domain("unknown.example").is_none());

        let by_ip = engine.find_clusters_by_resource(ResourceKind::Ip, "203.0.113.7");
        assert_eq!(by_ip.len(), 1);
        assert!(engine.find_clusters_by_resource(ResourceKind::Wallet, "203.0.113.7").is_empty());

        let ranked = engine.clusters_by_confidence();
        assert_eq!(ranked.first().map(|c| c.id.as_str()), Some(a.as_str()));
        assert_eq!(engine.all_clusters().len(), 2);

        let stats = engine.stats();
        assert_eq!(stats.total_clusters, 2);
        assert_eq!(stats.total_domains, 3);
        assert_eq!(stats.high_confidence_clusters, 1);
        assert!((stats.avg_domains_per_cluster - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_stats() {
        let stats = ClusterEngine::new().stats();
        assert_eq!(stats.total_clusters, 0);
        assert_eq!(stats.avg_domains_per_cluster, 0.0);
    }

    #[test]
    fn test_add_result() {
        let analyzer = crate::Analyzer::default();
        let mut engine = ClusterEngine::new();

        let a = analyzer.analyze("a.example", vec![origin_ip("203.0.113.7")]);
        let b = analyzer.analyze("b.example", vec![origin_ip("203.0.113.7")]);

        assert_eq!(engine.add_result(&a), engine.add_result(&b));
    }
}
