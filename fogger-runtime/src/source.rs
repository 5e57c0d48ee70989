//! Signal sources - the seam to signal-producing collaborators
//!
//! Fetchers, CDN classifiers, payment detectors and DNS probes live outside
//! this workspace. They plug into the monitor by implementing
//! [`SignalSource`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fogger_core::Signal;
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from signal collection
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("All {0} sources failed")]
    AllFailed(usize),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Something that can produce fresh signals for a domain
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Source name, used in logs
    fn name(&self) -> &str;

    /// Collect signals for `domain`, giving up after roughly `timeout`
    async fn collect(&self, domain: &str, timeout: Duration) -> Result<Vec<Signal>, SourceError>;
}

/// Shared handle to a source
pub type SharedSource = Arc<dyn SignalSource>;

/// Fans out to several sources and concatenates their signals
///
/// A failing source is logged and skipped. Collection only fails when every
/// source fails.
pub struct CompositeSource {
    name: String,
    sources: Vec<SharedSource>,
}

impl CompositeSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: SharedSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl SignalSource for CompositeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self, domain: &str, timeout: Duration) -> Result<Vec<Signal>, SourceError> {
        let results = join_all(
            self.sources
                .iter()
                .map(|source| source.collect(domain, timeout)),
        )
        .await;

        let mut signals = Vec::new();
        let mut failures = 0;
        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(mut found) => {
                    debug!(
                        "Source {} produced {} signals for {}",
                        source.name(),
                        found.len(),
                        domain
                    );
                    signals.append(&mut found);
                }
                Err(e) => {
                    warn!("Source {} failed for {}: {}", source.name(), domain, e);
                    failures += 1;
                }
            }
        }

        if failures > 0 && failures == self.sources.len() {
            return Err(SourceError::AllFailed(failures));
        }

        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fogger_core::Category;

    struct FixedSource {
        name: &'static str,
        signals: Vec<Signal>,
    }

    #[async_trait]
    impl SignalSource for FixedSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn collect(
            &self,
            _domain: &str,
            _timeout: Duration,
        ) -> Result<Vec<Signal>, SourceError> {
            Ok(self.signals.clone())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl SignalSource for BrokenSource {
        fn name(&self) -> &str {
            "broken"
        }

        async fn collect(
            &self,
            _domain: &str,
            timeout: Duration,
        ) -> Result<Vec<Signal>, SourceError> {
            Err(SourceError::Timeout(timeout.as_secs()))
        }
    }

    fn fixed(name: &'static str, id: &str, category: Category) -> SharedSource {
        Arc::new(FixedSource {
            name,
            signals: vec![Signal::builder(id, category).confidence(0.7).build()],
        })
    }

    #[tokio::test]
    async fn test_composite_concatenates() {
        let source = CompositeSource::new("all")
            .with_source(fixed("keywords", "kw_slot", Category::Ux))
            .with_source(fixed("payments", "qris", Category::Payment));

        let signals = source.collect("a.example", Duration::from_secs(10)).await.unwrap();
        let ids: Vec<&str> = signals.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["kw_slot", "qris"]);
    }

    #[tokio::test]
    async fn test_composite_skips_failures() {
        let source = CompositeSource::new("all")
            .with_source(Arc::new(BrokenSource))
            .with_source(fixed("cdn", "cdn_cloudflare", Category::Cdn));

        let signals = source.collect("a.example", Duration::from_secs(10)).await.unwrap();
        assert_eq!(signals.len(), 1);
    }

    #[tokio::test]
    async fn test_composite_fails_when_all_fail() {
        let source = CompositeSource::new("all")
            .with_source(Arc::new(BrokenSource))
            .with_source(Arc::new(BrokenSource));

        let err = source.collect("a.example", Duration::from_secs(10)).await.unwrap_err();
        assert!(matches!(err, SourceError::AllFailed(2)));
    }

    #[tokio::test]
    async fn test_empty_composite_yields_nothing() {
        let source = CompositeSource::new("none");
        assert!(source.is_empty());
        let signals = source.collect("a.example", Duration::from_secs(1)).await.unwrap();
        assert!(signals.is_empty());
    }

    #[test]
    fn test_wraps_anyhow_errors() {
        let err: SourceError = anyhow::anyhow!("resolver exploded").into();
        assert_eq!(err.to_string(), "resolver exploded");
    }
}
