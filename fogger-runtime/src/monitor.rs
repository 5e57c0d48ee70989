//! Domain Monitor
//!
//! Continuously re-evaluates a set of domains:
//! - One tokio task per domain, ticking on its own interval
//! - Each tick collects fresh signals, re-scores, and diffs against the
//!   previous result
//! - Score moves above 0.1 or newly appearing signals produce a
//!   [`ChangeRecord`]
//! - Scan failures are logged and treated as "no new evidence"
//!
//! All task state lives in one registry behind a single `RwLock`. Tasks
//! never hold the lock across a scan; they take it briefly before and after.
//! Every task carries a generation id so a removed (or replaced) task
//! discards its in-flight result.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fogger_core::{AnalysisResult, Analyzer, Category, RiskLevel, Signal};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{MonitorConfig, SharedSource, SourceError};

/// Score movement that counts as a change
pub const SCORE_CHANGE_THRESHOLD: f64 = 0.1;

/// Id of the synthetic MONITOR signal recorded on score moves
pub const SCORE_CHANGE_SIGNAL: &str = "jli_score_change";

/// Errors from monitor operations
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("domain {0} is not being monitored")]
    NotFound(String),

    #[error("domain {0} is already being monitored")]
    AlreadyMonitored(String),

    #[error("monitoring interval for {0} must be greater than zero")]
    InvalidInterval(String),

    #[error("domain monitoring requires a running tokio runtime")]
    NoRuntime,

    #[error("invalid monitor configuration: {0}")]
    Config(String),
}

/// Lifecycle of a monitored domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Active,
    Paused,
    Removed,
}

/// A recorded difference between two consecutive evaluations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: Uuid,
    pub domain: String,
    pub timestamp: DateTime<Utc>,
    pub old_score: f64,
    pub new_score: f64,
    pub old_level: RiskLevel,
    pub new_level: RiskLevel,
    pub reason: String,
    /// Newly appeared signals, plus a MONITOR signal when the score moved
    pub signals: Vec<Signal>,
}

/// Point-in-time view of a monitored domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainStatus {
    pub domain: String,
    pub interval: Duration,
    pub state: TaskState,
    pub last_result: Option<AnalysisResult>,
    pub last_checked: Option<DateTime<Utc>>,
    pub change_count: usize,
    pub scans: u64,
    pub failed_scans: u64,
}

/// Compare two evaluations of the same domain
pub fn detect_change(
    domain: &str,
    previous: &AnalysisResult,
    current: &AnalysisResult,
) -> Option<ChangeRecord> {
    let known = previous.signal_ids();
    let mut signals: Vec<Signal> = current
        .signals()
        .iter()
        .filter(|s| !known.contains(s.id.as_str()))
        .cloned()
        .collect();
    let new_signals = signals.len();

    let delta = current.score - previous.score;
    let score_moved = delta.abs() > SCORE_CHANGE_THRESHOLD;
    if score_moved {
        signals.push(
            Signal::builder(SCORE_CHANGE_SIGNAL, Category::Monitor)
                .description(&format!(
                    "JLI score changed from {:.3} to {:.3}",
                    previous.score, current.score
                ))
                .confidence(1.0)
                .build(),
        );
    }

    if signals.is_empty() {
        return None;
    }

    let reason = match (new_signals, score_moved) {
        (0, _) => format!("score moved by {:+.3}", delta),
        (n, false) => format!("{} new signals", n),
        (n, true) => format!("{} new signals, score moved by {:+.3}", n, delta),
    };

    Some(ChangeRecord {
        id: Uuid::new_v4(),
        domain: domain.to_string(),
        timestamp: Utc::now(),
        old_score: previous.score,
        new_score: current.score,
        old_level: previous.level,
        new_level: current.level,
        reason,
        signals,
    })
}

/// Registry entry for one monitored domain
struct TaskEntry {
    generation: Uuid,
    interval: Duration,
    state: TaskState,
    last_result: Option<AnalysisResult>,
    last_checked: Option<DateTime<Utc>>,
    changes: VecDeque<ChangeRecord>,
    scans: u64,
    failed_scans: u64,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TaskEntry {
    fn status(&self, domain: &str) -> DomainStatus {
        DomainStatus {
            domain: domain.to_string(),
            interval: self.interval,
            state: self.state,
            last_result: self.last_result.clone(),
            last_checked: self.last_checked,
            change_count: self.changes.len(),
            scans: self.scans,
            failed_scans: self.failed_scans,
        }
    }

    /// Signal the task to stop at its next tick boundary
    fn stop(&mut self) -> Option<JoinHandle<()>> {
        self.state = TaskState::Removed;
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        self.handle.take()
    }
}

/// State shared between the monitor handle and its tasks
struct Shared {
    analyzer: Analyzer,
    source: SharedSource,
    config: MonitorConfig,
    tasks: RwLock<HashMap<String, TaskEntry>>,
    changes_tx: broadcast::Sender<ChangeRecord>,
}

impl Shared {
    /// One firing of a domain task. Returns false when the task must exit.
    async fn tick(&self, domain: &str, generation: Uuid) -> bool {
        let state = {
            let tasks = self.tasks.read();
            match tasks.get(domain) {
                Some(entry) if entry.generation == generation => entry.state,
                _ => return false,
            }
        };

        if state == TaskState::Paused {
            debug!("Monitor for {} paused, skipping tick", domain);
            return true;
        }

        let outcome: Result<AnalysisResult, SourceError> = self
            .source
            .collect(domain, self.config.scan_timeout())
            .await
            .map(|signals| self.analyzer.analyze(domain, signals));

        let mut tasks = self.tasks.write();
        let Some(entry) = tasks
            .get_mut(domain)
            .filter(|entry| entry.generation == generation)
        else {
            debug!("Monitor for {} was removed during scan, dropping result", domain);
            return false;
        };

        entry.scans += 1;
        entry.last_checked = Some(Utc::now());

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                entry.failed_scans += 1;
                warn!("Scan of {} via {} failed: {}", domain, self.source.name(), e);
                return true;
            }
        };

        if let Some(previous) = &entry.last_result {
            if let Some(record) = detect_change(domain, previous, &result) {
                info!(
                    "Change detected for {}: JLI {:.3} -> {:.3} ({})",
                    domain, record.old_score, record.new_score, record.reason
                );
                entry.changes.push_back(record.clone());
                while entry.changes.len() > self.config.max_change_log {
                    entry.changes.pop_front();
                }
                // no subscribers is fine
                let _ = self.changes_tx.send(record);
            }
        }

        entry.last_result = Some(result);
        true
    }
}

/// Periodic task body for one domain
async fn run_task(
    shared: Arc<Shared>,
    domain: String,
    generation: Uuid,
    period: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !shared.tick(&domain, generation).await {
                    break;
                }
            }
            _ = &mut stop_rx => break,
        }
    }

    debug!("Monitor task for {} stopped", domain);
}

/// Owns the per-domain monitoring tasks
///
/// Dropping the monitor stops every task.
pub struct DomainMonitor {
    shared: Arc<Shared>,
}

impl DomainMonitor {
    pub fn new(analyzer: Analyzer, source: SharedSource, config: MonitorConfig) -> Self {
        let (changes_tx, _) = broadcast::channel(config.change_channel_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                analyzer,
                source,
                config,
                tasks: RwLock::new(HashMap::new()),
                changes_tx,
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }

    /// Start monitoring a domain; the first scan runs immediately
    pub fn add_domain(&self, domain: &str, period: Duration) -> Result<(), MonitorError> {
        if period.is_zero() {
            return Err(MonitorError::InvalidInterval(domain.to_string()));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;

        let mut tasks = self.shared.tasks.write();
        if tasks.contains_key(domain) {
            return Err(MonitorError::AlreadyMonitored(domain.to_string()));
        }

        let generation = Uuid::new_v4();
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = runtime.spawn(run_task(
            Arc::clone(&self.shared),
            domain.to_string(),
            generation,
            period,
            stop_rx,
        ));

        tasks.insert(
            domain.to_string(),
            TaskEntry {
                generation,
                interval: period,
                state: TaskState::Active,
                last_result: None,
                last_checked: None,
                changes: VecDeque::new(),
                scans: 0,
                failed_scans: 0,
                stop_tx: Some(stop_tx),
                handle: Some(handle),
            },
        );

        info!("Monitoring {} every {:?}", domain, period);
        Ok(())
    }

    /// Start monitoring with the configured default interval
    pub fn add_domain_default(&self, domain: &str) -> Result<(), MonitorError> {
        self.add_domain(domain, self.shared.config.default_interval())
    }

    /// Stop monitoring a domain, returning its final status
    pub fn remove_domain(&self, domain: &str) -> Result<DomainStatus, MonitorError> {
        let mut entry = self
            .shared
            .tasks
            .write()
            .remove(domain)
            .ok_or_else(|| MonitorError::NotFound(domain.to_string()))?;

        // the task observes the stop at its next tick boundary
        let _ = entry.stop();
        info!("Stopped monitoring {}", domain);
        Ok(entry.status(domain))
    }

    pub fn pause(&self, domain: &str) -> Result<(), MonitorError> {
        self.set_state(domain, TaskState::Paused)
    }

    pub fn resume(&self, domain: &str) -> Result<(), MonitorError> {
        self.set_state(domain, TaskState::Active)
    }

    fn set_state(&self, domain: &str, state: TaskState) -> Result<(), MonitorError> {
        let mut tasks = self.shared.tasks.write();
        let entry = tasks
            .get_mut(domain)
            .ok_or_else(|| MonitorError::NotFound(domain.to_string()))?;

        if entry.state != state {
            debug!("Monitor for {}: {:?} -> {:?}", domain, entry.state, state);
            entry.state = state;
        }
        Ok(())
    }

    pub fn status(&self, domain: &str) -> Result<DomainStatus, MonitorError> {
        self.shared
            .tasks
            .read()
            .get(domain)
            .map(|entry| entry.status(domain))
            .ok_or_else(|| MonitorError::NotFound(domain.to_string()))
    }

    /// Recorded changes for a domain, oldest first
    pub fn changes(&self, domain: &str) -> Result<Vec<ChangeRecord>, MonitorError> {
        self.shared
            .tasks
            .read()
            .get(domain)
            .map(|entry| entry.changes.iter().cloned().collect())
            .ok_or_else(|| MonitorError::NotFound(domain.to_string()))
    }

    /// Monitored domains in lexical order
    pub fn list_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.shared.tasks.read().keys().cloned().collect();
        domains.sort();
        domains
    }

    pub fn is_monitored(&self, domain: &str) -> bool {
        self.shared.tasks.read().contains_key(domain)
    }

    pub fn len(&self) -> usize {
        self.shared.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.tasks.read().is_empty()
    }

    /// Receive every change record as it is produced
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeRecord> {
        self.shared.changes_tx.subscribe()
    }

    /// Stop every task, wait for them to exit and clear the registry
    pub async fn stop_all(&self) -> Vec<DomainStatus> {
        let drained: Vec<(String, TaskEntry)> = self.shared.tasks.write().drain().collect();

        let mut handles = Vec::with_capacity(drained.len());
        let mut statuses = Vec::with_capacity(drained.len());
        for (domain, mut entry) in drained {
            handles.extend(entry.stop());
            statuses.push(entry.status(&domain));
        }

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                warn!("Monitor task ended abnormally: {}", e);
            }
        }

        info!("Stopped all monitoring ({} domains)", statuses.len());
        statuses.sort_by(|a, b| a.domain.cmp(&b.domain));
        statuses
    }
}

impl Drop for DomainMonitor {
    fn drop(&mut self) {
        for (_, mut entry) in self.shared.tasks.write().drain() {
            let _ = entry.stop();
        }
    }
}
