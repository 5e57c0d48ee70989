//! Fogger Core - risk scoring and operator attribution for gambling domains
//!
//! This crate provides the algorithmic layer:
//! - Signals: categorized, confidence-scored evidence from collaborators
//! - Scoring profiles with validated weights and thresholds
//! - Category aggregation and composite risk (JLI) scoring
//! - Domain clustering by shared categories and resources
//! - Summaries over batches of results
//!
//! It performs no network or file I/O.

pub mod signals;
pub mod profile;
pub mod aggregate;
pub mod scoring;
pub mod analysis;
pub mod resources;
pub mod cluster;
pub mod summary;

pub use signals::*;
pub use profile::*;
pub use aggregate::*;
pub use scoring::*;
pub use analysis::*;
pub use resources::*;
pub use cluster::*;
pub use summary::*;
