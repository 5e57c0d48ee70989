//! Fogger Runtime - signal collection and continuous domain monitoring
//!
//! Builds on `fogger-core`:
//! - [`SignalSource`]: async seam for signal-producing collaborators
//! - [`CompositeSource`]: fan-out over several sources
//! - [`DomainMonitor`]: per-domain periodic re-evaluation with change
//!   detection
//!
//! Monitoring requires a running tokio runtime.

pub mod config;
pub mod source;
pub mod monitor;

pub use config::*;
pub use source::*;
pub use monitor::*;
