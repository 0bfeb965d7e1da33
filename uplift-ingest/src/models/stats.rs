//! Rollup statistics derived from the session registry
//!
//! Never stored; recomputed on demand by the stats aggregator.

use serde::{Deserialize, Serialize};

/// Storage and throughput rollup for the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// All registered sessions, terminal or not
    pub total_files: usize,
    /// Sessions still progressing toward a terminal stage
    pub in_flight: usize,
    /// Sessions that reached `Succeeded` during the current UTC day
    pub completed_today: usize,
    /// Sessions that reached `Failed` during the current UTC day
    pub failed_today: usize,
    /// Sum of file sizes over non-failed sessions
    pub storage_used_bytes: u64,
    /// Configured storage quota, for the storage gauge
    pub storage_limit_bytes: u64,
}
