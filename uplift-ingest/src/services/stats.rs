//! Stats aggregator
//!
//! Pure fold over the registry's current contents; recomputed on demand and
//! never cached here.

use chrono::Utc;

use crate::models::{IngestStats, PipelineStage};
use crate::services::registry::SessionRegistry;

/// Derive rollup counters from the registry
pub async fn snapshot(registry: &SessionRegistry, storage_limit_bytes: u64) -> IngestStats {
    let sessions = registry.list(None).await;
    let today = Utc::now().date_naive();

    let mut stats = IngestStats {
        total_files: sessions.len(),
        storage_limit_bytes,
        ..Default::default()
    };

    for session in &sessions {
        match session.stage() {
            PipelineStage::Failed => {
                if session.updated_at().date_naive() == today {
                    stats.failed_today += 1;
                }
            }
            PipelineStage::Succeeded => {
                stats.storage_used_bytes += session.file_size_bytes();
                if session.updated_at().date_naive() == today {
                    stats.completed_today += 1;
                }
            }
            _ => {
                stats.storage_used_bytes += session.file_size_bytes();
                stats.in_flight += 1;
            }
        }
    }
    stats
}
