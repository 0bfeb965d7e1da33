//! Completion percentage estimation
//!
//! Maps transfer byte counts and pipeline stages onto a single 0-100 display
//! scale. The transfer phase occupies [0, 90]; each pipeline stage has a
//! fixed floor above that, so visible progress is non-decreasing across the
//! whole lifecycle even though stage durations are unknown.

use uplift_common::events::PipelineStage;

/// Share of the display scale reserved for the byte transfer
pub const TRANSFER_CEILING_PCT: u8 = 90;

/// Minimum displayed percentage once a session enters the given stage
///
/// `Failed` has no floor of its own; a failed session retains whatever value
/// it last displayed.
pub fn stage_floor(stage: PipelineStage) -> u8 {
    match stage {
        PipelineStage::Validated | PipelineStage::Transferring => 0,
        PipelineStage::Queued => 90,
        PipelineStage::Normalizing => 93,
        PipelineStage::QualityCheck => 96,
        PipelineStage::Succeeded => 100,
        PipelineStage::Failed => 0,
    }
}

/// Raw estimate for the given stage and transfer byte counts
///
/// Callers keep the displayed value monotone by taking the running maximum;
/// this function itself is pure and stateless.
pub fn estimate(stage: PipelineStage, bytes_acknowledged: u64, bytes_total: u64) -> u8 {
    match stage {
        PipelineStage::Transferring => transfer_pct(bytes_acknowledged, bytes_total),
        other => stage_floor(other),
    }
}

/// Byte ratio scaled to [0, TRANSFER_CEILING_PCT]
fn transfer_pct(bytes_acknowledged: u64, bytes_total: u64) -> u8 {
    if bytes_total == 0 {
        // Empty file: the transfer phase has nothing left to do
        return TRANSFER_CEILING_PCT;
    }
    let acked = bytes_acknowledged.min(bytes_total);
    ((acked as u128 * TRANSFER_CEILING_PCT as u128) / bytes_total as u128) as u8
}
