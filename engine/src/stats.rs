//! Aggregate counters derived from queue state.
//!
//! Stats are computed on demand from [`SyncState`] and never cached, so they
//! cannot drift from the stores they describe.

use crate::{store::SyncState, SyncStatus, Timestamp};
use serde::{Deserialize, Serialize};

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub total: usize,
    pub pending: usize,
    pub syncing: usize,
    pub completed: usize,
    pub failed: usize,
    pub conflict: usize,
    pub open_conflicts: usize,
    /// `completed / (completed + failed)`, zero when nothing is terminal yet
    pub success_rate: f64,
}

impl SyncStats {
    /// Derive stats from the current state.
    ///
    /// With `window_seconds`, only terminal operations last touched within
    /// the window count toward the success rate. Status counts always cover
    /// every operation.
    pub fn compute(state: &SyncState, now: Timestamp, window_seconds: Option<u64>) -> Self {
        let mut stats = SyncStats {
            open_conflicts: state.conflicts().len(),
            ..SyncStats::default()
        };

        let cutoff = window_seconds.map(|secs| now.saturating_sub(secs.saturating_mul(1_000)));
        let mut rate_completed = 0usize;
        let mut rate_failed = 0usize;

        for op in state.operations().iter() {
            stats.total += 1;
            match op.status {
                SyncStatus::Pending => stats.pending += 1,
                SyncStatus::Syncing => stats.syncing += 1,
                SyncStatus::Completed => stats.completed += 1,
                SyncStatus::Failed => stats.failed += 1,
                SyncStatus::Conflict => stats.conflict += 1,
            }

            let touched = op.last_attempt_at.unwrap_or(op.created_at);
            if cutoff.map_or(false, |cutoff| touched < cutoff) {
                continue;
            }
            match op.status {
                SyncStatus::Completed => rate_completed += 1,
                SyncStatus::Failed => rate_failed += 1,
                _ => {}
            }
        }

        let terminal = rate_completed + rate_failed;
        stats.success_rate = if terminal == 0 {
            0.0
        } else {
            rate_completed as f64 / terminal as f64
        };
        stats
    }

    /// Number of operations in a given status.
    pub fn count(&self, status: SyncStatus) -> usize {
        match status {
            SyncStatus::Pending => self.pending,
            SyncStatus::Syncing => self.syncing,
            SyncStatus::Completed => self.completed,
            SyncStatus::Failed => self.failed,
            SyncStatus::Conflict => self.conflict,
        }
    }
}
