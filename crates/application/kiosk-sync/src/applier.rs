use kiosk_core::formats::v2::diff::IndexV2Diff;
use kiosk_core::formats::v2::IndexV2;

use crate::SyncError;

/// Replays diff fragments on top of a baseline index.
///
/// Every application checks the chain: the baseline must sit at exactly
/// the timestamp the diff was generated against, and the diff must advance
/// it. Stale or replayed fragments are rejected rather than merged.
pub struct DiffApplier {
    index: IndexV2,
}

impl DiffApplier {
    pub fn new(baseline: IndexV2) -> Self {
        DiffApplier { index: baseline }
    }

    pub fn apply(&mut self, diff: &IndexV2Diff, expected_base: i64) -> Result<(), SyncError> {
        let base = self.index.repo.timestamp;
        if base != expected_base {
            return Err(SyncError::VersionMismatch {
                expected: expected_base,
                found: base,
            });
        }
        if diff.repo.timestamp <= base {
            return Err(SyncError::VersionMismatch {
                expected: base,
                found: diff.repo.timestamp,
            });
        }
        diff.patch_into(&mut self.index);
        Ok(())
    }

    pub fn finish(self) -> IndexV2 {
        self.index
    }
}
