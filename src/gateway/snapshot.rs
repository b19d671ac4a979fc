//! Published daemon state
//!
//! The status loop is the only writer. It copies the current state, applies
//! a record, and swaps the copy in; frame builders take one `Arc` per frame
//! and never see half of an update.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::protocol::{decode_status, DaemonState};

#[derive(Debug, Default)]
pub struct SnapshotCell {
    current: RwLock<Arc<DaemonState>>,
    version: AtomicU64,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Arc<DaemonState> {
        self.current.read().clone()
    }

    /// Number of publishes so far
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn publish(&self, state: DaemonState) -> Arc<DaemonState> {
        let state = Arc::new(state);
        *self.current.write() = state.clone();
        self.version.fetch_add(1, Ordering::AcqRel);
        state
    }

    /// Decode `record` on top of the current state and publish the result
    pub fn apply(&self, record: &[u8]) -> Arc<DaemonState> {
        let mut next = DaemonState::clone(&self.load());
        decode_status(record, &mut next);
        self.publish(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tlv::{encode_eol, encode_int};
    use crate::protocol::StatusType;

    #[test]
    fn test_apply_publishes_new_version() {
        let cell = SnapshotCell::new();
        let before = cell.load();
        assert_eq!(cell.version(), 0);

        let mut record = Vec::new();
        encode_int(&mut record, StatusType::InputSamprate, 64_800_000);
        encode_eol(&mut record);
        let after = cell.apply(&record);

        assert_eq!(cell.version(), 1);
        assert_eq!(after.frontend.samprate, 64_800_000);
        // readers holding the old snapshot are unaffected
        assert_eq!(before.frontend.samprate, 0);
        assert!(Arc::ptr_eq(&after, &cell.load()));
    }
}
