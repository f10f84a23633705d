// # Sync State
//
// Process-resident record of what the engine last published and last saw.
//
// ## Crash Behavior
//
// - Never persisted; all state is lost on restart
// - The first pass after a restart treats the inventory as new and upserts
//   (harmless, the upsert is idempotent)
//
// ## Ownership
//
// Owned by `SyncEngine` behind a mutex held for a whole reconcile pass, so
// readers never observe a half-finished pass.

use crate::model::TargetAddressSet;
use chrono::{DateTime, Utc};

/// Last synchronized (and, in verification mode, last observed) address sets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    /// Address set of the last successful upsert
    pub last_synced: Option<TargetAddressSet>,

    /// Address set last seen through independent resolution
    pub last_observed: Option<TargetAddressSet>,

    /// When the last successful upsert completed
    pub last_synced_at: Option<DateTime<Utc>>,

    /// Number of completed upserts since process start (logged per sync)
    pub sync_count: u64,
}

impl SyncState {
    /// Create an empty state (nothing synced yet)
    pub fn new() -> Self {
        Self::default()
    }

    /// Last synced set, or the empty set if nothing was synced yet
    pub fn synced_or_empty(&self) -> TargetAddressSet {
        self.last_synced.clone().unwrap_or_default()
    }

    /// Record a completed upsert
    pub fn record_synced(&mut self, target: TargetAddressSet) {
        self.last_synced = Some(target);
        self.last_synced_at = Some(Utc::now());
        self.sync_count += 1;
    }

    /// Record an independent observation
    pub fn record_observed(&mut self, observed: TargetAddressSet) {
        self.last_observed = Some(observed);
    }
}
