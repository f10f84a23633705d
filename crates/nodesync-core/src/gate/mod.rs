//! Change detection
//!
//! Decides whether a freshly computed target set needs to be synced. The
//! comparison baseline is either the cached last-synced set or, when
//! independent verification is enabled, what external resolution of the
//! primary record currently returns. The observed answer wins so that
//! out-of-band edits to the record (drift) are repaired.

use std::sync::Arc;

use crate::model::{RecordName, TargetAddressSet};
use crate::state::SyncState;
use crate::traits::AddressResolver;
use tracing::debug;

/// The set a target is compared against
#[derive(Debug, Clone, PartialEq)]
pub enum Baseline {
    /// Last synced set from process state (empty if never synced)
    Cached(TargetAddressSet),
    /// Answer of a one-shot external resolution (empty if it failed)
    Observed(TargetAddressSet),
}

impl Baseline {
    /// The address set behind the baseline
    pub fn addresses(&self) -> &TargetAddressSet {
        match self {
            Baseline::Cached(set) | Baseline::Observed(set) => set,
        }
    }
}

/// Outcome of the gate
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Target equals the baseline, nothing to do
    Unchanged {
        /// The baseline that matched
        baseline: Baseline,
    },
    /// Target differs from the baseline and must be synced
    Sync {
        /// Set to pass downstream
        target: TargetAddressSet,
        /// The baseline it differed from
        baseline: Baseline,
    },
}

impl GateDecision {
    /// Whether a sync is required
    pub fn requires_sync(&self) -> bool {
        matches!(self, GateDecision::Sync { .. })
    }

    /// The baseline used for the decision
    pub fn baseline(&self) -> &Baseline {
        match self {
            GateDecision::Unchanged { baseline } | GateDecision::Sync { baseline, .. } => baseline,
        }
    }
}

/// Compares new target sets against the most authoritative prior set
pub struct ChangeGate {
    resolver: Option<Arc<dyn AddressResolver>>,
}

impl ChangeGate {
    /// Gate comparing against cached state only
    pub fn cached() -> Self {
        Self { resolver: None }
    }

    /// Gate comparing against independent resolution of the primary record
    pub fn observing(resolver: Arc<dyn AddressResolver>) -> Self {
        Self {
            resolver: Some(resolver),
        }
    }

    /// Whether this gate resolves the primary record
    pub fn is_observing(&self) -> bool {
        self.resolver.is_some()
    }

    /// Determine the comparison baseline
    ///
    /// Resolution failure is logged and yields an empty observed set; it
    /// never blocks the comparison.
    pub async fn baseline(&self, state: &SyncState, primary: &RecordName) -> Baseline {
        match &self.resolver {
            None => Baseline::Cached(state.synced_or_empty()),
            Some(resolver) => match resolver.resolve(primary).await {
                Ok(observed) => Baseline::Observed(observed),
                Err(e) => {
                    debug!(record = %primary, "Lookup failed, treating observed set as empty: {}", e);
                    Baseline::Observed(TargetAddressSet::empty())
                }
            },
        }
    }

    /// Evaluate a target set against the current state
    pub async fn evaluate(
        &self,
        target: &TargetAddressSet,
        state: &SyncState,
        primary: &RecordName,
    ) -> GateDecision {
        let baseline = self.baseline(state, primary).await;
        decide(target, baseline)
    }
}

/// Pure decision: sync unless the joined forms are equal
pub fn decide(target: &TargetAddressSet, baseline: Baseline) -> GateDecision {
    if target.joined() == baseline.addresses().joined() {
        GateDecision::Unchanged { baseline }
    } else {
        GateDecision::Sync {
            target: target.clone(),
            baseline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use async_trait::async_trait;

    struct FixedResolver(Option<TargetAddressSet>);

    #[async_trait]
    impl AddressResolver for FixedResolver {
        async fn resolve(&self, name: &RecordName) -> crate::Result<TargetAddressSet> {
            self.0
                .clone()
                .ok_or_else(|| Error::resolution(format!("NXDOMAIN {}", name)))
        }
    }

    fn set(addrs: &[&str]) -> TargetAddressSet {
        TargetAddressSet::from_addresses(addrs.iter().copied())
    }

    fn primary() -> RecordName {
        RecordName::parse("nodes.example.com").unwrap()
    }

    #[test]
    fn equal_sets_in_any_order_are_unchanged() {
        let decision = decide(
            &set(&["2.2.2.2", "1.1.1.1"]),
            Baseline::Cached(set(&["1.1.1.1", "2.2.2.2"])),
        );
        assert!(!decision.requires_sync());
    }

    #[test]
    fn different_sets_require_sync() {
        let decision = decide(&set(&["1.1.1.1"]), Baseline::Cached(set(&["1.1.1.1", "2.2.2.2"])));
        assert!(decision.requires_sync());
        assert!(decide(&set(&["1.1.1.1"]), Baseline::Cached(TargetAddressSet::empty())).requires_sync());
    }

    #[test]
    fn empty_target_against_fresh_state_is_unchanged() {
        let decision = decide(&TargetAddressSet::empty(), Baseline::Cached(TargetAddressSet::empty()));
        assert!(!decision.requires_sync());
    }

    #[tokio::test]
    async fn cached_gate_uses_last_synced() {
        let mut state = SyncState::new();
        state.record_synced(set(&["1.1.1.1"]));

        let gate = ChangeGate::cached();
        let decision = gate.evaluate(&set(&["1.1.1.1"]), &state, &primary()).await;
        assert_eq!(
            decision,
            GateDecision::Unchanged {
                baseline: Baseline::Cached(set(&["1.1.1.1"]))
            }
        );
    }

    #[tokio::test]
    async fn observed_answer_takes_precedence_over_cache() {
        // Someone overwrote the record out of band
        let mut state = SyncState::new();
        state.record_synced(set(&["1.1.1.1"]));

        let gate = ChangeGate::observing(Arc::new(FixedResolver(Some(set(&["9.9.9.9"])))));
        let decision = gate.evaluate(&set(&["1.1.1.1"]), &state, &primary()).await;

        assert!(decision.requires_sync());
        assert_eq!(decision.baseline(), &Baseline::Observed(set(&["9.9.9.9"])));
    }

    #[tokio::test]
    async fn failed_lookup_counts_as_empty_observation() {
        let gate = ChangeGate::observing(Arc::new(FixedResolver(None)));
        let state = SyncState::new();

        let decision = gate.evaluate(&set(&["1.1.1.1"]), &state, &primary()).await;
        assert!(decision.requires_sync());
        assert_eq!(
            decision.baseline(),
            &Baseline::Observed(TargetAddressSet::empty())
        );
    }
}
