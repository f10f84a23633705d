//! Reconciliation engine
//!
//! The SyncEngine is responsible for:
//! - Listening to membership changes from a MemberSource
//! - Recomputing the target address set from the full inventory
//! - Deciding (ChangeGate) whether the record needs an update
//! - Writing the record (RecordSync) and verifying propagation
//! - Owning the authoritative SyncState
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ MemberSource │── MembershipChange ──┐
//! └──────────────┘                      │
//! ┌──────────────┐                      │ try_send (capacity 1, coalescing)
//! │ resync timer │── tick ──────────────┤
//! └──────────────┘                      ▼
//!                              ┌────────────────┐
//!                              │  single worker │── reconcile() ── Mutex<SyncState>
//!                              └────────────────┘
//!                                       │
//!      ┌──────────────┬─────────────────┼─────────────────┬──────────────┐
//!      ▼              ▼                 ▼                 ▼              ▼
//! ┌─────────┐  ┌────────────┐  ┌──────────────┐  ┌──────────────┐  ┌────────┐
//! │ extract │  │ ChangeGate │  │  RecordSync  │  │   Verifier   │  │ Events │
//! └─────────┘  └────────────┘  └──────────────┘  └──────────────┘  └────────┘
//! ```
//!
//! ## Pass Flow
//!
//! 1. List members (a listing error aborts the pass)
//! 2. Extract the target set
//! 3. Compare against the baseline; stop if unchanged
//! 4. Upsert every record name; on success record the target as synced
//! 5. In verification mode, poll resolution until convergence or timeout
//!
//! ## Preemption
//!
//! A membership change that arrives while a pass is verifying ends the
//! verification early (`Superseded`), so the pending pass can publish the
//! newer set instead of waiting out the `2 × TTL` deadline. Resync ticks
//! only queue a pass and never preempt.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::address;
use crate::config::{AddressPolicy, SyncConfig};
use crate::error::{Error, Result};
use crate::gate::{ChangeGate, GateDecision};
use crate::model::{MembershipChange, RecordName, TargetAddressSet};
use crate::state::SyncState;
use crate::sync::{RecordSync, SyncReport};
use crate::traits::{AddressResolver, Clock, DnsProvider, MemberSource, TokioClock};
use crate::verify::{Convergence, ConvergenceVerifier};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started {
        records_count: usize,
        source: String,
        provider: String,
    },

    /// The member source reported a change
    MembershipChanged { change: MembershipChange },

    /// Target set differs from the baseline
    ChangeDetected {
        previous: TargetAddressSet,
        target: TargetAddressSet,
    },

    /// Target set equals the baseline, nothing written
    NoChange { target: TargetAddressSet },

    /// Every record name was upserted
    SyncSucceeded {
        zone_id: String,
        records: Vec<RecordName>,
        target: TargetAddressSet,
    },

    /// The sync attempt was abandoned
    SyncFailed { error: String, transient: bool },

    /// Resolution returned the target set
    Converged {
        target: TargetAddressSet,
        attempts: u32,
    },

    /// Resolution did not match before the deadline
    ConvergenceTimedOut {
        target: TargetAddressSet,
        observed: TargetAddressSet,
        attempts: u32,
    },

    /// Verification stopped because a newer membership change is pending
    ConvergenceSuperseded {
        target: TargetAddressSet,
        attempts: u32,
    },

    /// Engine stopped
    Stopped { reason: String },
}

/// Result of one reconcile pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing to do
    Unchanged,
    /// The target set was written
    Synced(SyncReport),
}

/// Core reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Start with [`SyncEngine::run()`]
/// 3. Engine runs until the cancellation token fires
/// 4. `run` returns once the feeder and the in-flight pass have quiesced
///
/// ## Serialization
///
/// Every pass holds the state mutex from inventory listing to the end of
/// verification, so concurrent [`SyncEngine::reconcile`] calls queue up and
/// see each other's results. [`SyncEngine::run`] additionally coalesces
/// bursts of membership events and resync ticks into a single pending pass,
/// and lets membership events cut a running verification short.
pub struct SyncEngine {
    /// Inventory
    source: Arc<dyn MemberSource>,

    /// Change detection
    gate: ChangeGate,

    /// Record writer
    sync: RecordSync,

    /// Present only in verification mode
    verifier: Option<ConvergenceVerifier>,

    provider_name: &'static str,

    /// Record names, primary first
    names: Vec<RecordName>,

    ttl: u32,
    zone_id: Option<String>,
    policy: AddressPolicy,
    selector: String,

    state: Mutex<SyncState>,

    /// Pass counter for the `pass` span
    passes: AtomicU64,

    /// Bumped for every membership change `run` receives
    changes_seen: watch::Sender<u64>,

    resync_interval: Option<Duration>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,

    /// Events lost to a full channel
    dropped_events: AtomicU64,
}

impl SyncEngine {
    /// Create a new engine using the tokio clock
    ///
    /// # Parameters
    ///
    /// - `source`: member inventory
    /// - `provider`: DNS provider
    /// - `resolver`: independent resolver, required when `verify_with_dns` is set
    /// - `config`: synchronizer configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        source: Arc<dyn MemberSource>,
        provider: Arc<dyn DnsProvider>,
        resolver: Option<Arc<dyn AddressResolver>>,
        config: SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        Self::with_clock(source, provider, resolver, config, Arc::new(TokioClock))
    }

    /// Create a new engine with an explicit clock for convergence polling
    pub fn with_clock(
        source: Arc<dyn MemberSource>,
        provider: Arc<dyn DnsProvider>,
        resolver: Option<Arc<dyn AddressResolver>>,
        config: SyncConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;
        let names = config.record_names()?;

        let (gate, verifier) = match (config.verify_with_dns, resolver) {
            (true, Some(resolver)) => (
                ChangeGate::observing(resolver.clone()),
                Some(ConvergenceVerifier::new(resolver, clock)),
            ),
            (true, None) => {
                return Err(Error::config(
                    "DNS verification is enabled but no resolver was supplied",
                ));
            }
            (false, _) => (ChangeGate::cached(), None),
        };

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            source,
            gate,
            verifier,
            provider_name: provider.provider_name(),
            sync: RecordSync::new(provider),
            ttl: config.effective_ttl(),
            zone_id: config.explicit_zone_id().map(str::to_string),
            policy: config.addresses,
            selector: config.member_selector,
            names,
            state: Mutex::new(SyncState::new()),
            passes: AtomicU64::new(0),
            changes_seen: watch::Sender::new(0),
            resync_interval: config.engine.resync_interval(),
            event_tx: tx,
            dropped_events: AtomicU64::new(0),
        };

        Ok((engine, rx))
    }

    /// Snapshot of the current state
    ///
    /// Waits for an in-flight pass to finish.
    pub async fn state(&self) -> SyncState {
        self.state.lock().await.clone()
    }

    /// Primary record name
    pub fn primary(&self) -> &RecordName {
        &self.names[0]
    }

    /// Number of events dropped because the event channel was full
    ///
    /// Events emitted after the receiver was dropped are not counted.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Run the engine
    ///
    /// Subscribes to membership changes, runs one initial pass, and then one
    /// pass per (coalesced) change or resync tick until `cancel` fires. Pass
    /// failures are logged and never stop the loop; the next resync retries
    /// them.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.emit_event(EngineEvent::Started {
            records_count: self.names.len(),
            source: self.source.source_name().to_string(),
            provider: self.provider_name.to_string(),
        });
        info!(
            primary = %self.primary(),
            source = self.source.source_name(),
            provider = self.provider_name,
            "Engine started"
        );

        let mut changes = self.source.watch(&self.selector);
        let mut watching = true;
        let mut resync = self.resync_interval.map(|period| {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticks
        });
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        // Initial pass
        let _ = trigger_tx.try_send(());

        let cancel = &cancel;

        let feeder = async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    change = changes.next(), if watching => match change {
                        Some(change) => {
                            debug!(?change, "Membership change");
                            self.emit_event(EngineEvent::MembershipChanged { change });
                            self.changes_seen.send_modify(|seen| *seen += 1);
                            match trigger_tx.try_send(()) {
                                Ok(()) => {}
                                Err(mpsc::error::TrySendError::Full(())) => {
                                    debug!("Pass already pending, coalescing");
                                }
                                Err(mpsc::error::TrySendError::Closed(())) => break,
                            }
                        }
                        None => {
                            if resync.is_some() {
                                warn!("Membership stream ended, only periodic resyncs will run");
                            } else {
                                warn!("Membership stream ended, no further passes will be triggered");
                            }
                            watching = false;
                        }
                    },
                    _ = next_resync(&mut resync) => {
                        debug!("Periodic resync");
                        if let Err(mpsc::error::TrySendError::Closed(())) = trigger_tx.try_send(()) {
                            break;
                        }
                    }
                }
            }
        };

        let worker = async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    trigger = trigger_rx.recv() => {
                        if trigger.is_none() {
                            break;
                        }
                        match self.reconcile(cancel).await {
                            Ok(outcome) => debug!(?outcome, "Pass finished"),
                            Err(Error::ShuttingDown) => break,
                            Err(e) => error!("Reconcile pass failed: {}", e),
                        }
                    }
                }
            }
        };

        tokio::join!(feeder, worker);

        info!("Shutdown requested, engine stopped");
        self.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });

        Ok(())
    }

    /// Run one full, serialized reconcile pass
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] if `cancel` fired before or during the pass
    /// - inventory, zone, conflict and provider errors of this pass; state is
    ///   left untouched so the next pass retries
    pub async fn reconcile(&self, cancel: &CancellationToken) -> Result<PassOutcome> {
        if cancel.is_cancelled() {
            return Err(Error::ShuttingDown);
        }

        let pass = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        self.reconcile_pass(cancel)
            .instrument(info_span!("pass", pass))
            .await
    }

    async fn reconcile_pass(&self, cancel: &CancellationToken) -> Result<PassOutcome> {
        let mut state = self.state.lock().await;
        if cancel.is_cancelled() {
            return Err(Error::ShuttingDown);
        }

        // Changes seen before this point are covered by the listing below
        let mut newer_changes = self.changes_seen.subscribe();

        let members = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::ShuttingDown),
            res = self.source.list_members(&self.selector) => res?,
        };
        let target = address::extract(&members, &self.policy);
        debug!(members = members.len(), target = %target, "Computed target set");

        let decision = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::ShuttingDown),
            decision = self.gate.evaluate(&target, &state, self.primary()) => decision,
        };

        let previous = match decision {
            GateDecision::Unchanged { .. } => {
                debug!(target = %target, "Address set unchanged, skipping sync");
                self.emit_event(EngineEvent::NoChange { target });
                return Ok(PassOutcome::Unchanged);
            }
            GateDecision::Sync { baseline, .. } => baseline.addresses().clone(),
        };

        info!(baseline = %previous, target = %target, "Address set changed");
        self.emit_event(EngineEvent::ChangeDetected {
            previous,
            target: target.clone(),
        });

        let applied = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::ShuttingDown),
            res = self.sync.apply(&target, &self.names, self.ttl, self.zone_id.as_deref()) => res,
        };

        let report = match applied {
            Ok(report) => report,
            Err(Error::ShuttingDown) => return Err(Error::ShuttingDown),
            Err(e) => {
                error!(transient = e.is_transient(), "Sync failed: {}", e);
                self.emit_event(EngineEvent::SyncFailed {
                    error: e.to_string(),
                    transient: e.is_transient(),
                });
                return Err(e);
            }
        };

        state.record_synced(target.clone());
        info!(
            zone_id = %report.zone_id,
            target = %target,
            syncs = state.sync_count,
            "Record set published"
        );
        self.emit_event(EngineEvent::SyncSucceeded {
            zone_id: report.zone_id.clone(),
            records: report.upserted.clone(),
            target: target.clone(),
        });

        if let Some(verifier) = &self.verifier {
            let preempt = async move {
                if newer_changes.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            };
            match verifier
                .verify_until(&target, self.primary(), self.ttl, cancel, preempt)
                .await
            {
                Convergence::Converged { attempts } => {
                    state.record_observed(target.clone());
                    self.emit_event(EngineEvent::Converged { target, attempts });
                }
                Convergence::TimedOut {
                    attempts,
                    last_observed,
                } => {
                    let observed = last_observed.unwrap_or_default();
                    state.record_observed(observed.clone());
                    self.emit_event(EngineEvent::ConvergenceTimedOut {
                        target,
                        observed,
                        attempts,
                    });
                }
                Convergence::Cancelled { attempts } => {
                    debug!(attempts, "Verification cancelled");
                }
                Convergence::Superseded { attempts } => {
                    debug!(attempts, "Verification superseded by a newer membership change");
                    self.emit_event(EngineEvent::ConvergenceSuperseded { target, attempts });
                }
            }
        }

        Ok(PassOutcome::Synced(report))
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("No event listener, discarding event");
            }
        }
    }
}

/// Wait for the next resync tick, forever when resync is disabled
async fn next_resync(resync: &mut Option<Interval>) {
    match resync {
        Some(ticks) => {
            ticks.tick().await;
        }
        None => std::future::pending().await,
    }
}
