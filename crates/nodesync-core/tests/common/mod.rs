//! Test doubles and common utilities for engine contract tests
//!
//! These doubles keep everything in memory and count calls so tests can
//! assert on what reached the inventory, the provider and the resolver.

#![allow(dead_code)]

use async_trait::async_trait;
use nodesync_core::error::{Error, Result};
use nodesync_core::traits::{AddressResolver, Clock, DnsProvider, MemberSource, MembershipStream};
use nodesync_core::{
    AddressType, Member, MembershipChange, RecordLookup, RecordName, RecordSet, RecordType,
    SyncConfig, TargetAddressSet, Zone,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Member source backed by a shared, mutable member list
pub struct ControlledMemberSource {
    members: Arc<Mutex<Vec<Member>>>,
    /// Receiver for the engine's watch stream
    engine_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<MembershipChange>>>>,
    /// Artificial latency of list_members()
    list_delay: Duration,
    /// Make list_members() fail
    fail_listing: Arc<AtomicBool>,
    list_call_count: Arc<AtomicUsize>,
    watch_call_count: Arc<AtomicUsize>,
}

impl ControlledMemberSource {
    /// Create a source and the sender tests use to emit changes
    pub fn new(members: Vec<Member>) -> (Self, mpsc::UnboundedSender<MembershipChange>) {
        let (test_tx, engine_rx) = mpsc::unbounded_channel();

        let source = Self {
            members: Arc::new(Mutex::new(members)),
            engine_rx: Arc::new(Mutex::new(Some(engine_rx))),
            list_delay: Duration::ZERO,
            fail_listing: Arc::new(AtomicBool::new(false)),
            list_call_count: Arc::new(AtomicUsize::new(0)),
            watch_call_count: Arc::new(AtomicUsize::new(0)),
        };

        (source, test_tx)
    }

    /// Delay every list_members() call
    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    /// Replace the inventory
    pub fn set_members(&self, members: Vec<Member>) {
        *self.members.lock().unwrap() = members;
    }

    /// Make listing fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.fail_listing.store(failing, Ordering::SeqCst);
    }

    /// Get the number of times list_members() was called
    pub fn list_call_count(&self) -> usize {
        self.list_call_count.load(Ordering::SeqCst)
    }

    /// Get the number of times watch() was called
    pub fn watch_call_count(&self) -> usize {
        self.watch_call_count.load(Ordering::SeqCst)
    }

    /// Create a handle sharing inventory and counters with an existing source
    pub fn sharing_state_with(other: &Self) -> Self {
        Self {
            members: Arc::clone(&other.members),
            engine_rx: Arc::clone(&other.engine_rx),
            list_delay: other.list_delay,
            fail_listing: Arc::clone(&other.fail_listing),
            list_call_count: Arc::clone(&other.list_call_count),
            watch_call_count: Arc::clone(&other.watch_call_count),
        }
    }
}

#[async_trait]
impl MemberSource for ControlledMemberSource {
    async fn list_members(&self, _selector: &str) -> Result<Vec<Member>> {
        self.list_call_count.fetch_add(1, Ordering::SeqCst);
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::inventory("connection refused"));
        }
        Ok(self.members.lock().unwrap().clone())
    }

    fn watch(&self, _selector: &str) -> MembershipStream {
        self.watch_call_count.fetch_add(1, Ordering::SeqCst);

        // Take the receiver (only called once)
        let rx = self
            .engine_rx
            .lock()
            .unwrap()
            .take()
            .expect("watch() can only be called once");

        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }

    fn source_name(&self) -> &'static str {
        "controlled"
    }
}

/// Provider keeping record sets in memory and counting calls
pub struct RecordingProvider {
    zones: Vec<Zone>,
    records: Arc<Mutex<HashMap<String, Vec<RecordSet>>>>,
    upserts: Arc<Mutex<Vec<(String, RecordSet)>>>,
    /// Number of upcoming upserts that fail
    failing_upserts: Arc<AtomicUsize>,
    list_zones_call_count: Arc<AtomicUsize>,
    list_records_call_count: Arc<AtomicUsize>,
    upsert_call_count: Arc<AtomicUsize>,
}

impl RecordingProvider {
    /// Provider with the given `(id, name)` zones and no records
    pub fn new(zones: &[(&str, &str)]) -> Self {
        Self {
            zones: zones.iter().map(|(id, name)| Zone::new(*id, name)).collect(),
            records: Arc::new(Mutex::new(HashMap::new())),
            upserts: Arc::new(Mutex::new(Vec::new())),
            failing_upserts: Arc::new(AtomicUsize::new(0)),
            list_zones_call_count: Arc::new(AtomicUsize::new(0)),
            list_records_call_count: Arc::new(AtomicUsize::new(0)),
            upsert_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Seed a record set into a zone
    pub fn with_record(self, zone_id: &str, record: RecordSet) -> Self {
        self.records
            .lock()
            .unwrap()
            .entry(zone_id.to_string())
            .or_default()
            .push(record);
        self
    }

    /// Overwrite the address values of a name out of band
    pub fn overwrite(&self, zone_id: &str, name: &str, values: &[&str]) {
        let name = RecordName::from_wire(name);
        let mut records = self.records.lock().unwrap();
        let sets = records.entry(zone_id.to_string()).or_default();
        sets.retain(|set| !(set.name == name && set.record_type.is_address()));
        sets.push(RecordSet {
            name,
            record_type: RecordType::Address,
            values: values.iter().map(|v| v.to_string()).collect(),
            ttl: 300,
        });
    }

    /// Fail the next `count` upserts with a transient provider error
    pub fn fail_next_upserts(&self, count: usize) {
        self.failing_upserts.store(count, Ordering::SeqCst);
    }

    /// Current address values of a name, sorted
    pub fn current_values(&self, zone_id: &str, name: &str) -> Option<TargetAddressSet> {
        let records = self.records.lock().unwrap();
        let sets = records.get(zone_id)?;
        match RecordLookup::find(sets, &RecordName::from_wire(name)) {
            RecordLookup::Address(set) => Some(TargetAddressSet::from_addresses(&set.values)),
            _ => None,
        }
    }

    /// Every successful upsert, in order
    pub fn upserts(&self) -> Vec<(String, RecordSet)> {
        self.upserts.lock().unwrap().clone()
    }

    /// Get the number of times upsert_record_set() was called
    pub fn upsert_call_count(&self) -> usize {
        self.upsert_call_count.load(Ordering::SeqCst)
    }

    /// Get the number of times list_zones() was called
    pub fn list_zones_call_count(&self) -> usize {
        self.list_zones_call_count.load(Ordering::SeqCst)
    }

    /// Get the number of times list_record_sets() was called
    pub fn list_records_call_count(&self) -> usize {
        self.list_records_call_count.load(Ordering::SeqCst)
    }

    /// Create a new provider that shares records and counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            zones: other.zones.clone(),
            records: Arc::clone(&other.records),
            upserts: Arc::clone(&other.upserts),
            failing_upserts: Arc::clone(&other.failing_upserts),
            list_zones_call_count: Arc::clone(&other.list_zones_call_count),
            list_records_call_count: Arc::clone(&other.list_records_call_count),
            upsert_call_count: Arc::clone(&other.upsert_call_count),
        }
    }
}

#[async_trait]
impl DnsProvider for RecordingProvider {
    async fn list_zones(&self) -> Result<Vec<Zone>> {
        self.list_zones_call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.zones.clone())
    }

    async fn list_record_sets(&self, zone_id: &str) -> Result<Vec<RecordSet>> {
        self.list_records_call_count.fetch_add(1, Ordering::SeqCst);
        if !self.zones.iter().any(|z| z.id == zone_id) {
            return Err(Error::not_found(format!("zone {}", zone_id)));
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(zone_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_record_set(&self, zone_id: &str, record_set: &RecordSet) -> Result<()> {
        self.upsert_call_count.fetch_add(1, Ordering::SeqCst);

        let failing = self.failing_upserts.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_upserts.store(failing - 1, Ordering::SeqCst);
            return Err(Error::provider("recording", "transient: 503 Service Unavailable"));
        }

        {
            let mut records = self.records.lock().unwrap();
            let sets = records.entry(zone_id.to_string()).or_default();
            sets.retain(|set| !(set.name == record_set.name && set.record_type.is_address()));
            sets.push(record_set.clone());
        }
        self.upserts
            .lock()
            .unwrap()
            .push((zone_id.to_string(), record_set.clone()));
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

/// Resolver answering from a script, then repeating a fixed answer
///
/// `None` entries (and a `None` fallback) are lookup failures.
pub struct ScriptedResolver {
    script: Mutex<VecDeque<Option<TargetAddressSet>>>,
    fallback: Option<TargetAddressSet>,
    call_count: Arc<AtomicUsize>,
}

impl ScriptedResolver {
    /// Always answer with `answer`
    pub fn answering(answer: TargetAddressSet) -> Self {
        Self::scripted(Vec::new(), Some(answer))
    }

    /// Always fail
    pub fn failing() -> Self {
        Self::scripted(Vec::new(), None)
    }

    /// Play `script`, then keep answering `fallback`
    pub fn scripted(script: Vec<Option<TargetAddressSet>>, fallback: Option<TargetAddressSet>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get the number of times resolve() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AddressResolver for ScriptedResolver {
    async fn resolve(&self, name: &RecordName) -> Result<TargetAddressSet> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        next.ok_or_else(|| Error::resolution(format!("no answer for {}", name)))
    }
}

/// Resolver reading straight from a [`RecordingProvider`]'s records
///
/// Models a provider with instant propagation.
pub struct MirrorResolver {
    provider: RecordingProvider,
    zone_id: String,
}

impl MirrorResolver {
    pub fn new(provider: &RecordingProvider, zone_id: &str) -> Self {
        Self {
            provider: RecordingProvider::sharing_counters_with(provider),
            zone_id: zone_id.to_string(),
        }
    }
}

#[async_trait]
impl AddressResolver for MirrorResolver {
    async fn resolve(&self, name: &RecordName) -> Result<TargetAddressSet> {
        self.provider
            .current_values(&self.zone_id, name.as_str())
            .ok_or_else(|| Error::resolution(format!("NXDOMAIN {}", name)))
    }
}

/// Clock whose sleep advances virtual time instantly
pub struct ManualClock {
    now: Mutex<Instant>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Every requested sleep, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        *self.now.lock().unwrap() += duration;
        tokio::task::yield_now().await;
    }
}

/// A ready member with one external address
pub fn node(id: &str, external: &str) -> Member {
    Member::new(id).with_address(AddressType::External, external)
}

/// Build a target set from literals
pub fn set(addresses: &[&str]) -> TargetAddressSet {
    TargetAddressSet::from_addresses(addresses.iter().copied())
}

/// Helper to create a minimal SyncConfig for testing
pub fn minimal_config(record_name: &str) -> SyncConfig {
    SyncConfig::new([record_name]).with_ttl(60)
}
