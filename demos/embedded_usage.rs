//! Minimal embedding example for nodesync-core
//!
//! Runs the engine against an in-memory inventory and an in-memory DNS
//! provider. The application owns the engine lifecycle: it starts the run
//! loop, changes membership, and cancels the loop when done.

use nodesync_core::{
    DnsProvider, Member, MemberSource, MembershipChange, MembershipStream, RecordSet, Result,
    SyncConfig, SyncEngine, Zone,
};
use nodesync_core::model::AddressType;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

/// Inventory kept in application memory
struct EmbeddedInventory {
    members: Mutex<Vec<Member>>,
    changes: Mutex<Option<mpsc::UnboundedReceiver<MembershipChange>>>,
}

impl EmbeddedInventory {
    fn new(members: Vec<Member>) -> (Arc<Self>, mpsc::UnboundedSender<MembershipChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inventory = Arc::new(Self {
            members: Mutex::new(members),
            changes: Mutex::new(Some(rx)),
        });
        (inventory, tx)
    }

    fn lock_members(&self) -> std::sync::MutexGuard<'_, Vec<Member>> {
        self.members.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn add(&self, member: Member, tx: &mpsc::UnboundedSender<MembershipChange>) {
        let id = member.id.clone();
        self.lock_members().push(member);
        let _ = tx.send(MembershipChange::Applied { id });
    }
}

#[async_trait::async_trait]
impl MemberSource for EmbeddedInventory {
    async fn list_members(&self, _selector: &str) -> Result<Vec<Member>> {
        Ok(self.lock_members().clone())
    }

    fn watch(&self, _selector: &str) -> MembershipStream {
        let rx = self
            .changes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match rx {
            Some(rx) => Box::pin(UnboundedReceiverStream::new(rx)),
            None => Box::pin(tokio_stream::empty()),
        }
    }

    fn source_name(&self) -> &'static str {
        "embedded"
    }
}

/// DNS provider holding record sets in a map
#[derive(Default)]
struct EmbeddedProvider {
    records: Mutex<HashMap<String, RecordSet>>,
}

#[async_trait::async_trait]
impl DnsProvider for EmbeddedProvider {
    async fn list_zones(&self) -> Result<Vec<Zone>> {
        Ok(vec![Zone::new("embedded-zone", "example.com")])
    }

    async fn list_record_sets(&self, _zone_id: &str) -> Result<Vec<RecordSet>> {
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Ok(records.values().cloned().collect())
    }

    async fn upsert_record_set(&self, zone_id: &str, record_set: &RecordSet) -> Result<()> {
        println!(
            "[Embedded] {} {} -> {:?} (ttl {})",
            zone_id, record_set.name, record_set.values, record_set.ttl
        );
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(record_set.name.to_string(), record_set.clone());
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "embedded"
    }
}

fn member(id: &str, external: &str) -> Member {
    Member::new(id).with_address(AddressType::External, external)
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Embedded nodesync-core Example ===\n");

    let (inventory, changes) = EmbeddedInventory::new(vec![
        member("node-a", "203.0.113.10"),
        member("node-b", "203.0.113.11"),
    ]);
    let provider = Arc::new(EmbeddedProvider::default());

    let config = SyncConfig::new(["nodes.example.com"]).with_ttl(60);

    println!("1. Creating engine...");
    let (engine, mut event_rx) = SyncEngine::new(inventory.clone(), provider, None, config)?;
    let engine = Arc::new(engine);

    let event_listener = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("[Event] {:?}", event);
        }
    });

    println!("2. Starting engine in background...");
    let cancel = CancellationToken::new();
    let run_engine = engine.clone();
    let run_cancel = cancel.clone();
    let engine_handle = tokio::spawn(async move { run_engine.run(run_cancel).await });

    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("\n3. A node joins the cluster...");
    inventory.add(member("node-c", "203.0.113.12"), &changes);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let state = engine.state().await;
    println!(
        "\n4. Last synced: {}",
        state
            .last_synced
            .as_ref()
            .map(|s| s.joined())
            .unwrap_or_default()
    );

    println!("5. Stopping engine...");
    cancel.cancel();
    match engine_handle.await {
        Ok(result) => result?,
        Err(e) => println!("Engine task failed: {}", e),
    }

    drop(engine);
    let _ = tokio::time::timeout(Duration::from_millis(100), event_listener).await;

    println!("\n=== Embedding Successful ===");
    Ok(())
}
