// # DNS Provider Trait
//
// Defines the interface for reading zones and writing address record sets
// via provider APIs.
//
// ## Implementations
//
// - Cloudflare: `nodesync-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use nodesync_core::DnsProvider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let zones = provider.list_zones().await?;
//     let sets = provider.list_record_sets(&zones[0].id).await?;
//     println!("{} record sets in {}", sets.len(), zones[0].name);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::model::{RecordSet, Zone};

/// Trait for DNS provider implementations
///
/// This trait defines the interface for reading and upserting DNS records.
/// Implementations must handle the specifics of each provider's API.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Untrusted
///
/// DNS providers are **untrusted** components with strict limitations:
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Return success or failure
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads (violates shutdown determinism)
/// - ❌ Implement retry logic or backoff (a failed pass is retried on the next membership event)
/// - ❌ Decide whether an update is needed (owned by `SyncEngine`)
/// - ❌ Refuse or rewrite type conflicts (owned by `RecordSync`)
/// - ❌ Cache state beyond single request
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List every zone the credentials can see
    ///
    /// Zone names must carry the trailing dot (see [`Zone::new`]).
    async fn list_zones(&self) -> Result<Vec<Zone>, crate::Error>;

    /// List the record sets of a zone
    ///
    /// Records sharing a name and type are grouped into one [`RecordSet`].
    ///
    /// # Parameters
    ///
    /// - `zone_id`: The provider's zone identifier
    async fn list_record_sets(&self, zone_id: &str) -> Result<Vec<RecordSet>, crate::Error>;

    /// Create or replace one address record set
    ///
    /// After success the provider holds exactly `record_set.values` under
    /// `record_set.name` with `record_set.ttl`.
    ///
    /// # Idempotency
    ///
    /// Calling it twice with the same record set must be safe.
    ///
    /// # Parameters
    ///
    /// - `zone_id`: The provider's zone identifier
    /// - `record_set`: The address record set to write
    async fn upsert_record_set(
        &self,
        zone_id: &str,
        record_set: &RecordSet,
    ) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
