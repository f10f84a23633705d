// # Member Source Trait
//
// Defines the interface to the machine inventory.
//
// ## Implementations
//
// - Kubernetes nodes: `nodesync-inventory-kube` crate
//
// ## Usage
//
// ```rust,ignore
// use nodesync_core::MemberSource;
// use tokio_stream::StreamExt;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* MemberSource implementation */;
//
//     // Current inventory
//     let members = source.list_members("role=edge").await?;
//
//     // Watch for changes
//     let mut changes = source.watch("role=edge");
//     while let Some(change) = changes.next().await {
//         println!("membership changed: {:?}", change);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::model::{Member, MembershipChange};

/// Boxed stream of membership change notifications
pub type MembershipStream = Pin<Box<dyn Stream<Item = MembershipChange> + Send + 'static>>;

/// Trait for inventory implementations
///
/// The selector is opaque to the engine; it comes straight from configuration
/// and is interpreted by the source (a label selector for Kubernetes). An
/// empty selector means "every member".
///
/// # Responsibilities
///
/// Sources report what the inventory contains. They do not filter on
/// readiness or address type (the engine does) and never talk to DNS.
#[async_trait]
pub trait MemberSource: Send + Sync {
    /// List the current members matching `selector`
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Member>)`: The members, in any order
    /// - `Err(Error)`: If the inventory could not be read
    async fn list_members(&self, selector: &str) -> Result<Vec<Member>, crate::Error>;

    /// Watch for membership changes
    ///
    /// Yields one item per add/update/delete. The stream should run until
    /// dropped; ending it tells the engine the subscription is gone.
    /// Must be cancellation-safe (dropping the stream cleans up resources).
    fn watch(&self, selector: &str) -> MembershipStream;

    /// Get the source name (for logging)
    fn source_name(&self) -> &'static str;
}
