use async_trait::async_trait;

use crate::model::{RecordName, TargetAddressSet};

/// Independent external name resolution
///
/// Answers must reflect publicly propagated state, not the provider's own
/// read path. Implementations must not cache answers, since the convergence
/// verifier polls the same name repeatedly.
///
/// A failed lookup is never fatal to the engine: it is treated as "no
/// observation" during drift detection and convergence polling.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolve `name` to its current address set
    async fn resolve(&self, name: &RecordName) -> Result<TargetAddressSet, crate::Error>;
}
