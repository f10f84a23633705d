// # Hickory Address Resolver
//
// Independent name resolution for drift detection and convergence checks.
//
// Queries go to the nameservers from the system configuration
// (`/etc/resolv.conf` on Unix), never to the DNS provider's API, so answers
// reflect what clients actually see. The resolver's answer cache is disabled:
// the convergence verifier polls the same name repeatedly and must observe
// every change.

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use nodesync_core::model::{RecordName, TargetAddressSet};
use nodesync_core::traits::AddressResolver;
use nodesync_core::{Error, Result};
use std::net::IpAddr;

/// Uncached stub resolver
pub struct HickoryResolver {
    inner: TokioAsyncResolver,
}

impl HickoryResolver {
    /// Build from the system resolver configuration
    pub fn from_system_conf() -> Result<Self> {
        let (config, opts) = hickory_resolver::system_conf::read_system_conf()
            .map_err(|e| Error::config(format!("reading system resolver configuration: {}", e)))?;
        Ok(Self::with_config(config, opts))
    }

    /// Build from an explicit configuration (caching is always turned off)
    pub fn with_config(config: ResolverConfig, mut opts: ResolverOpts) -> Self {
        opts.cache_size = 0;
        tracing::debug!(
            nameservers = config.name_servers().len(),
            "Initialized uncached resolver"
        );
        Self {
            inner: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

/// Collapse resolved addresses into a target set
fn collect_addresses(addresses: impl IntoIterator<Item = IpAddr>) -> TargetAddressSet {
    TargetAddressSet::from_addresses(addresses.into_iter().map(|ip| ip.to_string()))
}

/// A name with no address records is an answer (the empty set), not a failure
fn is_empty_answer(error: &ResolveError) -> bool {
    matches!(error.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

#[async_trait]
impl AddressResolver for HickoryResolver {
    async fn resolve(&self, name: &RecordName) -> Result<TargetAddressSet> {
        match self.inner.lookup_ip(name.as_str()).await {
            Ok(lookup) => {
                let observed = collect_addresses(lookup.iter());
                tracing::trace!(record = %name, observed = %observed.joined(), "Resolved");
                Ok(observed)
            }
            Err(e) if is_empty_answer(&e) => {
                tracing::trace!(record = %name, "No address records");
                Ok(TargetAddressSet::empty())
            }
            Err(e) => Err(Error::resolution(format!("{}: {}", name, e))),
        }
    }
}
