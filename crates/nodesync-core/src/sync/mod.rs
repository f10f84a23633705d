//! DNS record synchronization
//!
//! Applies a [`TargetAddressSet`] to one or more record names through a
//! [`DnsProvider`]:
//!
//! 1. Resolve the zone (explicit id, or discovery by the primary name)
//! 2. For each name, in order: look the name up, refuse non-address records,
//!    replace the value list and TTL, upsert
//!
//! ## Partial Application
//!
//! Names are applied independently. Earlier upserts are never rolled back.
//! A [`Error::TypeConflict`] only skips its own name; any other failure
//! abandons the remaining names. The first error is returned.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::{RecordLookup, RecordName, RecordSet, TargetAddressSet, Zone};
use crate::traits::DnsProvider;
use tracing::{debug, info, warn};

/// Names successfully upserted by one [`RecordSync::apply`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Zone the records were written to
    pub zone_id: String,
    /// Names upserted, in order
    pub upserted: Vec<RecordName>,
}

/// Pick the zone owning `name`
///
/// A zone matches when its name equals `name` or is a dot-separated suffix of
/// it. With nested zones the longest (most specific) name wins.
pub fn select_zone<'a>(zones: &'a [Zone], name: &RecordName) -> Option<&'a Zone> {
    zones
        .iter()
        .filter(|zone| name.is_within(&zone.name))
        .max_by_key(|zone| zone.name.len())
}

/// Writes target address sets to the provider
pub struct RecordSync {
    provider: Arc<dyn DnsProvider>,
}

impl RecordSync {
    /// Create a record sync over the given provider
    pub fn new(provider: Arc<dyn DnsProvider>) -> Self {
        Self { provider }
    }

    /// Find the zone owning `name` among the provider's zones
    pub async fn discover_zone(&self, name: &RecordName) -> Result<Zone> {
        let zones = self.provider.list_zones().await?;
        debug!(record = %name, zones = zones.len(), "Discovering zone");

        select_zone(&zones, name)
            .cloned()
            .ok_or_else(|| Error::zone_not_found(name.as_str()))
    }

    /// Zone id to use: the explicit one if given, otherwise discovered
    pub async fn zone_id(&self, explicit: Option<&str>, primary: &RecordName) -> Result<String> {
        match explicit {
            Some(id) => Ok(id.to_string()),
            None => {
                let zone = self.discover_zone(primary).await?;
                info!(record = %primary, zone_id = %zone.id, zone = %zone.name, "Discovered zone");
                Ok(zone.id)
            }
        }
    }

    /// Upsert `target` under every name in `names`
    ///
    /// The first name is the primary one used for zone discovery.
    pub async fn apply(
        &self,
        target: &TargetAddressSet,
        names: &[RecordName],
        ttl: u32,
        zone_id: Option<&str>,
    ) -> Result<SyncReport> {
        let primary = names
            .first()
            .ok_or_else(|| Error::invalid_input("No record names to sync"))?;
        let zone_id = self.zone_id(zone_id, primary).await?;

        let mut report = SyncReport {
            zone_id: zone_id.clone(),
            upserted: Vec::with_capacity(names.len()),
        };
        let mut first_error = None;

        for name in names {
            match self.apply_one(&zone_id, name, target, ttl).await {
                Ok(()) => {
                    info!(record = %name, zone_id = %zone_id, target = %target, ttl, "Upserted record");
                    report.upserted.push(name.clone());
                }
                Err(e @ Error::TypeConflict { .. }) => {
                    warn!(record = %name, zone_id = %zone_id, "{}", e);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    if !report.upserted.is_empty() {
                        warn!(
                            zone_id = %zone_id,
                            applied = report.upserted.len(),
                            "Aborting batch after partial application"
                        );
                    }
                    return Err(first_error.unwrap_or(e));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    async fn apply_one(
        &self,
        zone_id: &str,
        name: &RecordName,
        target: &TargetAddressSet,
        ttl: u32,
    ) -> Result<()> {
        let sets = self
            .provider
            .list_record_sets(zone_id)
            .await
            .map_err(|e| Error::record(zone_id, name.as_str(), e))?;

        let base = match RecordLookup::find(&sets, name) {
            RecordLookup::Address(existing) => {
                debug!(record = %name, current = ?existing.values, "Found address record");
                existing
            }
            RecordLookup::Conflict(existing) => {
                return Err(Error::type_conflict(name.as_str(), existing.record_type));
            }
            RecordLookup::Missing => {
                debug!(record = %name, "No record yet, creating");
                RecordSet::address(name.clone())
            }
        };

        let desired = base.with_target(target, ttl);
        self.provider
            .upsert_record_set(zone_id, &desired)
            .await
            .map_err(|e| Error::record(zone_id, name.as_str(), e))
    }
}
