// Record grouping and upsert planning
//
// Cloudflare stores one record per value, while the engine thinks in record
// sets. Everything here is pure so it can be tested without HTTP.

use nodesync_core::model::normalize_address;
use nodesync_core::{Error, RecordName, RecordSet, RecordType, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// One DNS record as returned by `GET /zones/:zone_id/dns_records`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CloudflareRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub ttl: u32,
}

impl CloudflareRecord {
    fn record_name(&self) -> RecordName {
        RecordName::from_wire(&self.name)
    }

    fn is_address(&self) -> bool {
        RecordType::from_wire(&self.kind).is_address()
    }
}

/// A single API call needed to make the provider match a record set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordChange {
    /// `POST /zones/:zone_id/dns_records`
    Create {
        kind: &'static str,
        content: String,
        ttl: u32,
    },
    /// `PATCH /zones/:zone_id/dns_records/:id` (value kept, TTL differs)
    UpdateTtl { id: String, content: String, ttl: u32 },
    /// `DELETE /zones/:zone_id/dns_records/:id`
    Delete { id: String, content: String },
}

/// Group per-value records into record sets
///
/// A and AAAA records of the same name form one address set. The set's TTL is
/// the smallest TTL among its records.
pub fn group_record_sets(records: &[CloudflareRecord]) -> Vec<RecordSet> {
    let mut groups: BTreeMap<(RecordName, String), RecordSet> = BTreeMap::new();

    for record in records {
        let record_type = RecordType::from_wire(&record.kind);
        let key = (record.record_name(), record_type.to_string());
        let set = groups.entry(key).or_insert_with(|| RecordSet {
            name: record.record_name(),
            record_type,
            values: Vec::new(),
            ttl: record.ttl,
        });
        set.values.push(record.content.clone());
        set.ttl = set.ttl.min(record.ttl);
    }

    groups.into_values().collect()
}

/// Wire type for an address value
pub fn address_kind(value: &str) -> Result<&'static str> {
    match value.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => Ok("A"),
        Ok(IpAddr::V6(_)) => Ok("AAAA"),
        Err(_) => Err(Error::invalid_input(format!(
            "'{}' is not an IP address and cannot be published as an address record",
            value
        ))),
    }
}

/// Compute the calls turning the zone's current records into `desired`
///
/// Only address records named `desired.name` are considered. Creates come
/// first and deletes last, so the name never resolves to nothing while a
/// set is being replaced.
pub fn plan_upsert(existing: &[CloudflareRecord], desired: &RecordSet) -> Result<Vec<RecordChange>> {
    let mut wanted: Vec<String> = desired
        .values
        .iter()
        .filter_map(|v| normalize_address(v))
        .collect();
    wanted.sort();
    wanted.dedup();

    let mut creates = Vec::new();
    let mut updates = Vec::new();
    let mut deletes = Vec::new();
    let mut kept: Vec<String> = Vec::new();

    let current = existing
        .iter()
        .filter(|r| r.is_address() && r.record_name() == desired.name);

    for record in current {
        let content = normalize_address(&record.content).unwrap_or_default();
        if wanted.contains(&content) && !kept.contains(&content) {
            if record.ttl != desired.ttl {
                updates.push(RecordChange::UpdateTtl {
                    id: record.id.clone(),
                    content: content.clone(),
                    ttl: desired.ttl,
                });
            }
            kept.push(content);
        } else {
            deletes.push(RecordChange::Delete {
                id: record.id.clone(),
                content,
            });
        }
    }

    for value in &wanted {
        if !kept.contains(value) {
            creates.push(RecordChange::Create {
                kind: address_kind(value)?,
                content: value.clone(),
                ttl: desired.ttl,
            });
        }
    }

    Ok(creates.into_iter().chain(updates).chain(deletes).collect())
}
