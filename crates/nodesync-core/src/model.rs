//! Data model shared by the engine and its collaborators
//!
//! - [`Member`]: one machine from the inventory, as read by the core
//! - [`TargetAddressSet`]: the canonical, sorted address list to publish
//! - [`RecordName`], [`Zone`], [`RecordSet`]: the DNS side of the picture

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Kind of a member address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    /// Publicly routable address
    External,
    /// Cluster-internal address
    Internal,
}

impl AddressType {
    /// Map a Kubernetes node address kind (`ExternalIP`, `InternalIP`)
    ///
    /// Other kinds (`Hostname`, `InternalDNS`, ...) are not addresses we publish.
    pub fn from_kubernetes(kind: &str) -> Option<Self> {
        match kind {
            "ExternalIP" => Some(AddressType::External),
            "InternalIP" => Some(AddressType::Internal),
            _ => None,
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressType::External => f.write_str("external"),
            AddressType::Internal => f.write_str("internal"),
        }
    }
}

impl FromStr for AddressType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "external" | "externalip" => Ok(AddressType::External),
            "internal" | "internalip" => Ok(AddressType::Internal),
            other => Err(Error::config(format!(
                "Unknown address type '{}'. Valid: external, internal",
                other
            ))),
        }
    }
}

/// A machine from the inventory
///
/// Produced by a [`MemberSource`](crate::traits::MemberSource); the core only reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Opaque identity (node name for Kubernetes)
    pub id: String,
    /// Addresses in the order the inventory reported them
    pub addresses: Vec<(AddressType, String)>,
    /// Whether at least one readiness condition is true
    pub ready: bool,
}

impl Member {
    /// Create a ready member without addresses
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            addresses: Vec::new(),
            ready: true,
        }
    }

    /// Add an address
    pub fn with_address(mut self, kind: AddressType, value: impl Into<String>) -> Self {
        self.addresses.push((kind, value.into()));
        self
    }

    /// Set readiness
    pub fn with_ready(mut self, ready: bool) -> Self {
        self.ready = ready;
        self
    }

    /// Addresses of the given kind
    pub fn addresses_of(&self, kind: AddressType) -> impl Iterator<Item = &str> {
        self.addresses
            .iter()
            .filter(move |(k, _)| *k == kind)
            .map(|(_, value)| value.as_str())
    }
}

/// Canonical, deduplicated and sorted list of addresses
///
/// Sorting is lexicographic on the normalized text, so IPv4 and IPv6
/// addresses mix without special-casing. Two sets are equal when their
/// comma-joined forms are equal.
#[derive(Debug, Clone, Default, Eq, Serialize, Deserialize)]
pub struct TargetAddressSet(Vec<String>);

impl TargetAddressSet {
    /// The empty set ("no ready members")
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Build a set from raw address strings, normalizing, sorting and deduplicating
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut values: Vec<String> = addresses
            .into_iter()
            .filter_map(|a| normalize_address(a.as_ref()))
            .collect();
        values.sort();
        values.dedup();
        Self(values)
    }

    /// Number of addresses
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the addresses in order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// The addresses as a slice
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Comma-joined form, the basis of equality
    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

impl PartialEq for TargetAddressSet {
    fn eq(&self, other: &Self) -> bool {
        self.joined() == other.joined()
    }
}

impl fmt::Display for TargetAddressSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.joined())
    }
}

impl<S: AsRef<str>> FromIterator<S> for TargetAddressSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_addresses(iter)
    }
}

/// Normalize a single address string
///
/// IP literals are rewritten to their canonical form (so `2001:DB8::0001`
/// and `2001:db8::1` compare equal), anything else is lowercased.
/// Blank input yields `None`.
pub fn normalize_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<IpAddr>() {
        Ok(ip) => Some(ip.to_string()),
        Err(_) => Some(trimmed.to_ascii_lowercase()),
    }
}

/// Fully-qualified record name, always ending with `.`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordName(String);

impl RecordName {
    /// Parse and validate a record name from configuration
    ///
    /// Trims, lowercases and appends the trailing dot. Labels follow
    /// RFC 1035 (alphanumeric and hyphen, 1..=63 chars, no leading or
    /// trailing hyphen); a leading `*` label is accepted for wildcards.
    pub fn parse(raw: &str) -> Result<Self> {
        let name = Self::from_wire(raw);
        let body = name.0.trim_end_matches('.');

        if body.is_empty() {
            return Err(Error::config("Record name cannot be empty"));
        }

        // Total length limit (RFC 1035: 253 chars max)
        if body.len() > 253 {
            return Err(Error::config(format!(
                "Record name too long: {} chars (max 253). Got: {}",
                body.len(),
                body
            )));
        }

        for (index, label) in body.split('.').enumerate() {
            if label.is_empty() {
                return Err(Error::config(format!(
                    "Record name has empty label: '{}'",
                    raw
                )));
            }

            if index == 0 && label == "*" {
                continue;
            }

            if label.len() > 63 {
                return Err(Error::config(format!(
                    "Record label too long: {} chars (max 63). Label: '{}'",
                    label.len(),
                    label
                )));
            }

            if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err(Error::config(format!(
                    "Record label contains invalid characters. Label: '{}'. \
                    Valid: alphanumeric and hyphen only.",
                    label
                )));
            }

            if label.starts_with('-') || label.ends_with('-') {
                return Err(Error::config(format!(
                    "Record label cannot start or end with hyphen. Label: '{}'",
                    label
                )));
            }
        }

        Ok(name)
    }

    /// Normalize a name reported by a provider, without validation
    pub fn from_wire(raw: &str) -> Self {
        let mut name = raw.trim().to_ascii_lowercase();
        if !name.ends_with('.') {
            name.push('.');
        }
        Self(name)
    }

    /// The name including the trailing dot
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name without the trailing dot
    pub fn relative(&self) -> &str {
        self.0.trim_end_matches('.')
    }

    /// Whether this name equals the zone name or lives below it
    pub fn is_within(&self, zone_name: &str) -> bool {
        let zone = RecordName::from_wire(zone_name);
        self.0 == zone.0 || self.0.ends_with(&format!(".{}", zone.0))
    }
}

impl fmt::Display for RecordName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RecordName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        RecordName::parse(&value)
    }
}

impl From<RecordName> for String {
    fn from(name: RecordName) -> Self {
        name.0
    }
}

/// A DNS zone known to the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    /// Provider-specific zone identifier
    pub id: String,
    /// Zone apex name, with trailing dot
    pub name: String,
}

impl Zone {
    /// Create a zone, normalizing its name
    pub fn new(id: impl Into<String>, name: &str) -> Self {
        Self {
            id: id.into(),
            name: RecordName::from_wire(name).0,
        }
    }
}

/// Type of a record set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// Address record (A/AAAA)
    Address,
    /// Anything else (CNAME, NS, SOA, TXT, ...)
    Other(String),
}

impl RecordType {
    /// Map a wire type name (`A`, `AAAA`, `CNAME`, ...)
    pub fn from_wire(kind: &str) -> Self {
        match kind.trim().to_ascii_uppercase().as_str() {
            "A" | "AAAA" => RecordType::Address,
            other => RecordType::Other(other.to_string()),
        }
    }

    /// Whether this is an address record
    pub fn is_address(&self) -> bool {
        matches!(self, RecordType::Address)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::Address => f.write_str("A"),
            RecordType::Other(kind) => f.write_str(kind),
        }
    }
}

/// A named, typed DNS entry with its values and TTL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    /// Fully-qualified name
    pub name: RecordName,
    /// Record type
    pub record_type: RecordType,
    /// Values in publication order
    pub values: Vec<String>,
    /// Time-to-live in seconds
    pub ttl: u32,
}

impl RecordSet {
    /// A fresh, empty address record shell
    pub fn address(name: RecordName) -> Self {
        Self {
            name,
            record_type: RecordType::Address,
            values: Vec::new(),
            ttl: 0,
        }
    }

    /// Replace the value list with the target set and set the TTL
    pub fn with_target(mut self, target: &TargetAddressSet, ttl: u32) -> Self {
        self.values = target.iter().map(str::to_string).collect();
        self.ttl = ttl;
        self
    }
}

/// Outcome of looking a name up among a zone's record sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordLookup {
    /// An address record exists under the name
    Address(RecordSet),
    /// A record of another type occupies the name
    Conflict(RecordSet),
    /// Nothing exists under the name
    Missing,
}

impl RecordLookup {
    /// Find `name` among `sets`
    ///
    /// An address record wins over other types at the same name, so a zone
    /// apex carrying NS/SOA next to its A record is still updatable.
    pub fn find(sets: &[RecordSet], name: &RecordName) -> Self {
        let mut conflict = None;
        for set in sets.iter().filter(|set| &set.name == name) {
            if set.record_type.is_address() {
                return RecordLookup::Address(set.clone());
            }
            if conflict.is_none() {
                conflict = Some(set.clone());
            }
        }
        conflict.map_or(RecordLookup::Missing, RecordLookup::Conflict)
    }
}

/// A change notification from the inventory
///
/// The engine treats all variants identically; they only feed logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipChange {
    /// A member was added or updated
    Applied {
        /// Member identity
        id: String,
    },
    /// A member was removed
    Deleted {
        /// Member identity
        id: String,
    },
    /// The source re-listed its whole inventory
    Resynced,
}
