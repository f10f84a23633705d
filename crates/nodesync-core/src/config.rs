//! Configuration types for the node DNS synchronizer
//!
//! This module defines all configuration structures used throughout the crate.
//! Loading them (flags, environment) is the embedding application's job.

use crate::error::{Error, Result};
use crate::model::{AddressType, RecordName};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// TTL used when none (or an invalid one) is configured
pub const DEFAULT_TTL: u32 = 300;

/// Main synchronizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Record names sharing one address set; the first one is the primary
    pub records: Vec<String>,

    /// Record TTL in seconds (0 falls back to [`DEFAULT_TTL`])
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Explicit zone identifier; zone discovery runs when absent or empty
    #[serde(default)]
    pub zone_id: Option<String>,

    /// Which member addresses get published
    #[serde(default)]
    pub addresses: AddressPolicy,

    /// Compare against (and verify via) independent DNS resolution
    #[serde(default)]
    pub verify_with_dns: bool,

    /// Member selection predicate, passed verbatim to the member source
    #[serde(default)]
    pub member_selector: String,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Create a configuration for the given record names with defaults
    pub fn new<I, S>(records: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            records: records.into_iter().map(Into::into).collect(),
            ttl: DEFAULT_TTL,
            zone_id: None,
            addresses: AddressPolicy::default(),
            verify_with_dns: false,
            member_selector: String::new(),
            engine: EngineConfig::default(),
        }
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set an explicit zone identifier
    pub fn with_zone_id(mut self, zone_id: impl Into<String>) -> Self {
        self.zone_id = Some(zone_id.into());
        self
    }

    /// Set the address policy
    pub fn with_addresses(mut self, addresses: AddressPolicy) -> Self {
        self.addresses = addresses;
        self
    }

    /// Enable or disable independent DNS verification
    pub fn with_verify_with_dns(mut self, enabled: bool) -> Self {
        self.verify_with_dns = enabled;
        self
    }

    /// Set the member selector
    pub fn with_member_selector(mut self, selector: impl Into<String>) -> Self {
        self.member_selector = selector.into();
        self
    }

    /// Set the periodic resync interval in seconds (0 disables)
    pub fn with_resync_interval_secs(mut self, secs: u64) -> Self {
        self.engine.resync_interval_secs = secs;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.records.is_empty() {
            return Err(Error::config("No record names configured"));
        }

        self.record_names()?;
        self.addresses.validate()?;

        if self.engine.event_channel_capacity == 0 {
            return Err(Error::config("Event channel capacity must be > 0"));
        }

        Ok(())
    }

    /// Parsed, normalized record names in configuration order
    pub fn record_names(&self) -> Result<Vec<RecordName>> {
        self.records.iter().map(|r| RecordName::parse(r)).collect()
    }

    /// TTL actually applied to records
    pub fn effective_ttl(&self) -> u32 {
        if self.ttl == 0 { DEFAULT_TTL } else { self.ttl }
    }

    /// Explicit zone identifier, if one is configured
    pub fn explicit_zone_id(&self) -> Option<&str> {
        self.zone_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Parse a TTL setting, defaulting to [`DEFAULT_TTL`] when absent or invalid
pub fn parse_ttl(raw: Option<&str>) -> u32 {
    match raw
        .and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|ttl| *ttl > 0)
    {
        Some(ttl) => ttl,
        None => {
            tracing::warn!(
                "TTL not configured or invalid ({:?}), defaulting to {}",
                raw,
                DEFAULT_TTL
            );
            DEFAULT_TTL
        }
    }
}

/// Address selection policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AddressPolicy {
    /// Publish every address of the listed types
    Direct {
        /// Address types to include
        types: Vec<AddressType>,
    },

    /// Publish `preferred` addresses; use `fallback` only if there are none
    Fallback {
        /// Type tried first
        preferred: AddressType,
        /// Type used when no ready member has a `preferred` address
        fallback: AddressType,
    },
}

impl AddressPolicy {
    /// Build the policy from the daemon's flags
    ///
    /// Without internal addresses only external ones are published. With
    /// them, [`AddressMode::Direct`] publishes both kinds while
    /// [`AddressMode::Fallback`] uses internal ones only when no external
    /// address exists.
    pub fn from_flags(use_internal: bool, mode: AddressMode) -> Self {
        match (use_internal, mode) {
            (false, _) => AddressPolicy::default(),
            (true, AddressMode::Direct) => AddressPolicy::Direct {
                types: vec![AddressType::External, AddressType::Internal],
            },
            (true, AddressMode::Fallback) => AddressPolicy::Fallback {
                preferred: AddressType::External,
                fallback: AddressType::Internal,
            },
        }
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<()> {
        match self {
            AddressPolicy::Direct { types } if types.is_empty() => Err(Error::config(
                "Direct address policy needs at least one address type",
            )),
            AddressPolicy::Fallback {
                preferred,
                fallback,
            } if preferred == fallback => Err(Error::config(format!(
                "Fallback address type must differ from preferred type ({})",
                preferred
            ))),
            _ => Ok(()),
        }
    }
}

impl Default for AddressPolicy {
    fn default() -> Self {
        AddressPolicy::Direct {
            types: vec![AddressType::External],
        }
    }
}

/// Named address selection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    /// Include every configured address type
    #[default]
    Direct,
    /// Prefer external addresses, fall back to internal ones
    Fallback,
}

impl FromStr for AddressMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(AddressMode::Direct),
            "fallback" => Ok(AddressMode::Fallback),
            other => Err(Error::config(format!(
                "Unknown address mode '{}'. Valid: direct, fallback",
                other
            ))),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the engine event channel
    ///
    /// When full, new engine events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// How long shutdown waits for an in-flight pass (in seconds)
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Period of the unconditional resync pass (in seconds, 0 disables)
    ///
    /// Repairs failed syncs and out-of-band record edits even when the
    /// inventory stays quiet.
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
}

impl EngineConfig {
    /// Shutdown grace period as a duration
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Resync period, `None` when periodic resync is disabled
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            resync_interval_secs: default_resync_interval_secs(),
        }
    }
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

fn default_event_channel_capacity() -> usize {
    100
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_resync_interval_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_json() {
        let config: SyncConfig =
            serde_json::from_value(serde_json::json!({ "records": ["nodes.example.com"] }))
                .unwrap();

        assert_eq!(config.ttl, DEFAULT_TTL);
        assert_eq!(config.addresses, AddressPolicy::default());
        assert!(!config.verify_with_dns);
        assert!(config.explicit_zone_id().is_none());
        assert_eq!(config.engine.event_channel_capacity, 100);
        assert_eq!(config.engine.resync_interval(), Some(Duration::from_secs(60)));
        config.validate().unwrap();
    }

    #[test]
    fn zero_resync_interval_disables_resync() {
        let config: SyncConfig = serde_json::from_value(serde_json::json!({
            "records": ["nodes.example.com"],
            "engine": { "resync_interval_secs": 0 }
        }))
        .unwrap();

        assert_eq!(config.engine.resync_interval(), None);
        assert_eq!(config.engine.shutdown_grace(), Duration::from_secs(10));
    }

    #[test]
    fn fallback_policy_from_json() {
        let config: SyncConfig = serde_json::from_value(serde_json::json!({
            "records": ["nodes.example.com"],
            "addresses": { "mode": "fallback", "preferred": "external", "fallback": "internal" }
        }))
        .unwrap();

        assert_eq!(
            config.addresses,
            AddressPolicy::Fallback {
                preferred: AddressType::External,
                fallback: AddressType::Internal,
            }
        );
    }

    #[test]
    fn validation_rejects_bad_input() {
        assert!(SyncConfig::new(Vec::<String>::new()).validate().is_err());
        assert!(SyncConfig::new(["bad..name"]).validate().is_err());
        assert!(
            SyncConfig::new(["ok.example.com"])
                .with_addresses(AddressPolicy::Direct { types: vec![] })
                .validate()
                .is_err()
        );
        assert!(
            SyncConfig::new(["ok.example.com"])
                .with_addresses(AddressPolicy::Fallback {
                    preferred: AddressType::Internal,
                    fallback: AddressType::Internal,
                })
                .validate()
                .is_err()
        );
    }

    #[test]
    fn ttl_parsing_defaults() {
        assert_eq!(parse_ttl(Some("60")), 60);
        assert_eq!(parse_ttl(Some(" 120 ")), 120);
        assert_eq!(parse_ttl(Some("abc")), DEFAULT_TTL);
        assert_eq!(parse_ttl(Some("0")), DEFAULT_TTL);
        assert_eq!(parse_ttl(Some("-5")), DEFAULT_TTL);
        assert_eq!(parse_ttl(None), DEFAULT_TTL);
        assert_eq!(SyncConfig::new(["a.example.com"]).with_ttl(0).effective_ttl(), DEFAULT_TTL);
    }

    #[test]
    fn empty_zone_id_means_discovery() {
        let config = SyncConfig::new(["a.example.com"]).with_zone_id("  ");
        assert!(config.explicit_zone_id().is_none());
        let config = SyncConfig::new(["a.example.com"]).with_zone_id("Z123");
        assert_eq!(config.explicit_zone_id(), Some("Z123"));
    }

    #[test]
    fn policy_from_flags() {
        assert_eq!(
            AddressPolicy::from_flags(false, AddressMode::Fallback),
            AddressPolicy::default()
        );
        assert_eq!(
            AddressPolicy::from_flags(true, AddressMode::Direct),
            AddressPolicy::Direct {
                types: vec![AddressType::External, AddressType::Internal]
            }
        );
        assert!(matches!(
            AddressPolicy::from_flags(true, AddressMode::Fallback),
            AddressPolicy::Fallback { .. }
        ));
        assert_eq!("FALLBACK".parse::<AddressMode>().unwrap(), AddressMode::Fallback);
        assert!("both".parse::<AddressMode>().is_err());
    }
}
