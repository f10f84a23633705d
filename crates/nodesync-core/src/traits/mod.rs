//! Core traits for the node DNS synchronizer
//!
//! This module defines the abstract interfaces of the engine's collaborators.
//!
//! - [`MemberSource`]: List cluster members and watch for membership changes
//! - [`DnsProvider`]: Read zones/record sets and upsert address records
//! - [`AddressResolver`]: Independent external name resolution
//! - [`Clock`]: Time and sleeping, injectable for tests

pub mod member_source;
pub mod dns_provider;
pub mod resolver;
pub mod clock;

pub use member_source::{MemberSource, MembershipStream};
pub use dns_provider::DnsProvider;
pub use resolver::AddressResolver;
pub use clock::{Clock, TokioClock};
