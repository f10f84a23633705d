//! Address extraction
//!
//! Turns the raw member inventory into the [`TargetAddressSet`] to publish:
//! keep ready members, pick addresses according to the [`AddressPolicy`],
//! then normalize, sort and deduplicate. Pure, no error conditions; an empty
//! result means "no ready members".

use crate::config::AddressPolicy;
use crate::model::{AddressType, Member, TargetAddressSet};

/// Default readiness predicate: the member reports a true readiness condition
pub fn is_ready(member: &Member) -> bool {
    member.ready
}

/// Extract the target set using the default readiness predicate
pub fn extract(members: &[Member], policy: &AddressPolicy) -> TargetAddressSet {
    extract_with(members, policy, is_ready)
}

/// Extract the target set using a custom readiness predicate
pub fn extract_with<F>(members: &[Member], policy: &AddressPolicy, ready: F) -> TargetAddressSet
where
    F: Fn(&Member) -> bool,
{
    let ready_members: Vec<&Member> = members.iter().filter(|m| ready(*m)).collect();

    match policy {
        AddressPolicy::Direct { types } => TargetAddressSet::from_addresses(
            ready_members
                .iter()
                .flat_map(|m| m.addresses.iter())
                .filter(|(kind, _)| types.contains(kind))
                .map(|(_, value)| value.as_str()),
        ),
        AddressPolicy::Fallback {
            preferred,
            fallback,
        } => {
            let primary = of_type(&ready_members, *preferred);
            if primary.is_empty() {
                tracing::debug!(
                    "No ready member has a {} address, falling back to {}",
                    preferred,
                    fallback
                );
                of_type(&ready_members, *fallback)
            } else {
                primary
            }
        }
    }
}

fn of_type(members: &[&Member], kind: AddressType) -> TargetAddressSet {
    TargetAddressSet::from_addresses(members.iter().flat_map(|m| m.addresses_of(kind)))
}
