// # Kubernetes Node Inventory
//
// This crate provides a `MemberSource` backed by the Kubernetes `Node` API.
//
// ## Mapping
//
// - `metadata.name` → `Member::id`
// - `status.addresses` of kind `ExternalIP`/`InternalIP` → member addresses
//   (other kinds such as `Hostname` are ignored)
// - `Ready` condition with status `True` → `Member::ready`
//
// The label selector is applied server-side for both listing and watching.
//
// ## Watching
//
// `watch` returns the kube-runtime watcher stream mapped to one
// `MembershipChange` per node event. Nothing runs in the background: the
// watch makes progress only while the stream is polled and stops when it is
// dropped.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Client, ResourceExt};
use nodesync_core::model::{AddressType, Member, MembershipChange};
use nodesync_core::traits::{MemberSource, MembershipStream};
use nodesync_core::{Error, Result};
use std::fmt::Display;
use tokio_stream::{Stream, StreamExt};

/// Condition type that marks a node as schedulable and healthy
const READY_CONDITION: &str = "Ready";

/// Kubernetes `Node` inventory
#[derive(Clone)]
pub struct KubeMemberSource {
    nodes: Api<Node>,
}

impl KubeMemberSource {
    /// Create a source over an existing client
    pub fn new(client: Client) -> Self {
        Self {
            nodes: Api::all(client),
        }
    }

    /// Connect using the ambient configuration and probe `selector`
    ///
    /// Uses the in-cluster service account when running in a pod, otherwise
    /// the local kubeconfig. A one-item list is issued so that an unreachable
    /// API server or a malformed selector fails here rather than on the first
    /// pass.
    pub async fn connect(selector: &str) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| Error::config(format!("Kubernetes client: {}", e)))?;
        let source = Self::new(client);

        source
            .nodes
            .list(&list_params(selector).limit(1))
            .await
            .map_err(|e| Error::config(format!("node selector '{}' rejected: {}", selector, e)))?;

        tracing::info!(selector = selector, "Connected to Kubernetes node inventory");
        Ok(source)
    }
}

fn list_params(selector: &str) -> ListParams {
    let params = ListParams::default();
    if selector.is_empty() {
        params
    } else {
        params.labels(selector)
    }
}

fn watcher_config(selector: &str) -> watcher::Config {
    let config = watcher::Config::default();
    if selector.is_empty() {
        config
    } else {
        config.labels(selector)
    }
}

/// Convert a Kubernetes node into an inventory member
pub fn member_from_node(node: &Node) -> Member {
    let status = node.status.as_ref();

    let addresses = status
        .and_then(|s| s.addresses.as_ref())
        .map(|addresses| {
            addresses
                .iter()
                .filter_map(|a| {
                    AddressType::from_kubernetes(&a.type_).map(|kind| (kind, a.address.clone()))
                })
                .collect()
        })
        .unwrap_or_default();

    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == READY_CONDITION && c.status == "True")
        });

    Member {
        id: node.name_any(),
        addresses,
        ready,
    }
}

/// Map one watcher event to a membership change
///
/// `seen_initial_list` tracks whether the first complete listing has already
/// gone by; the engine performs its own initial pass, so only later re-lists
/// are reported as `Resynced`.
fn change_from_event(event: Event<Node>, seen_initial_list: &mut bool) -> Option<MembershipChange> {
    match event {
        Event::Apply(node) => Some(MembershipChange::Applied { id: node.name_any() }),
        Event::Delete(node) => Some(MembershipChange::Deleted { id: node.name_any() }),
        Event::Init | Event::InitApply(_) => None,
        Event::InitDone => {
            if *seen_initial_list {
                Some(MembershipChange::Resynced)
            } else {
                *seen_initial_list = true;
                None
            }
        }
    }
}

/// Map watcher output to membership changes
///
/// Watch errors are logged and skipped; the watcher's backoff retries the
/// underlying request.
fn membership_changes<S, E>(events: S) -> impl Stream<Item = MembershipChange>
where
    S: Stream<Item = std::result::Result<Event<Node>, E>>,
    E: Display,
{
    let mut seen_initial_list = false;
    events.filter_map(move |event| match event {
        Ok(event) => {
            let change = change_from_event(event, &mut seen_initial_list);
            if let Some(change) = &change {
                tracing::debug!(?change, "Node event");
            }
            change
        }
        Err(e) => {
            tracing::warn!(error = %e, "Node watch error, continuing");
            None
        }
    })
}

#[async_trait]
impl MemberSource for KubeMemberSource {
    async fn list_members(&self, selector: &str) -> Result<Vec<Member>> {
        let nodes = self
            .nodes
            .list(&list_params(selector))
            .await
            .map_err(|e| Error::inventory(format!("listing nodes failed: {}", e)))?;

        let members: Vec<Member> = nodes.items.iter().map(member_from_node).collect();
        tracing::debug!(count = members.len(), selector = selector, "Listed nodes");
        Ok(members)
    }

    fn watch(&self, selector: &str) -> MembershipStream {
        tracing::info!(selector = %selector, "Starting node watch");
        let events = watcher::watcher(self.nodes.clone(), watcher_config(selector)).default_backoff();
        Box::pin(membership_changes(events))
    }

    fn source_name(&self) -> &'static str {
        "kubernetes"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: serde_json::Value) -> Node {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn maps_addresses_and_readiness() {
        let n = node(json!({
            "metadata": { "name": "worker-1" },
            "status": {
                "addresses": [
                    { "type": "Hostname", "address": "worker-1" },
                    { "type": "InternalIP", "address": "10.0.0.5" },
                    { "type": "ExternalIP", "address": "203.0.113.5" }
                ],
                "conditions": [
                    { "type": "MemoryPressure", "status": "False" },
                    { "type": "Ready", "status": "True" }
                ]
            }
        }));

        let member = member_from_node(&n);
        assert_eq!(member.id, "worker-1");
        assert!(member.ready);
        assert_eq!(
            member.addresses,
            vec![
                (AddressType::Internal, "10.0.0.5".to_string()),
                (AddressType::External, "203.0.113.5".to_string()),
            ]
        );
    }

    #[test]
    fn not_ready_when_ready_condition_false() {
        let n = node(json!({
            "metadata": { "name": "worker-2" },
            "status": {
                "conditions": [
                    { "type": "DiskPressure", "status": "True" },
                    { "type": "Ready", "status": "False" }
                ]
            }
        }));

        let member = member_from_node(&n);
        assert!(!member.ready);
        assert!(member.addresses.is_empty());
    }

    #[test]
    fn node_without_status_is_not_ready() {
        let member = member_from_node(&node(json!({ "metadata": { "name": "fresh" } })));
        assert_eq!(member.id, "fresh");
        assert!(!member.ready);
    }

    #[test]
    fn events_map_to_membership_changes() {
        let n = node(json!({ "metadata": { "name": "worker-1" } }));
        let mut seen = false;

        assert_eq!(change_from_event(Event::Init, &mut seen), None);
        assert_eq!(change_from_event(Event::InitApply(n.clone()), &mut seen), None);
        assert_eq!(change_from_event(Event::InitDone, &mut seen), None);
        assert!(seen);

        assert_eq!(
            change_from_event(Event::Apply(n.clone()), &mut seen),
            Some(MembershipChange::Applied { id: "worker-1".into() })
        );
        assert_eq!(
            change_from_event(Event::Delete(n), &mut seen),
            Some(MembershipChange::Deleted { id: "worker-1".into() })
        );
        assert_eq!(
            change_from_event(Event::InitDone, &mut seen),
            Some(MembershipChange::Resynced)
        );
    }

    #[tokio::test]
    async fn watch_errors_are_skipped_and_initial_list_is_swallowed() {
        let n = node(json!({ "metadata": { "name": "worker-1" } }));
        let events = tokio_stream::iter(vec![
            Ok(Event::Init),
            Ok(Event::InitApply(n.clone())),
            Ok(Event::InitDone),
            Err("watch stream desynced".to_string()),
            Ok(Event::Apply(n.clone())),
            Ok(Event::Init),
            Ok(Event::InitDone),
            Ok(Event::Delete(n)),
        ]);

        let changes: Vec<MembershipChange> = membership_changes(events).collect().await;
        assert_eq!(
            changes,
            vec![
                MembershipChange::Applied { id: "worker-1".into() },
                MembershipChange::Resynced,
                MembershipChange::Deleted { id: "worker-1".into() },
            ]
        );
    }

    #[test]
    fn empty_selector_lists_everything() {
        assert_eq!(list_params("").label_selector, None);
        assert_eq!(
            list_params("role=edge").label_selector.as_deref(),
            Some("role=edge")
        );
    }
}
