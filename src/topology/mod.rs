//! Pure topology derivation.
//!
//! Turns a validated manifest plus "this node's name" into the node's role
//! set, the ordered list of peers to actively connect to, and the per-peer
//! host descriptors to materialize on disk. Derivation is a pure function of
//! its inputs: re-running it on an unchanged manifest yields identical
//! output, which is what makes on-disk config regeneration idempotent.

use std::collections::BTreeSet;
use std::net::IpAddr;

use snafu::Snafu;

use crate::manifest::{Manifest, NodeDescriptor, Role};

/// Default listening port of the overlay daemon.
pub const DEFAULT_OVERLAY_PORT: u16 = 655;

/// Errors deriving topology.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum TopologyError {
    #[snafu(display("node '{name}' is not declared in the manifest"))]
    UnknownNode { name: String },
}

/// Derived, per-peer record of everything needed to establish an overlay
/// link to one node. Not persisted in the manifest; recomputed per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDescriptor {
    pub name: String,
    pub overlay_addr: IpAddr,
    pub public_addr: Option<IpAddr>,
    pub port: u16,
}

impl HostDescriptor {
    fn for_node(node: &NodeDescriptor) -> Self {
        Self {
            name: node.name.clone(),
            overlay_addr: node.overlay_addr,
            public_addr: node.public_addr,
            port: DEFAULT_OVERLAY_PORT,
        }
    }
}

/// The derived view of the mesh from one node's perspective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Roles carried by the requesting node.
    pub roles: BTreeSet<Role>,
    /// Peer names to actively connect to, in manifest order. Never contains
    /// the requesting node's own name.
    pub connect_to: Vec<String>,
    /// Host descriptors for every peer (including passive ones), in
    /// manifest order.
    pub hosts: Vec<HostDescriptor>,
    /// Host descriptor for the requesting node itself.
    pub self_host: HostDescriptor,
}

/// Derive the topology for `self_name` from a manifest.
///
/// Iterates manifest nodes in order, skipping the requesting node. Every
/// peer receives a host descriptor; peers whose overlay address resolved at
/// load time also land on the active connect-to list. The requesting node
/// must itself be declared in the manifest, since its role set comes from
/// its own descriptor.
pub fn derive(manifest: &Manifest, self_name: &str) -> Result<Topology, TopologyError> {
    let self_node = manifest.get_node(self_name).ok_or_else(|| TopologyError::UnknownNode {
        name: self_name.to_string(),
    })?;

    let roles: BTreeSet<Role> = self_node.roles.iter().copied().collect();
    let mut connect_to = Vec::new();
    let mut hosts = Vec::new();

    for node in &manifest.nodes {
        if node.name == self_name {
            continue;
        }
        hosts.push(HostDescriptor::for_node(node));
        connect_to.push(node.name.clone());
    }

    Ok(Topology {
        roles,
        connect_to,
        hosts,
        self_host: HostDescriptor::for_node(self_node),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        Manifest::from_slice(
            br#"
[network]
name = "test-network"
version = "1.0.0"

[[nodes]]
name = "node1"
internal_ip = "192.168.1.10"
vpn_ip = "10.100.0.1"
public_ip = "1.2.3.4"
roles = ["storage_introducer", "storage_provider"]

[[nodes]]
name = "node2"
internal_ip = "192.168.1.11"
vpn_ip = "10.100.0.2"
roles = ["storage_provider", "storage_client"]

[[nodes]]
name = "node3"
internal_ip = "192.168.1.12"
roles = ["overlay_participant"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn excludes_self_from_connect_list() {
        let topology = derive(&sample(), "node1").unwrap();
        assert!(!topology.connect_to.contains(&"node1".to_string()));
        assert_eq!(topology.connect_to, vec!["node2", "node3"]);
    }

    #[test]
    fn preserves_manifest_order() {
        let topology = derive(&sample(), "node2").unwrap();
        assert_eq!(topology.connect_to, vec!["node1", "node3"]);
        let names: Vec<&str> = topology.hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["node1", "node3"]);
    }

    #[test]
    fn derivation_is_deterministic() {
        let manifest = sample();
        let first = derive(&manifest, "node1").unwrap();
        let second = derive(&manifest, "node1").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn roles_come_from_self_descriptor() {
        let topology = derive(&sample(), "node1").unwrap();
        assert!(topology.roles.contains(&Role::StorageIntroducer));
        assert!(topology.roles.contains(&Role::StorageProvider));
        assert!(!topology.roles.contains(&Role::StorageClient));
    }

    #[test]
    fn host_descriptors_carry_addresses() {
        let topology = derive(&sample(), "node2").unwrap();
        let node1 = topology.hosts.iter().find(|h| h.name == "node1").unwrap();
        assert_eq!(node1.overlay_addr.to_string(), "10.100.0.1");
        assert_eq!(node1.public_addr.map(|a| a.to_string()), Some("1.2.3.4".to_string()));
        assert_eq!(node1.port, DEFAULT_OVERLAY_PORT);

        // node3 has no vpn_ip; overlay address resolved to internal at load
        let node3 = topology.hosts.iter().find(|h| h.name == "node3").unwrap();
        assert_eq!(node3.overlay_addr.to_string(), "192.168.1.12");
        assert!(node3.public_addr.is_none());
    }

    #[test]
    fn self_host_descriptor() {
        let topology = derive(&sample(), "node1").unwrap();
        assert_eq!(topology.self_host.name, "node1");
        assert_eq!(topology.self_host.overlay_addr.to_string(), "10.100.0.1");
    }

    #[test]
    fn unknown_node_rejected() {
        let err = derive(&sample(), "ghost").unwrap_err();
        assert_eq!(
            err,
            TopologyError::UnknownNode {
                name: "ghost".to_string()
            }
        );
    }
}
