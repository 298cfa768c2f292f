//! Cluster topology: node naming, roles, and discovery
//!
//! The topology is built exactly once, immediately after provisioning, and is
//! immutable from then on. Every later stage (name resolution, mesh trust,
//! host-list publication) borrows it; no stage mutates shared state.

use tracing::info;

use crate::error::Error;
use crate::vm::VmDriver;
use crate::Result;

/// Role of a node within the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// The distinguished node that exports the share and compiles jobs
    Coordinator,
    /// A node that mounts the share and participates in execution
    Worker,
}

/// A provisioned, running cluster node
#[derive(Clone, Debug)]
pub struct Node {
    /// Unique node name (`coordinator`, `worker1`, ...)
    pub name: String,
    /// Role within the cluster
    pub role: Role,
    /// Resolved IPv4 address
    pub address: String,
}

/// Ordered set of running nodes: coordinator first, then workers by index.
///
/// Invariants: exactly one coordinator, all names unique, and the order here
/// determines process-rank assignment in the published host list.
#[derive(Clone, Debug)]
pub struct Topology {
    nodes: Vec<Node>,
}

/// Name for the node at the given cluster index
///
/// Index 0 is the coordinator; index i is `worker{i}`.
pub fn node_name(index: usize) -> String {
    if index == 0 {
        crate::COORDINATOR.to_string()
    } else {
        format!("worker{}", index)
    }
}

impl Topology {
    /// The coordinator node
    pub fn coordinator(&self) -> &Node {
        // Construction guarantees a non-empty, coordinator-first node list
        &self.nodes[0]
    }

    /// The worker nodes, in ascending index order
    pub fn workers(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().skip(1)
    }

    /// All nodes, coordinator first
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the topology is empty (never true for a discovered topology)
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node names in topology order
    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }
}

/// Query the collaborator and build the topology for a cluster of `size` nodes.
///
/// Only Running instances count. Fails with
/// [`TopologyIncomplete`](Error::TopologyIncomplete) unless every expected
/// node name is present and running with at least one address; a partial
/// topology would silently corrupt the mesh and the host list.
pub async fn discover(driver: &dyn VmDriver, size: usize) -> Result<Topology> {
    let instances = driver.list_instances().await?;

    let running: Vec<_> = instances
        .into_iter()
        .filter(|i| i.state.is_running() && !i.addresses.is_empty())
        .collect();

    let mut nodes = Vec::with_capacity(size);
    for index in 0..size {
        let name = node_name(index);
        let Some(instance) = running.iter().find(|i| i.name == name) else {
            return Err(Error::TopologyIncomplete {
                expected: size,
                running: running.iter().map(|i| i.name.clone()).collect(),
            });
        };

        nodes.push(Node {
            name,
            role: if index == 0 {
                Role::Coordinator
            } else {
                Role::Worker
            },
            address: instance.addresses[0].clone(),
        });
    }

    let topology = Topology { nodes };
    for node in topology.iter() {
        info!(node = %node.name, address = %node.address, "Discovered node");
    }
    Ok(topology)
}
