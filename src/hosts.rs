//! Name resolution configuration
//!
//! Pushes the topology into each node's `/etc/hosts` so every node can
//! address every other node by name. This is an O(n^2) fan-out of remote
//! appends; each entry is upserted (check-before-append), so re-running
//! bootstrap against a configured cluster adds nothing.

use futures::stream::{self, TryStreamExt};
use tracing::{debug, info};

use crate::remote::append_line_if_absent;
use crate::topology::{Node, Topology};
use crate::vm::VmDriver;
use crate::Result;

/// Path of the local name resolution table on every node
const HOSTS_PATH: &str = "/etc/hosts";

/// The `/etc/hosts` entry one node gets for another
fn hosts_entry(other: &Node) -> String {
    format!("{} {}", other.address, other.name)
}

/// Configure name resolution on every node of the topology.
///
/// Per-node work runs concurrently under the given bound; failures here are
/// fatal, since an unresolved peer name breaks the mesh silently later.
pub async fn configure(
    driver: &dyn VmDriver,
    topology: &Topology,
    concurrency: usize,
) -> Result<()> {
    info!(nodes = topology.len(), "Configuring name resolution");

    stream::iter(topology.iter().map(Ok))
        .try_for_each_concurrent(concurrency, |node| async move {
            configure_node(driver, topology, node).await
        })
        .await
}

/// Upsert entries for every other node into one node's resolution table
async fn configure_node(driver: &dyn VmDriver, topology: &Topology, node: &Node) -> Result<()> {
    for other in topology.iter().filter(|n| n.name != node.name) {
        let entry = hosts_entry(other);
        let appended = append_line_if_absent(driver, &node.name, HOSTS_PATH, &entry, true).await?;
        if !appended {
            debug!(node = %node.name, entry = %entry, "Host entry already present");
        }
    }
    info!(node = %node.name, "Name resolution configured");
    Ok(())
}
