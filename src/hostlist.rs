//! Host list publication
//!
//! Writes the ordered node-name file the distributed-job runtime consumes as
//! its hostfile. Unlike the mesh tables, this is a derived artifact: the full
//! topology is known atomically at write time, so the file is overwritten
//! outright rather than upserted. Order is rank order: coordinator first.

use tracing::info;

use crate::remote::exec_checked;
use crate::topology::Topology;
use crate::vm::VmDriver;
use crate::Result;

/// Render the host list: one node name per line, coordinator first
fn render(topology: &Topology) -> String {
    let mut content = String::new();
    for node in topology.iter() {
        content.push_str(&node.name);
        content.push('\n');
    }
    content
}

/// Overwrite the host list on the coordinator's share
pub async fn publish(driver: &dyn VmDriver, topology: &Topology) -> Result<()> {
    let path = crate::hostfile_path();
    let content = render(topology);

    info!(path = %path, nodes = topology.len(), "Publishing host list");
    exec_checked(
        driver,
        &topology.coordinator().name,
        &format!("printf '%s' '{}' > {}", content, path),
    )
    .await?;
    Ok(())
}
