//! Node provisioning
//!
//! Creates the fixed-size node set: one coordinator and S-1 workers, each a
//! distinct named instance launched with uniform sizing and the same
//! cloud-init bootstrap profile. The stage is fail-fast: a single failed
//! launch aborts the pipeline, because every later stage assumes all
//! requested nodes exist.

use std::time::Instant;

use futures::stream::{self, TryStreamExt};
use tracing::info;

use crate::bootstrap::BootstrapConfig;
use crate::error::Error;
use crate::topology::node_name;
use crate::vm::{LaunchSpec, VmDriver};
use crate::Result;

/// Launch all nodes of the requested cluster.
///
/// Launches run concurrently under the configured bound; names follow the
/// cluster naming policy (`coordinator`, `worker1`, ...).
pub async fn launch_cluster(driver: &dyn VmDriver, config: &BootstrapConfig) -> Result<()> {
    info!(
        size = config.size,
        cpus = config.cpus,
        memory_mb = config.memory_mb,
        "Launching cluster nodes"
    );

    stream::iter((0..config.size).map(Ok))
        .try_for_each_concurrent(config.concurrency, |index| async move {
            launch_node(driver, config, index).await
        })
        .await
}

async fn launch_node(
    driver: &dyn VmDriver,
    config: &BootstrapConfig,
    index: usize,
) -> Result<()> {
    let name = node_name(index);
    let spec = LaunchSpec {
        cpus: config.cpus,
        memory_mb: config.memory_mb,
        cloud_init: config.cloud_init.as_deref(),
    };

    let start = Instant::now();
    info!(node = %name, "Launching VM");

    driver.launch(&name, &spec).await.map_err(|e| match e {
        // The driver already attributed the failure to this node
        err @ Error::Provision { .. } => err,
        other => Error::provision(&name, other.to_string()),
    })?;

    info!(node = %name, elapsed = ?start.elapsed(), "VM launched");
    Ok(())
}
