//! Shared storage configuration
//!
//! The coordinator exports the share directory over NFS; every worker mounts
//! it at the same path and persists the mount in `/etc/fstab`. The server
//! side must be live before any worker mounts, so this stage is internally
//! sequential: coordinator first, then workers (concurrent among themselves).
//! All table mutations are upserts and the mount is guarded, so re-running is
//! safe.

use futures::stream::{self, TryStreamExt};
use tracing::info;

use crate::remote::{append_line_if_absent, exec_checked};
use crate::topology::{Node, Topology};
use crate::vm::VmDriver;
use crate::Result;

/// NFS export table on the coordinator
const EXPORTS_PATH: &str = "/etc/exports";

/// Persistent mount table on every worker
const FSTAB_PATH: &str = "/etc/fstab";

/// The export table entry for the share directory
fn export_entry(share_dir: &str) -> String {
    format!("{} *(rw,sync,no_root_squash,no_subtree_check)", share_dir)
}

/// The persistent mount table entry for a worker
fn fstab_entry(coordinator: &str, share_dir: &str) -> String {
    format!("{}:{} {} nfs defaults 0 0", coordinator, share_dir, share_dir)
}

/// The guarded mount command for a worker
fn mount_command(coordinator: &str, share_dir: &str) -> String {
    format!(
        "mountpoint -q {} || sudo mount -t nfs {}:{} {}",
        share_dir, coordinator, share_dir, share_dir
    )
}

/// Configure the NFS share across the topology.
pub async fn configure(
    driver: &dyn VmDriver,
    topology: &Topology,
    concurrency: usize,
) -> Result<()> {
    configure_server(driver, topology.coordinator()).await?;

    stream::iter(topology.workers().map(Ok))
        .try_for_each_concurrent(concurrency, |worker| async move {
            configure_worker(driver, topology.coordinator(), worker).await
        })
        .await
}

/// Create, export and serve the share directory on the coordinator
async fn configure_server(driver: &dyn VmDriver, coordinator: &Node) -> Result<()> {
    let share_dir = crate::SHARE_DIR;
    info!(node = %coordinator.name, dir = %share_dir, "Configuring NFS server");

    exec_checked(driver, &coordinator.name, &format!("mkdir -p {}", share_dir)).await?;
    append_line_if_absent(
        driver,
        &coordinator.name,
        EXPORTS_PATH,
        &export_entry(share_dir),
        true,
    )
    .await?;
    exec_checked(driver, &coordinator.name, "sudo exportfs -a").await?;
    exec_checked(
        driver,
        &coordinator.name,
        "sudo service nfs-kernel-server restart",
    )
    .await?;

    info!(node = %coordinator.name, "NFS export live");
    Ok(())
}

/// Mount the coordinator's export on a worker and persist it
async fn configure_worker(
    driver: &dyn VmDriver,
    coordinator: &Node,
    worker: &Node,
) -> Result<()> {
    let share_dir = crate::SHARE_DIR;
    info!(node = %worker.name, "Mounting shared storage");

    exec_checked(driver, &worker.name, &format!("mkdir -p {}", share_dir)).await?;
    exec_checked(
        driver,
        &worker.name,
        &mount_command(&coordinator.name, share_dir),
    )
    .await?;
    append_line_if_absent(
        driver,
        &worker.name,
        FSTAB_PATH,
        &fstab_entry(&coordinator.name, share_dir),
        true,
    )
    .await?;

    info!(node = %worker.name, "Shared storage mounted and persisted");
    Ok(())
}
