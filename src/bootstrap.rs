//! Cluster bootstrap pipeline
//!
//! Runs the provisioning phases in dependency order with hard barriers
//! between them:
//!
//! 1. Provision the node set (coordinator + workers)
//! 2. Discover the topology (running nodes, resolved addresses)
//! 3. Configure name resolution on every node
//! 4. Establish mesh trust (keygen everywhere, then distribute)
//! 5. Configure shared storage (server first, then workers)
//! 6. Publish the host list
//!
//! Bootstrap is not transactional: an abort stops issuing new remote calls
//! but never undoes completed steps. Re-running is the recovery mechanism,
//! which is why phases 3-5 are idempotent upserts.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{info, warn};

use crate::error::Error;
use crate::topology::Topology;
use crate::vm::VmDriver;
use crate::{hostlist, hosts, provision, storage, topology, trust};
use crate::Result;

/// Default bound for concurrent per-node and per-pair remote operations
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Configuration for a cluster bootstrap
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Total cluster size, coordinator included (S >= 1)
    pub size: usize,
    /// Virtual CPUs per node
    pub cpus: u32,
    /// Memory per node in megabytes
    pub memory_mb: u64,
    /// Cloud-init bootstrap profile applied uniformly to all nodes
    pub cloud_init: Option<PathBuf>,
    /// Bound for concurrent remote operations within a phase
    pub concurrency: usize,
}

/// The cluster bootstrap orchestrator
#[derive(Debug)]
pub struct Bootstrap {
    config: BootstrapConfig,
}

impl Bootstrap {
    /// Create a bootstrap for the given configuration.
    ///
    /// Rejects a zero-size cluster up front.
    pub fn new(config: BootstrapConfig) -> Result<Self> {
        if config.size < 1 {
            return Err(Error::InvalidConfig(
                "cluster size must be at least 1".to_string(),
            ));
        }
        Ok(Self { config })
    }

    /// Run the full pipeline against the given collaborator.
    ///
    /// Returns the discovered topology on success. A partial trust mesh does
    /// not stop the remaining phases, but surfaces as
    /// [`TrustIncomplete`](Error::TrustIncomplete) at the end so the overall
    /// command exits non-zero.
    pub async fn run(&self, driver: &dyn VmDriver) -> Result<Topology> {
        let start = Instant::now();
        let concurrency = self.config.concurrency;

        info!(size = self.config.size, "[Phase 1] Provisioning nodes");
        provision::launch_cluster(driver, &self.config).await?;

        info!("[Phase 2] Discovering topology");
        let topology = topology::discover(driver, self.config.size).await?;

        info!("[Phase 3] Configuring name resolution");
        hosts::configure(driver, &topology, concurrency).await?;

        info!("[Phase 4] Establishing mesh trust");
        let report = trust::establish(driver, &topology, concurrency).await?;
        if !report.is_complete() {
            warn!(
                failed = report.failures.len(),
                established = report.established,
                "Trust mesh is partial, continuing with remaining phases"
            );
        }

        info!("[Phase 5] Configuring shared storage");
        storage::configure(driver, &topology, concurrency).await?;

        info!("[Phase 6] Publishing host list");
        hostlist::publish(driver, &topology).await?;

        info!(elapsed = ?start.elapsed(), "Bootstrap pipeline finished");

        if !report.is_complete() {
            return Err(Error::TrustIncomplete(report.failures));
        }
        Ok(topology)
    }
}
