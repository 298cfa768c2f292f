//! Stratus - ad-hoc MPI compute clusters on Multipass VMs
//!
//! Stratus provisions a fixed-size set of virtual nodes, wires them into a
//! trusted mesh (shared name resolution, mutual SSH trust, an NFS share
//! exported by the coordinator), publishes an ordered host list, and
//! dispatches MPI programs across the resulting cluster.
//!
//! # Architecture
//!
//! The bootstrap is a pipeline of phases with hard ordering barriers:
//! provisioning, topology discovery, name resolution, mesh trust, shared
//! storage, host-list publication. The topology is built once and treated as
//! read-only by everything downstream. All hypervisor interaction goes
//! through the [`vm::VmDriver`] collaborator trait, so the pipeline is unit
//! testable against a simulated driver. Job dispatch is a separate entry
//! point that only needs the mounted share and the published host list.
//!
//! # Modules
//!
//! - [`bootstrap`] - the phased bootstrap pipeline
//! - [`provision`] - node provisioning (coordinator + workers)
//! - [`topology`] - node naming, roles, and topology discovery
//! - [`hosts`] - per-node name resolution configuration
//! - [`trust`] - SSH mesh trust establishment
//! - [`storage`] - NFS export and per-worker mounts
//! - [`hostlist`] - ordered host list publication
//! - [`job`] - remote compile and distributed run
//! - [`vm`] - the VM collaborator trait and the Multipass driver
//! - [`remote`] - checked remote execution and idempotent upserts
//! - [`retry`] - bounded backoff for transient remote failures
//! - [`error`] - error types for the orchestrator

#![deny(missing_docs)]

pub mod bootstrap;
pub mod error;
pub mod hostlist;
pub mod hosts;
pub mod job;
pub mod provision;
pub mod remote;
pub mod retry;
pub mod storage;
pub mod topology;
pub mod trust;
pub mod vm;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Cluster layout constants
// =============================================================================
// Shared by the bootstrap phases and job dispatch; the hostfile path in
// particular must agree between publication and the mpiexec invocation.

/// Name of the distinguished node that exports the share and compiles jobs
pub const COORDINATOR: &str = "coordinator";

/// Shared directory exported by the coordinator and mounted on every worker
pub const SHARE_DIR: &str = "/home/ubuntu/cloud";

/// File name of the ordered host list on the share
pub const HOSTFILE_NAME: &str = "mpi_hosts";

/// Full path of the host list on the share
pub fn hostfile_path() -> String {
    format!("{}/{}", SHARE_DIR, HOSTFILE_NAME)
}
