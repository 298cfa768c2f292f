//! VM collaborator abstraction layer
//!
//! This module provides a trait-based abstraction over the hypervisor frontend
//! that creates and drives the cluster's virtual machines. The orchestrator
//! only ever needs four capabilities: launch a named instance, list instances,
//! execute a command on an instance, and copy a local file onto an instance.
//! Everything else (image contents, hypervisor selection) is out of scope.
//!
//! # Implementations
//!
//! - [`MultipassDriver`] - drives Canonical Multipass via its CLI
//!
//! Tests substitute a simulated driver implementing [`VmDriver`].

mod multipass;

pub use multipass::MultipassDriver;

use std::path::Path;

use async_trait::async_trait;

use crate::Result;

/// Lifecycle state of a VM instance as reported by the collaborator
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VmState {
    /// The instance is up and reachable
    Running,
    /// The instance exists but is stopped
    Stopped,
    /// Any other state the collaborator reports (Starting, Suspended, ...)
    Other(String),
}

impl VmState {
    /// Whether the instance is in the Running state
    pub fn is_running(&self) -> bool {
        matches!(self, VmState::Running)
    }
}

impl From<&str> for VmState {
    fn from(s: &str) -> Self {
        match s {
            "Running" => VmState::Running,
            "Stopped" => VmState::Stopped,
            other => VmState::Other(other.to_string()),
        }
    }
}

/// A VM instance as reported by the collaborator's list capability
#[derive(Clone, Debug)]
pub struct Instance {
    /// Instance name
    pub name: String,
    /// Lifecycle state
    pub state: VmState,
    /// IPv4 addresses, most specific first; empty until the instance is up
    pub addresses: Vec<String>,
}

/// Captured result of a remote command
#[derive(Clone, Debug)]
pub struct ExecOutput {
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Exit status of the remote command
    pub status: i32,
}

impl ExecOutput {
    /// An output representing success with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            status: 0,
        }
    }

    /// Whether the remote command exited zero
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Resource sizing and bootstrap profile for a VM launch
#[derive(Clone, Debug)]
pub struct LaunchSpec<'a> {
    /// Number of virtual CPUs
    pub cpus: u32,
    /// Memory in megabytes
    pub memory_mb: u64,
    /// Cloud-init bootstrap profile applied uniformly to all nodes
    pub cloud_init: Option<&'a Path>,
}

/// The external VM collaborator surface.
///
/// All operations are blocking remote invocations from the orchestrator's
/// point of view; implementations are expected to enforce their own
/// per-call timeouts. Errors carry the collaborator's diagnostic output,
/// never a bare status code.
#[async_trait]
pub trait VmDriver: Send + Sync {
    /// Create a named VM instance with the given sizing and bootstrap profile
    async fn launch(&self, name: &str, spec: &LaunchSpec<'_>) -> Result<()>;

    /// List all instances known to the collaborator
    async fn list_instances(&self) -> Result<Vec<Instance>>;

    /// Execute a shell command on the named instance and capture its output.
    ///
    /// A non-zero remote exit status is not an error at this layer; callers
    /// decide whether non-zero is meaningful (`test -f`) or fatal.
    async fn execute(&self, node: &str, command: &str) -> Result<ExecOutput>;

    /// Copy a local file to the given path on the named instance
    async fn transfer(&self, local: &Path, node: &str, remote: &str) -> Result<()>;
}
