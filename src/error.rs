//! Error types for the stratus orchestrator

use std::path::PathBuf;

use thiserror::Error;

use crate::trust::PairFailure;

/// Main error type for stratus operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A VM launch failed. Fatal: later stages assume all requested nodes exist.
    #[error("failed to provision node '{node}': {message}")]
    Provision {
        /// The node whose launch failed
        node: String,
        /// What the collaborator reported
        message: String,
    },

    /// Discovery found fewer running nodes than were requested. Fatal:
    /// proceeding with a partial topology would corrupt every later stage.
    #[error("incomplete topology: expected {expected} running nodes, found [{}]", running.join(", "))]
    TopologyIncomplete {
        /// How many nodes the bootstrap requested
        expected: usize,
        /// Names of the nodes actually observed running
        running: Vec<String>,
    },

    /// A remote command failed after retries
    #[error("remote command failed on '{node}' (exit {status}): {command}: {stderr}")]
    RemoteExec {
        /// The node the command ran on
        node: String,
        /// The command that failed
        command: String,
        /// Remote exit status
        status: i32,
        /// Captured stderr
        stderr: String,
    },

    /// A remote command did not complete within the driver's timeout
    #[error("remote command timed out on '{node}': {command}")]
    Timeout {
        /// The node the command ran on
        node: String,
        /// The command that timed out
        command: String,
    },

    /// Some pairwise trust operations failed. The rest of the mesh is
    /// established; re-running bootstrap retries only the missing pairs.
    #[error("mesh trust incomplete: {} node pair(s) failed", .0.len())]
    TrustIncomplete(Vec<PairFailure>),

    /// The submitted source file does not exist locally
    #[error("source file not found: {0}")]
    SourceNotFound(PathBuf),

    /// Remote compilation returned non-zero
    #[error("compilation failed:\n{diagnostics}")]
    Compile {
        /// Diagnostic output from the toolchain
        diagnostics: String,
    },

    /// The requested artifact is not present on the shared storage
    #[error("compiled artifact '{0}' not found on the coordinator's share")]
    ArtifactNotFound(String),

    /// A required host tool is missing
    #[error("prerequisite not found: {tool} - {hint}")]
    PrerequisiteNotFound {
        /// The tool that was not found
        tool: String,
        /// Hint for how to install it
        hint: String,
    },

    /// Invalid bootstrap configuration
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The VM collaborator could not be invoked or returned unparseable output
    #[error("driver error: {0}")]
    Driver(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The operator aborted the bootstrap. Completed steps are left in place;
    /// re-running bootstrap resumes safely.
    #[error("aborted by operator")]
    Aborted,
}

impl Error {
    /// Create a provision error for the given node
    pub fn provision(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provision {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Create a driver error with the given message
    pub fn driver(msg: impl Into<String>) -> Self {
        Self::Driver(msg.into())
    }
}
