//! Mesh trust establishment
//!
//! Gives every node an SSH identity and distributes the public halves so any
//! node can authenticate to any other without a password or an interactive
//! host-key prompt.
//!
//! The stage has a strict internal barrier: key generation completes on every
//! node before any distribution starts, because distribution reads every
//! node's public key. Distribution itself is fail-soft: a failed pair is
//! recorded and reported rather than aborting the mesh, since a mostly
//! trusted mesh is still useful and re-running bootstrap retries exactly the
//! missing pairs.

use std::collections::HashMap;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{info, warn};

use crate::error::Error;
use crate::remote::{append_line_if_absent, exec_checked};
use crate::topology::{Node, Topology};
use crate::vm::VmDriver;
use crate::Result;

/// Identity key path on every node
const KEY_PATH: &str = "/home/ubuntu/.ssh/id_ed25519";

/// Trusted-credential store on every node
const AUTHORIZED_KEYS_PATH: &str = "/home/ubuntu/.ssh/authorized_keys";

/// One pairwise trust operation that failed after retries
#[derive(Clone, Debug)]
pub struct PairFailure {
    /// The node whose key was being installed
    pub from: String,
    /// The node receiving the key
    pub to: String,
    /// Why the operation failed
    pub reason: String,
}

impl std::fmt::Display for PairFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}: {}", self.from, self.to, self.reason)
    }
}

/// Outcome of trust establishment
#[derive(Debug)]
pub struct TrustReport {
    /// Number of pairwise trust operations that succeeded
    pub established: usize,
    /// Pairs that failed after retries
    pub failures: Vec<PairFailure>,
}

impl TrustReport {
    /// Whether the full mesh was established
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Establish mesh trust across the topology.
///
/// Phase A generates (or reuses) a key pair on every node and collects the
/// public halves; it must complete everywhere before Phase B distributes any
/// key. Phase A failures are fatal; Phase B failures are collected into the
/// returned [`TrustReport`].
pub async fn establish(
    driver: &dyn VmDriver,
    topology: &Topology,
    concurrency: usize,
) -> Result<TrustReport> {
    info!(nodes = topology.len(), "Generating node identity keys");

    // Phase A: keygen everywhere. try_collect fails fast and, by completing
    // before Phase B is even constructed, forms the ordering barrier.
    let keys: HashMap<String, String> = stream::iter(topology.iter())
        .map(|node| async move {
            let key = ensure_keypair(driver, node).await?;
            Ok::<_, Error>((node.name.clone(), key))
        })
        .buffer_unordered(concurrency)
        .try_collect()
        .await?;

    info!("Distributing public keys across the mesh");

    // Phase B: every ordered pair (owner, target), owner != target
    let pairs = ordered_pairs(topology);
    let total = pairs.len();

    let failures: Vec<PairFailure> = stream::iter(pairs)
        .map(|(owner, target)| {
            let key = keys[&owner.name].clone();
            async move {
                match distribute_pair(driver, owner, target, &key).await {
                    Ok(()) => None,
                    Err(e) => Some(PairFailure {
                        from: owner.name.clone(),
                        to: target.name.clone(),
                        reason: e.to_string(),
                    }),
                }
            }
        })
        .buffer_unordered(concurrency)
        .filter_map(|outcome| async move { outcome })
        .collect()
        .await;

    for failure in &failures {
        warn!(pair = %failure, "Pairwise trust failed");
    }

    Ok(TrustReport {
        established: total - failures.len(),
        failures,
    })
}

/// Every ordered (owner, target) pair with owner != target, in topology order
fn ordered_pairs<'a>(topology: &'a Topology) -> Vec<(&'a Node, &'a Node)> {
    let mut pairs = Vec::new();
    for owner in topology.iter() {
        for target in topology.iter() {
            if owner.name != target.name {
                pairs.push((owner, target));
            }
        }
    }
    pairs
}

/// Generate the node's key pair unless one exists, and return its public half
async fn ensure_keypair(driver: &dyn VmDriver, node: &Node) -> Result<String> {
    let probe = driver
        .execute(&node.name, &format!("test -f {}", KEY_PATH))
        .await?;

    if probe.success() {
        info!(node = %node.name, "Identity key already exists, reusing");
    } else {
        exec_checked(
            driver,
            &node.name,
            &format!("ssh-keygen -q -t ed25519 -C {} -f {} -N ''", node.name, KEY_PATH),
        )
        .await?;
        info!(node = %node.name, "Identity key generated");
    }

    let output = exec_checked(driver, &node.name, &format!("cat {}.pub", KEY_PATH)).await?;
    Ok(output.stdout.trim().to_string())
}

/// Install `owner`'s key on `target` and pre-accept `target`'s host identity.
///
/// The no-op connection runs from the node whose key was just installed, so
/// the first real SSH between the pair never hits an interactive prompt.
async fn distribute_pair(
    driver: &dyn VmDriver,
    owner: &Node,
    target: &Node,
    owner_key: &str,
) -> Result<()> {
    append_line_if_absent(driver, &target.name, AUTHORIZED_KEYS_PATH, owner_key, false).await?;

    exec_checked(
        driver,
        &owner.name,
        &format!(
            "ssh -q -o StrictHostKeyChecking=accept-new {} true",
            target.name
        ),
    )
    .await?;

    Ok(())
}
