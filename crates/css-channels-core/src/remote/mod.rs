//! Remote synchronization
//!
//! The remote host is reached through a [`RemoteTransport`]. The engine on
//! top of it knows about channels: it bootstraps the remote root on the
//! first `latest` deploy and fans out deletions without letting one failed
//! folder cancel the others.

mod mounted;
mod ssh;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::channel::Channel;
use crate::error::{ReleaseError, Result};
use crate::inventory::{ArtifactLocation, Scope};

pub use mounted::MountedTransport;
pub use ssh::{parse_stat_listing, shell_quote, SshTransport};

/// Upper bound on deletions in flight at once
const MAX_PARALLEL_DELETES: usize = 8;

/// Channel whose first deploy creates the remote root
const BOOTSTRAP_CHANNEL: &str = "latest";

/// File-sync capability against one remote root
///
/// Paths passed to `upload` and `remove` are relative to the root and name a
/// single top-level entry.
pub trait RemoteTransport: Send + Sync {
    /// Human readable target, used in errors and logs
    fn describe(&self) -> String;

    fn root_exists(&self) -> Result<bool>;

    fn create_root(&self) -> Result<()>;

    /// Top-level entries with best-effort creation times
    fn list(&self) -> Result<Vec<ArtifactLocation>>;

    /// Replace `remote_path` with the contents of `local_dir`
    fn upload(&self, local_dir: &Path, remote_path: &str) -> Result<()>;

    /// Remove `remote_path`; removing an absent entry succeeds
    fn remove(&self, remote_path: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResult {
    pub channel_id: String,
    pub remote_path: String,
    /// Whether the remote root had to be created first
    pub bootstrapped: bool,
}

/// Per-location outcome of a remote deletion batch
#[derive(Debug, Clone, Default)]
pub struct DeleteReport {
    pub succeeded: BTreeSet<ArtifactLocation>,
    pub failed: BTreeMap<ArtifactLocation, String>,
}

impl DeleteReport {
    /// Some deletions failed; `failed` lists exactly which
    pub fn is_partial_failure(&self) -> bool {
        !self.failed.is_empty()
    }
}

pub struct RemoteSyncEngine {
    transport: Box<dyn RemoteTransport>,
}

impl RemoteSyncEngine {
    pub fn new(transport: Box<dyn RemoteTransport>) -> Self {
        Self { transport }
    }

    pub fn describe(&self) -> String {
        self.transport.describe()
    }

    /// Push a built channel to its remote path
    pub fn push(
        &self,
        channel: &Channel,
        artifact_path: &Path,
        now: DateTime<Utc>,
    ) -> Result<PushResult> {
        if !artifact_path.is_dir() {
            return Err(ReleaseError::NotFound {
                name: artifact_path.display().to_string(),
            });
        }

        let mut bootstrapped = false;
        if !self.transport.root_exists()? {
            if channel.id != BOOTSTRAP_CHANNEL {
                return Err(ReleaseError::transport(
                    self.transport.describe(),
                    format!(
                        "remote root does not exist; deploy '{}' first to create it",
                        BOOTSTRAP_CHANNEL
                    ),
                ));
            }
            tracing::info!(target_root = %self.transport.describe(), "bootstrapping remote root");
            self.transport.create_root()?;
            bootstrapped = true;
        }

        let remote_path = channel.resolve_remote(now);
        self.transport.upload(artifact_path, &remote_path)?;
        tracing::info!(channel = channel.id, %remote_path, "pushed channel");

        Ok(PushResult {
            channel_id: channel.id.to_string(),
            remote_path,
            bootstrapped,
        })
    }

    /// Enumerate the remote root, sorted by name
    pub fn list_remote(&self) -> Result<Vec<ArtifactLocation>> {
        let mut locations = self.transport.list()?;
        locations.sort();
        tracing::debug!(count = locations.len(), "listed remote inventory");
        Ok(locations)
    }

    /// Delete a set of remote locations
    ///
    /// Deletions run concurrently in bounded batches. Every location gets an
    /// outcome; a failure never cancels its siblings.
    pub fn delete(&self, locations: &BTreeSet<ArtifactLocation>) -> DeleteReport {
        let mut report = DeleteReport::default();
        let targets: Vec<&ArtifactLocation> = locations.iter().collect();

        for batch in targets.chunks(MAX_PARALLEL_DELETES) {
            let outcomes: Vec<Result<()>> = std::thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|location| scope.spawn(move || self.delete_one(location)))
                    .collect();

                handles
                    .into_iter()
                    .map(|handle| {
                        handle.join().unwrap_or_else(|_| {
                            Err(ReleaseError::transport(
                                self.transport.describe(),
                                "deletion worker panicked",
                            ))
                        })
                    })
                    .collect()
            });

            for (location, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(()) => {
                        tracing::info!(name = %location.name, "deleted remote artifact");
                        report.succeeded.insert((*location).clone());
                    }
                    Err(e) => {
                        tracing::warn!(name = %location.name, error = %e, "remote delete failed");
                        report.failed.insert((*location).clone(), e.to_string());
                    }
                }
            }
        }

        report
    }

    fn delete_one(&self, location: &ArtifactLocation) -> Result<()> {
        if location.scope != Scope::Remote {
            return Err(ReleaseError::InvalidArgument {
                message: format!("not a remote artifact: {}", location),
            });
        }
        self.transport.remove(&location.name)
    }
}

/// Reject anything that is not a single top-level entry name
pub(crate) fn validate_entry_name(target: &str, name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\');
    if invalid {
        return Err(ReleaseError::transport(
            target,
            format!("refusing to touch non top-level path: '{}'", name),
        ));
    }
    Ok(())
}
