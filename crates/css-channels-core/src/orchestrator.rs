//! Command facade
//!
//! Composes the registry, build dispatcher, local manager and remote engine
//! into the named operations exposed by the CLI.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::build::{BuildDispatcher, BuildReport, BuildResult, CommandCompiler};
use crate::channel::{Channel, ChannelRegistry, Variant, DEFAULT_DEPLOY_CHANNEL};
use crate::config::{Config, TransportKind};
use crate::error::{ReleaseError, Result};
use crate::inventory::ArtifactLocation;
use crate::local::{ApplyResult, LocalArtifactManager};
use crate::remote::{
    DeleteReport, MountedTransport, PushResult, RemoteSyncEngine, RemoteTransport, SshTransport,
};
use crate::retention::{Decision, RetentionPolicy};

/// Local cleanup flavours
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanMode {
    /// Delete everything, then rebuild
    Rebuild,
    /// Delete everything
    All,
    /// Delete everything except stable and latest
    Safe,
    /// Delete expired previews
    Preview,
    /// Delete one folder by exact name
    Folder(String),
}

/// Remote wipe flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WipeMode {
    /// Delete latest and previews
    #[default]
    Default,
    /// Delete everything
    All,
    /// Delete previews only
    Safe,
    /// Delete everything except stable
    KeepStable,
}

impl WipeMode {
    pub fn policy(&self) -> RetentionPolicy {
        match self {
            Self::Default => RetentionPolicy::RemoteWipe,
            Self::All => RetentionPolicy::RemoteWipeAll,
            Self::Safe => RetentionPolicy::RemoteWipeSafe,
            Self::KeepStable => RetentionPolicy::RemoteWipeKeepStable,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeployReport {
    pub build: BuildResult,
    pub push: PushResult,
}

#[derive(Debug, Clone)]
pub struct CleanReport {
    pub policy: RetentionPolicy,
    pub decision: Decision,
    pub applied: ApplyResult,
    /// The named folder did not exist; nothing was done
    pub target_missing: bool,
}

#[derive(Debug, Clone)]
pub struct RemoteReport {
    pub policy: RetentionPolicy,
    pub decision: Decision,
    pub deleted: DeleteReport,
}

/// Both halves of a nuke, reported independently
#[derive(Debug)]
pub struct NukeReport {
    pub local: Result<ApplyResult>,
    pub remote: Result<DeleteReport>,
}

impl NukeReport {
    pub fn is_complete(&self) -> bool {
        let local_ok = self.local.as_ref().is_ok_and(|r| !r.has_failures());
        let remote_ok = self
            .remote
            .as_ref()
            .is_ok_and(|r| !r.is_partial_failure());
        local_ok && remote_ok
    }
}

/// One inventory entry with the channel it belongs to
#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub location: ArtifactLocation,
    pub channel: Option<&'static str>,
    pub protected: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum RemoteStatus {
    NotConfigured,
    Unavailable { message: String },
    Listed { target: String, entries: Vec<StatusEntry> },
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub local: Vec<StatusEntry>,
    pub remote: RemoteStatus,
}

pub struct Orchestrator {
    registry: ChannelRegistry,
    dispatcher: BuildDispatcher,
    local: LocalArtifactManager,
    remote: Option<RemoteSyncEngine>,
    preview_max_age_days: i64,
    clock: fn() -> DateTime<Utc>,
}

impl Orchestrator {
    pub fn new(
        registry: ChannelRegistry,
        dispatcher: BuildDispatcher,
        local: LocalArtifactManager,
        remote: Option<RemoteSyncEngine>,
        preview_max_age_days: i64,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            local,
            remote,
            preview_max_age_days,
            clock: Utc::now,
        }
    }

    /// Wire everything from a config; relative paths are anchored at `base_dir`
    pub fn from_config(config: &Config, base_dir: &Path) -> Result<Self> {
        let dist_dir = config.dist_dir(base_dir);
        let compiler = CommandCompiler::new(&config.build.command, config.working_dir(base_dir))?;
        let dispatcher = BuildDispatcher::new(Box::new(compiler), dist_dir.clone());
        let local = LocalArtifactManager::new(dist_dir, config.build.rebuild);

        let remote = if config.remote.is_configured() {
            let transport: Box<dyn RemoteTransport> = match config.remote.kind {
                TransportKind::Mounted => {
                    Box::new(MountedTransport::new(base_dir.join(&config.remote.root)))
                }
                TransportKind::Ssh => Box::new(SshTransport::new(
                    config.remote.host.clone(),
                    config.remote.root.clone(),
                )),
            };
            Some(RemoteSyncEngine::new(transport))
        } else {
            None
        };

        Ok(Self::new(
            ChannelRegistry::builtin(),
            dispatcher,
            local,
            remote,
            config.retention.preview_max_age_days,
        ))
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn dist_dir(&self) -> &Path {
        self.local.dist_dir()
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn remote(&self) -> Result<&RemoteSyncEngine> {
        self.remote.as_ref().ok_or_else(|| {
            ReleaseError::transport(
                "remote",
                "no remote configured (set remote.root in css-channels.toml)",
            )
        })
    }

    fn preview_gc(&self) -> Result<RetentionPolicy> {
        RetentionPolicy::preview_gc_days(self.preview_max_age_days)
    }

    // ------------------------------------------------------------------
    // Build & deploy
    // ------------------------------------------------------------------

    /// Build one channel
    pub fn build(&self, channel_id: &str) -> Result<BuildResult> {
        let channel = self.registry.resolve(channel_id)?;
        Ok(self.dispatcher.build(channel, self.now()))
    }

    /// Build every channel in registry order; failures never stop the batch
    pub fn build_full(&self) -> BuildReport {
        self.dispatcher.build_all(self.registry.all(), self.now())
    }

    /// Resolve the channel a deploy targets
    pub fn deploy_channel(&self, channel_id: Option<&str>, variant: Variant) -> Result<&Channel> {
        match (channel_id, variant) {
            (None, Variant::Default) => self.registry.resolve(DEFAULT_DEPLOY_CHANNEL),
            (None, variant) => self.registry.by_variant(variant),
            (Some(id), Variant::Default) => self.registry.resolve(id),
            (Some(id), variant) => {
                let channel = self.registry.resolve(id)?;
                if channel.variant != variant {
                    return Err(ReleaseError::InvalidArgument {
                        message: format!(
                            "channel '{}' is built with the {} variant, not {}",
                            id, channel.variant, variant
                        ),
                    });
                }
                Ok(channel)
            }
        }
    }

    /// Build a channel, then push it
    pub fn deploy(&self, channel_id: Option<&str>, variant: Variant) -> Result<DeployReport> {
        let channel = self.deploy_channel(channel_id, variant)?;
        let remote = self.remote()?;
        let now = self.now();

        let build = self.dispatcher.build(channel, now);
        if let Err(message) = &build.outcome {
            return Err(ReleaseError::BuildFailed {
                channel: channel.id.to_string(),
                message: message.clone(),
            });
        }

        let push = remote.push(channel, &build.out_dir, now)?;
        Ok(DeployReport { build, push })
    }

    // ------------------------------------------------------------------
    // Local cleanup
    // ------------------------------------------------------------------

    fn clean_policy(&self, mode: &CleanMode) -> Result<RetentionPolicy> {
        Ok(match mode {
            CleanMode::Rebuild => RetentionPolicy::RebuildClean,
            CleanMode::All => RetentionPolicy::NukeLocal,
            CleanMode::Safe => RetentionPolicy::SafeClean,
            CleanMode::Preview => self.preview_gc()?,
            CleanMode::Folder(name) => RetentionPolicy::CustomClean(name.clone()),
        })
    }

    /// Compute what a clean would do, without touching anything
    pub fn plan_clean(&self, mode: &CleanMode) -> Result<Decision> {
        let inventory = self.local.scan()?;
        self.clean_policy(mode)?.evaluate(&inventory, self.now())
    }

    pub fn clean(&self, mode: CleanMode) -> Result<CleanReport> {
        let policy = self.clean_policy(&mode)?;
        let inventory = self.local.scan()?;
        let now = self.now();

        let decision = match policy.evaluate(&inventory, now) {
            Ok(decision) => decision,
            Err(ReleaseError::NotFound { name }) => {
                tracing::info!(folder = %name, "nothing to clean");
                return Ok(CleanReport {
                    policy,
                    decision: Decision {
                        to_preserve: inventory.into_iter().collect(),
                        ..Decision::default()
                    },
                    applied: ApplyResult::default(),
                    target_missing: true,
                });
            }
            Err(e) => return Err(e),
        };

        let applied = self
            .local
            .apply(&decision, &self.dispatcher, &self.registry, now);
        Ok(CleanReport {
            policy,
            decision,
            applied,
            target_missing: false,
        })
    }

    // ------------------------------------------------------------------
    // Remote cleanup
    // ------------------------------------------------------------------

    fn plan_remote(&self, policy: &RetentionPolicy) -> Result<Decision> {
        let inventory = self.remote()?.list_remote()?;
        policy.evaluate(&inventory, self.now())
    }

    /// Delete exactly the entries of an already computed decision
    ///
    /// The remote is not listed again, so entries that appeared after the
    /// plan was made are left alone.
    pub fn apply_remote_decision(
        &self,
        policy: RetentionPolicy,
        decision: Decision,
    ) -> Result<RemoteReport> {
        let deleted = self.remote()?.delete(&decision.to_delete);
        Ok(RemoteReport {
            policy,
            decision,
            deleted,
        })
    }

    fn apply_remote(&self, policy: RetentionPolicy) -> Result<RemoteReport> {
        let decision = self.plan_remote(&policy)?;
        self.apply_remote_decision(policy, decision)
    }

    pub fn plan_remote_cleanup(&self) -> Result<Decision> {
        self.plan_remote(&self.preview_gc()?)
    }

    /// Delete expired remote previews
    pub fn remote_cleanup(&self) -> Result<RemoteReport> {
        self.apply_remote(self.preview_gc()?)
    }

    pub fn plan_remote_wipe(&self, mode: WipeMode) -> Result<Decision> {
        self.plan_remote(&mode.policy())
    }

    pub fn remote_wipe(&self, mode: WipeMode) -> Result<RemoteReport> {
        self.apply_remote(mode.policy())
    }

    // ------------------------------------------------------------------
    // Nuke & status
    // ------------------------------------------------------------------

    /// Wipe local dist and the whole remote root
    ///
    /// Best effort: the remote half runs even when the local half fails.
    /// Without a configured remote only the local half runs.
    pub fn nuke(&self) -> NukeReport {
        let now = self.now();

        let local = self.local.scan().and_then(|inventory| {
            let decision = RetentionPolicy::NukeLocal.evaluate(&inventory, now)?;
            Ok(self
                .local
                .apply(&decision, &self.dispatcher, &self.registry, now))
        });
        if let Err(e) = &local {
            tracing::warn!(error = %e, "local nuke failed");
        }

        let remote = match &self.remote {
            None => {
                tracing::info!("no remote configured; skipping remote wipe");
                Ok(DeleteReport::default())
            }
            Some(engine) => engine.list_remote().and_then(|inventory| {
                let decision = RetentionPolicy::RemoteWipeAll.evaluate(&inventory, now)?;
                Ok(engine.delete(&decision.to_delete))
            }),
        };
        if let Err(e) = &remote {
            tracing::warn!(error = %e, "remote wipe failed");
        }

        NukeReport { local, remote }
    }

    fn annotate(&self, locations: Vec<ArtifactLocation>) -> Vec<StatusEntry> {
        locations
            .into_iter()
            .map(|location| {
                let channel = self.registry.channel_for_folder(&location.name);
                StatusEntry {
                    protected: channel.is_some_and(|c| c.protected_by_default),
                    channel: channel.map(|c| c.id),
                    location,
                }
            })
            .collect()
    }

    /// Current local and remote inventories
    pub fn status(&self) -> Result<StatusReport> {
        let local = self.annotate(self.local.scan()?);

        let remote = match &self.remote {
            None => RemoteStatus::NotConfigured,
            Some(engine) => match engine.list_remote() {
                Ok(locations) => RemoteStatus::Listed {
                    target: engine.describe(),
                    entries: self.annotate(locations),
                },
                Err(e) => RemoteStatus::Unavailable {
                    message: e.to_string(),
                },
            },
        };

        Ok(StatusReport { local, remote })
    }
}
