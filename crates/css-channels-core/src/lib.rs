//! Release-channel orchestration for CSS builds
//!
//! Channels are built locally into a dist directory, pushed to a remote
//! root, and pruned on both sides by retention policies.

pub mod build;
pub mod channel;
pub mod config;
pub mod error;
pub mod inventory;
pub mod local;
pub mod orchestrator;
pub mod remote;
pub mod retention;

pub use build::{AssetCompiler, BuildDispatcher, BuildReport, BuildResult, CommandCompiler};
pub use channel::{Channel, ChannelRegistry, Variant, DEFAULT_DEPLOY_CHANNEL};
pub use config::{Config, RebuildScope, TransportKind, CONFIG_FILE};
pub use error::{ReleaseError, Result};
pub use inventory::{ArtifactLocation, CreatedAt, Scope};
pub use local::{ApplyResult, LocalArtifactManager, RebuildOutcome};
pub use orchestrator::{
    CleanMode, CleanReport, DeployReport, NukeReport, Orchestrator, RemoteReport, RemoteStatus,
    StatusEntry, StatusReport, WipeMode,
};
pub use remote::{
    DeleteReport, MountedTransport, PushResult, RemoteSyncEngine, RemoteTransport, SshTransport,
};
pub use retention::{Decision, RetentionPolicy};
