//! Build dispatch
//!
//! The asset compiler is a black box behind [`AssetCompiler`]. The dispatcher
//! invokes it once per channel and records each outcome independently, so a
//! broken channel never blocks the rest of a batch.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::channel::Channel;
use crate::error::{ReleaseError, Result};

/// Environment variable carrying the channel id
pub const ENV_CHANNEL: &str = "CSS_CHANNEL";
/// Environment variable carrying the variant tag (empty for the default)
pub const ENV_VARIANT: &str = "CSS_VARIANT";
/// Environment variable carrying the output directory
pub const ENV_OUT_DIR: &str = "CSS_OUT_DIR";

/// Compiles one channel into an output directory
pub trait AssetCompiler {
    fn compile(&self, channel: &Channel, out_dir: &Path) -> Result<()>;
}

/// Runs an external build command with the channel passed through the environment
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
}

impl CommandCompiler {
    pub fn new(command: &[String], working_dir: impl Into<PathBuf>) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| ReleaseError::InvalidArgument {
                message: "build.command is empty".to_string(),
            })?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            working_dir: working_dir.into(),
        })
    }
}

impl AssetCompiler for CommandCompiler {
    fn compile(&self, channel: &Channel, out_dir: &Path) -> Result<()> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .env(ENV_CHANNEL, channel.id)
            .env(ENV_VARIANT, channel.variant.tag())
            .env(ENV_OUT_DIR, out_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ReleaseError::BuildFailed {
                channel: channel.id.to_string(),
                message: format!("failed to spawn {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReleaseError::BuildFailed {
                channel: channel.id.to_string(),
                message: format!("{} ({})", stderr.trim(), output.status),
            });
        }

        Ok(())
    }
}

/// Result of building one channel
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub channel_id: String,
    pub out_dir: PathBuf,
    /// Build duration on success, error message on failure
    pub outcome: std::result::Result<Duration, String>,
}

impl BuildResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Per-channel results of a batch, in the order the channels were given
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub results: Vec<BuildResult>,
}

impl BuildReport {
    pub fn failed(&self) -> Vec<&BuildResult> {
        self.results.iter().filter(|r| !r.is_ok()).collect()
    }

    pub fn all_ok(&self) -> bool {
        self.results.iter().all(BuildResult::is_ok)
    }
}

pub struct BuildDispatcher {
    compiler: Box<dyn AssetCompiler>,
    dist_dir: PathBuf,
}

impl BuildDispatcher {
    pub fn new(compiler: Box<dyn AssetCompiler>, dist_dir: PathBuf) -> Self {
        Self { compiler, dist_dir }
    }

    pub fn dist_dir(&self) -> &Path {
        &self.dist_dir
    }

    /// Build a single channel; failures are captured in the result
    pub fn build(&self, channel: &Channel, now: DateTime<Utc>) -> BuildResult {
        let out_dir = channel.resolve_local(&self.dist_dir, now);
        let started = Instant::now();

        let outcome = fs::create_dir_all(&self.dist_dir)
            .map_err(ReleaseError::from)
            .and_then(|_| self.compiler.compile(channel, &out_dir))
            .map(|_| started.elapsed())
            .map_err(|e| e.to_string());

        match &outcome {
            Ok(elapsed) => tracing::info!(
                channel = channel.id,
                out_dir = %out_dir.display(),
                elapsed_ms = elapsed.as_millis() as u64,
                "built channel"
            ),
            Err(message) => tracing::warn!(channel = channel.id, %message, "channel build failed"),
        }

        BuildResult {
            channel_id: channel.id.to_string(),
            out_dir,
            outcome,
        }
    }

    /// Build channels one after another; every channel gets a result
    pub fn build_all(&self, channels: &[Channel], now: DateTime<Utc>) -> BuildReport {
        let results = channels.iter().map(|c| self.build(c, now)).collect();
        BuildReport { results }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::channel::{ChannelRegistry, Variant};
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Records every compile call and fails for the listed channel ids
    #[derive(Default)]
    pub(crate) struct FakeCompiler {
        pub failing: Vec<&'static str>,
        pub calls: RefCell<Vec<String>>,
    }

    impl FakeCompiler {
        pub(crate) fn failing(ids: &[&'static str]) -> Self {
            Self {
                failing: ids.to_vec(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl AssetCompiler for FakeCompiler {
        fn compile(&self, channel: &Channel, out_dir: &Path) -> Result<()> {
            self.calls.borrow_mut().push(channel.id.to_string());
            if self.failing.contains(&channel.id) {
                return Err(ReleaseError::BuildFailed {
                    channel: channel.id.to_string(),
                    message: "compiler crashed".to_string(),
                });
            }
            fs::create_dir_all(out_dir)?;
            fs::write(out_dir.join("main.css"), channel.variant.tag())?;
            Ok(())
        }
    }

    impl AssetCompiler for std::rc::Rc<FakeCompiler> {
        fn compile(&self, channel: &Channel, out_dir: &Path) -> Result<()> {
            self.as_ref().compile(channel, out_dir)
        }
    }

    fn four_channels() -> ChannelRegistry {
        ChannelRegistry::from_channels(vec![
            Channel::new("stable", Variant::Default, "stable", "stable", true),
            Channel::new("latest", Variant::Default, "latest", "latest", true),
            Channel::new("preview", Variant::Default, "preview-{stamp}", "preview-{stamp}", false),
            Channel::new("prefixed", Variant::Prefixed, "p", "p", false),
        ])
    }

    #[test]
    fn failing_channel_does_not_abort_batch() {
        let temp = TempDir::new().unwrap();
        let dispatcher = BuildDispatcher::new(
            Box::new(FakeCompiler::failing(&["preview"])),
            temp.path().join("dist"),
        );
        let registry = four_channels();

        let report = dispatcher.build_all(registry.all(), Utc::now());

        assert_eq!(report.results.len(), 4);
        let ids: Vec<_> = report.results.iter().map(|r| r.channel_id.as_str()).collect();
        assert_eq!(ids, vec!["stable", "latest", "preview", "prefixed"]);

        let failed = report.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].channel_id, "preview");
        assert!(!report.all_ok());
        assert!(temp.path().join("dist/p/main.css").exists());
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = CommandCompiler::new(&[], ".").unwrap_err();
        assert!(matches!(err, ReleaseError::InvalidArgument { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn command_compiler_passes_channel_env() {
        let temp = TempDir::new().unwrap();
        let command: Vec<String> = vec![
            "sh".into(),
            "-c".into(),
            "mkdir -p \"$CSS_OUT_DIR\" && printf '%s:%s' \"$CSS_CHANNEL\" \"$CSS_VARIANT\" > \"$CSS_OUT_DIR/info\"".into(),
        ];
        let compiler = CommandCompiler::new(&command, temp.path()).unwrap();
        let channel = Channel::new("vars", Variant::Vars, "v", "v", false);
        let out_dir = temp.path().join("dist/v");

        compiler.compile(&channel, &out_dir).unwrap();

        let info = fs::read_to_string(out_dir.join("info")).unwrap();
        assert_eq!(info, "vars:v");
    }

    #[cfg(unix)]
    #[test]
    fn command_compiler_reports_stderr() {
        let temp = TempDir::new().unwrap();
        let command: Vec<String> = vec!["sh".into(), "-c".into(), "echo boom >&2; exit 3".into()];
        let compiler = CommandCompiler::new(&command, temp.path()).unwrap();
        let channel = Channel::new("stable", Variant::Default, "stable", "stable", true);

        let err = compiler
            .compile(&channel, &temp.path().join("dist/stable"))
            .unwrap_err();
        match err {
            ReleaseError::BuildFailed { channel, message } => {
                assert_eq!(channel, "stable");
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
