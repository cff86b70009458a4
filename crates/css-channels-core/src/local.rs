//! Local artifact management
//!
//! Applies retention decisions to the local dist directory and, when a
//! decision asks for it, rebuilds channels once every deletion is done.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::build::{BuildDispatcher, BuildReport};
use crate::channel::{Channel, ChannelRegistry};
use crate::config::RebuildScope;
use crate::error::Result;
use crate::inventory::{scan_dir, ArtifactLocation, Scope};
use crate::retention::Decision;

/// What happened to the rebuild step of a decision
#[derive(Debug, Clone, Default)]
pub enum RebuildOutcome {
    #[default]
    NotRequested,
    /// Deletion left the tree in an unknown state, so nothing was built
    Skipped { reason: String },
    Completed(BuildReport),
}

#[derive(Debug, Clone, Default)]
pub struct ApplyResult {
    pub deleted: Vec<ArtifactLocation>,
    /// Entries that were already gone when deletion ran
    pub already_absent: Vec<ArtifactLocation>,
    pub failed: Vec<(ArtifactLocation, String)>,
    pub rebuild: RebuildOutcome,
}

impl ApplyResult {
    pub fn has_failures(&self) -> bool {
        let build_failed = match &self.rebuild {
            RebuildOutcome::Completed(report) => !report.all_ok(),
            _ => false,
        };
        !self.failed.is_empty() || build_failed
    }
}

pub struct LocalArtifactManager {
    dist_dir: PathBuf,
    rebuild_scope: RebuildScope,
}

impl LocalArtifactManager {
    pub fn new(dist_dir: PathBuf, rebuild_scope: RebuildScope) -> Self {
        Self {
            dist_dir,
            rebuild_scope,
        }
    }

    pub fn dist_dir(&self) -> &Path {
        &self.dist_dir
    }

    /// Enumerate the current contents of the dist directory
    pub fn scan(&self) -> Result<Vec<ArtifactLocation>> {
        scan_dir(&self.dist_dir, Scope::Local)
    }

    /// Delete everything in `decision.to_delete`, then rebuild if requested
    ///
    /// Deletion is idempotent: entries that are already gone are reported as
    /// `already_absent`. Failures are recorded per entry and never retried.
    pub fn apply(
        &self,
        decision: &Decision,
        dispatcher: &BuildDispatcher,
        registry: &ChannelRegistry,
        now: DateTime<Utc>,
    ) -> ApplyResult {
        let mut result = ApplyResult::default();

        for location in &decision.to_delete {
            match self.delete(location) {
                Ok(true) => {
                    tracing::info!(path = %location.path.display(), "deleted local artifact");
                    result.deleted.push(location.clone());
                }
                Ok(false) => result.already_absent.push(location.clone()),
                Err(message) => {
                    tracing::warn!(path = %location.path.display(), %message, "local delete failed");
                    result.failed.push((location.clone(), message));
                }
            }
        }

        if !decision.rebuild_after {
            return result;
        }

        if !result.failed.is_empty() {
            let reason = format!(
                "{} entr{} could not be deleted",
                result.failed.len(),
                if result.failed.len() == 1 { "y" } else { "ies" }
            );
            tracing::warn!(%reason, "skipping rebuild");
            result.rebuild = RebuildOutcome::Skipped { reason };
            return result;
        }

        let channels = self.rebuild_channels(decision, registry);
        result.rebuild = RebuildOutcome::Completed(dispatcher.build_all(&channels, now));
        result
    }

    /// Channels to rebuild after a clean, in registry order
    fn rebuild_channels(&self, decision: &Decision, registry: &ChannelRegistry) -> Vec<Channel> {
        match self.rebuild_scope {
            RebuildScope::All => registry.all().to_vec(),
            RebuildScope::Existing => registry
                .all()
                .iter()
                .filter(|channel| {
                    decision
                        .to_delete
                        .iter()
                        .any(|l| channel.owns_folder(&l.name))
                })
                .cloned()
                .collect(),
        }
    }

    /// Remove one entry; `Ok(false)` when it was already gone
    fn delete(&self, location: &ArtifactLocation) -> std::result::Result<bool, String> {
        if location.scope != Scope::Local {
            return Err(format!("not a local artifact: {}", location));
        }
        if location.path.parent() != Some(self.dist_dir.as_path()) {
            return Err(format!(
                "refusing to delete path outside {}: {}",
                self.dist_dir.display(),
                location.path.display()
            ));
        }

        let metadata = match fs::symlink_metadata(&location.path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.to_string()),
        };

        let removed = if metadata.is_dir() {
            fs::remove_dir_all(&location.path)
        } else {
            fs::remove_file(&location.path)
        };

        match removed {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::tests::FakeCompiler;
    use crate::inventory::CreatedAt;
    use crate::retention::RetentionPolicy;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn seed(dist: &Path, names: &[&str]) {
        for name in names {
            let dir = dist.join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("old.css"), "stale").unwrap();
        }
    }

    fn setup(scope: RebuildScope) -> (TempDir, LocalArtifactManager, BuildDispatcher, Rc<FakeCompiler>) {
        let temp = TempDir::new().unwrap();
        let dist = temp.path().join("dist");
        let compiler = Rc::new(FakeCompiler::default());
        let dispatcher = BuildDispatcher::new(Box::new(Rc::clone(&compiler)), dist.clone());
        let manager = LocalArtifactManager::new(dist, scope);
        (temp, manager, dispatcher, compiler)
    }

    #[test]
    fn nuke_deletes_everything_without_rebuild() {
        let (_temp, manager, dispatcher, compiler) = setup(RebuildScope::All);
        seed(manager.dist_dir(), &["stable", "latest", "p"]);
        fs::write(manager.dist_dir().join("index.html"), "").unwrap();

        let inventory = manager.scan().unwrap();
        let decision = RetentionPolicy::NukeLocal.evaluate(&inventory, Utc::now()).unwrap();
        let result = manager.apply(&decision, &dispatcher, &ChannelRegistry::builtin(), Utc::now());

        assert_eq!(result.deleted.len(), 4);
        assert!(result.failed.is_empty());
        assert!(matches!(result.rebuild, RebuildOutcome::NotRequested));
        assert!(manager.scan().unwrap().is_empty());
        assert!(compiler.calls.borrow().is_empty());
    }

    #[test]
    fn deleting_absent_entry_is_not_an_error() {
        let (_temp, manager, dispatcher, _compiler) = setup(RebuildScope::All);
        seed(manager.dist_dir(), &["stable"]);

        let inventory = manager.scan().unwrap();
        let decision = RetentionPolicy::NukeLocal.evaluate(&inventory, Utc::now()).unwrap();
        fs::remove_dir_all(manager.dist_dir().join("stable")).unwrap();

        let result = manager.apply(&decision, &dispatcher, &ChannelRegistry::builtin(), Utc::now());
        assert!(result.deleted.is_empty());
        assert_eq!(result.already_absent.len(), 1);
        assert!(!result.has_failures());
    }

    #[test]
    fn rebuild_runs_after_deletion() {
        let (_temp, manager, dispatcher, compiler) = setup(RebuildScope::All);
        seed(manager.dist_dir(), &["stable", "latest"]);

        let inventory = manager.scan().unwrap();
        let decision = RetentionPolicy::RebuildClean.evaluate(&inventory, Utc::now()).unwrap();
        let registry = ChannelRegistry::builtin();
        let result = manager.apply(&decision, &dispatcher, &registry, Utc::now());

        let report = match result.rebuild {
            RebuildOutcome::Completed(report) => report,
            other => panic!("unexpected rebuild outcome: {other:?}"),
        };
        assert_eq!(report.results.len(), registry.all().len());
        assert_eq!(compiler.calls.borrow().len(), registry.all().len());

        let stable = manager.dist_dir().join("stable");
        assert!(stable.join("main.css").exists());
        assert!(!stable.join("old.css").exists());
    }

    #[test]
    fn rebuild_existing_only_touches_deleted_channels() {
        let (_temp, manager, dispatcher, compiler) = setup(RebuildScope::Existing);
        seed(manager.dist_dir(), &["stable", "preview-2024-01-01", "scratch"]);

        let inventory = manager.scan().unwrap();
        let decision = RetentionPolicy::RebuildClean.evaluate(&inventory, Utc::now()).unwrap();
        manager.apply(&decision, &dispatcher, &ChannelRegistry::builtin(), Utc::now());

        assert_eq!(*compiler.calls.borrow(), vec!["stable", "preview"]);
    }

    #[test]
    fn failed_delete_skips_rebuild() {
        let (temp, manager, dispatcher, compiler) = setup(RebuildScope::All);
        seed(manager.dist_dir(), &["stable"]);

        let mut decision = Decision {
            rebuild_after: true,
            ..Decision::default()
        };
        decision.to_delete.insert(ArtifactLocation::local(
            temp.path(),
            "dist",
            CreatedAt::Unknown,
        ));

        let result = manager.apply(&decision, &dispatcher, &ChannelRegistry::builtin(), Utc::now());
        assert_eq!(result.failed.len(), 1);
        assert!(result.failed[0].1.contains("refusing"));
        assert!(matches!(result.rebuild, RebuildOutcome::Skipped { .. }));
        assert!(compiler.calls.borrow().is_empty());
        assert!(manager.dist_dir().join("stable").exists());
    }

    #[test]
    fn remote_locations_are_rejected() {
        let (_temp, manager, dispatcher, _compiler) = setup(RebuildScope::All);
        let mut decision = Decision::default();
        decision
            .to_delete
            .insert(ArtifactLocation::remote("stable", CreatedAt::Unknown));

        let result = manager.apply(&decision, &dispatcher, &ChannelRegistry::builtin(), Utc::now());
        assert_eq!(result.failed.len(), 1);
        assert!(result.has_failures());
    }
}
