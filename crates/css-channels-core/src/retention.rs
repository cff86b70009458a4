//! Retention policies
//!
//! Each destructive operation is one variant of [`RetentionPolicy`]. A policy
//! is a pure function from an inventory to a [`Decision`]:
//!
//! ```text
//! to_delete   = matched_by_pattern - protected_set
//! to_preserve = inventory - to_delete
//! ```
//!
//! The protected set is subtracted after pattern matching, so an allow-listed
//! entry survives even when a deletion pattern matches it.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::channel::INDEX_DOCUMENT;
use crate::error::{ReleaseError, Result};
use crate::inventory::ArtifactLocation;

pub const DEFAULT_PREVIEW_MAX_AGE_DAYS: i64 = 7;
/// Upper bound accepted for the preview retention window
pub const MAX_PREVIEW_MAX_AGE_DAYS: i64 = 36_500;

const NO_PROTECTION: &[&str] = &[];
const SAFE_CLEAN_PROTECTED: &[&str] = &["stable", "latest"];
const REMOTE_WIPE_PROTECTED: &[&str] = &["stable", "p", "v", INDEX_DOCUMENT];
const REMOTE_WIPE_SAFE_PROTECTED: &[&str] = &["stable", "latest", "p", "v", INDEX_DOCUMENT];
const KEEP_STABLE_PROTECTED: &[&str] = &["stable", INDEX_DOCUMENT];

/// Outcome of evaluating a policy against an inventory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub to_delete: BTreeSet<ArtifactLocation>,
    pub to_preserve: BTreeSet<ArtifactLocation>,
    pub rebuild_after: bool,
}

impl Decision {
    /// Nothing to delete and nothing to rebuild
    pub fn is_noop(&self) -> bool {
        self.to_delete.is_empty() && !self.rebuild_after
    }

    /// Check that every inventory entry lands in exactly one set
    pub fn covers(&self, inventory: &[ArtifactLocation]) -> bool {
        let disjoint = self.to_delete.is_disjoint(&self.to_preserve);
        let all: BTreeSet<_> = inventory.iter().cloned().collect();
        let union: BTreeSet<_> = self.to_delete.union(&self.to_preserve).cloned().collect();
        disjoint && union == all
    }
}

/// Closed set of cleanup and wipe behaviours
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Delete everything under dist, then rebuild
    RebuildClean,
    /// Delete everything under dist
    NukeLocal,
    /// Delete everything under dist except stable and latest
    SafeClean,
    /// Delete previews older than `max_age`; unknown ages are kept
    PreviewGc { max_age: Duration },
    /// Delete latest and previews; keep stable, p, v and the index
    RemoteWipe,
    /// Delete previews only
    RemoteWipeSafe,
    /// Delete everything, no exceptions
    RemoteWipeAll,
    /// Delete everything except stable and the index
    RemoteWipeKeepStable,
    /// Delete one folder by exact name
    CustomClean(String),
}

impl RetentionPolicy {
    /// Preview GC with a window in days, `0..=MAX_PREVIEW_MAX_AGE_DAYS`
    pub fn preview_gc_days(days: i64) -> Result<Self> {
        let max_age = Some(days)
            .filter(|d| (0..=MAX_PREVIEW_MAX_AGE_DAYS).contains(d))
            .and_then(Duration::try_days)
            .ok_or_else(|| ReleaseError::InvalidArgument {
                message: format!(
                    "preview max age must be between 0 and {} days, got {}",
                    MAX_PREVIEW_MAX_AGE_DAYS, days
                ),
            })?;
        Ok(Self::PreviewGc { max_age })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RebuildClean => "rebuild-clean",
            Self::NukeLocal => "nuke-local",
            Self::SafeClean => "safe-clean",
            Self::PreviewGc { .. } => "preview-gc",
            Self::RemoteWipe => "remote-wipe",
            Self::RemoteWipeSafe => "remote-wipe-safe",
            Self::RemoteWipeAll => "remote-wipe-all",
            Self::RemoteWipeKeepStable => "remote-wipe-keep-stable",
            Self::CustomClean(_) => "custom-clean",
        }
    }

    /// Names this policy never deletes
    pub fn protected_set(&self) -> &'static [&'static str] {
        match self {
            Self::SafeClean => SAFE_CLEAN_PROTECTED,
            Self::RemoteWipe => REMOTE_WIPE_PROTECTED,
            Self::RemoteWipeSafe => REMOTE_WIPE_SAFE_PROTECTED,
            Self::RemoteWipeKeepStable => KEEP_STABLE_PROTECTED,
            _ => NO_PROTECTION,
        }
    }

    fn rebuilds(&self) -> bool {
        matches!(self, Self::RebuildClean)
    }

    fn matches(&self, location: &ArtifactLocation, now: DateTime<Utc>) -> bool {
        match self {
            Self::RebuildClean
            | Self::NukeLocal
            | Self::SafeClean
            | Self::RemoteWipeAll
            | Self::RemoteWipeKeepStable => true,
            Self::PreviewGc { max_age } => {
                location.is_preview()
                    && location
                        .created_at
                        .age(now)
                        .is_some_and(|age| age > *max_age)
            }
            Self::RemoteWipe => location.name == "latest" || location.is_preview(),
            Self::RemoteWipeSafe => location.is_preview(),
            Self::CustomClean(folder) => location.name == *folder,
        }
    }

    /// Compute the delete/preserve split for an inventory
    ///
    /// Only `CustomClean` can fail: with `InvalidArgument` for a name that is
    /// not a plain folder name, and with `NotFound` when nothing matches.
    pub fn evaluate(&self, inventory: &[ArtifactLocation], now: DateTime<Utc>) -> Result<Decision> {
        if let Self::CustomClean(folder) = self {
            validate_folder_name(folder)?;
            if !inventory.iter().any(|l| l.name == *folder) {
                return Err(ReleaseError::NotFound {
                    name: folder.clone(),
                });
            }
        }

        let protected: BTreeSet<&str> = self.protected_set().iter().copied().collect();
        let matched: BTreeSet<ArtifactLocation> = inventory
            .iter()
            .filter(|l| self.matches(l, now))
            .cloned()
            .collect();

        let to_delete: BTreeSet<ArtifactLocation> = matched
            .into_iter()
            .filter(|l| !protected.contains(l.name.as_str()))
            .collect();
        let to_preserve: BTreeSet<ArtifactLocation> = inventory
            .iter()
            .filter(|l| !to_delete.contains(*l))
            .cloned()
            .collect();

        let decision = Decision {
            to_delete,
            to_preserve,
            rebuild_after: self.rebuilds(),
        };
        debug_assert!(decision.covers(inventory));

        tracing::debug!(
            policy = self.name(),
            delete = decision.to_delete.len(),
            preserve = decision.to_preserve.len(),
            "evaluated retention policy"
        );
        Ok(decision)
    }
}

impl std::fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CustomClean(folder) => write!(f, "{} ({})", self.name(), folder),
            _ => write!(f, "{}", self.name()),
        }
    }
}

fn validate_folder_name(folder: &str) -> Result<()> {
    let invalid = folder.is_empty()
        || folder == "."
        || folder == ".."
        || folder.contains('/')
        || folder.contains('\\');
    if invalid {
        return Err(ReleaseError::InvalidArgument {
            message: format!("'{}' is not a folder name under dist", folder),
        });
    }
    Ok(())
}
