//! Artifact inventory
//!
//! An inventory is the list of top-level entries under one root (the local
//! dist directory or the remote root). It is enumerated fresh for every
//! operation and never cached.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::channel::is_preview_folder;
use crate::error::{ReleaseError, Result};

/// Where an artifact lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    Local,
    Remote,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Creation time of an artifact, if the backing store reports one
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "kebab-case")]
pub enum CreatedAt {
    Known(DateTime<Utc>),
    Unknown,
}

impl CreatedAt {
    pub fn from_system_time(time: std::io::Result<SystemTime>) -> Self {
        match time {
            Ok(t) => Self::Known(DateTime::<Utc>::from(t)),
            Err(_) => Self::Unknown,
        }
    }

    /// Age at `now`; `None` when the creation time is unknown
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::Known(at) => Some(now - *at),
            Self::Unknown => None,
        }
    }
}

impl std::fmt::Display for CreatedAt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(at) => write!(f, "{}", at.format("%Y-%m-%d %H:%M")),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One existing artifact (folder or file) under a scanned root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactLocation {
    /// Top-level entry name; doubles as the channel identifier for policies
    pub name: String,
    pub scope: Scope,
    /// Absolute path for local entries, root-relative path for remote ones
    pub path: PathBuf,
    pub created_at: CreatedAt,
}

impl ArtifactLocation {
    pub fn local(dist_dir: &Path, name: impl Into<String>, created_at: CreatedAt) -> Self {
        let name = name.into();
        Self {
            path: dist_dir.join(&name),
            name,
            scope: Scope::Local,
            created_at,
        }
    }

    pub fn remote(name: impl Into<String>, created_at: CreatedAt) -> Self {
        let name = name.into();
        Self {
            path: PathBuf::from(&name),
            name,
            scope: Scope::Remote,
            created_at,
        }
    }

    pub fn is_preview(&self) -> bool {
        is_preview_folder(&self.name)
    }
}

impl std::fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.scope, self.name)
    }
}

/// Enumerate the top-level entries of a directory
///
/// A missing root is an empty inventory. A root that exists but is not a
/// directory is an error, as is any entry that cannot be read.
pub fn scan_dir(root: &Path, scope: Scope) -> Result<Vec<ArtifactLocation>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    if !root.is_dir() {
        return Err(ReleaseError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let mut locations = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(std::io::Error::from)?;
        let name = entry.file_name().to_string_lossy().to_string();
        let created_at = CreatedAt::from_system_time(
            fs::symlink_metadata(entry.path()).and_then(|m| m.created()),
        );

        let location = match scope {
            Scope::Local => ArtifactLocation::local(root, name, created_at),
            Scope::Remote => ArtifactLocation::remote(name, created_at),
        };
        locations.push(location);
    }

    tracing::debug!(root = %root.display(), count = locations.len(), "scanned inventory");
    Ok(locations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn unknown_age_is_never_old() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(CreatedAt::Unknown.age(now), None);

        let at = CreatedAt::Known(now - Duration::days(3));
        assert_eq!(at.age(now), Some(Duration::days(3)));
    }

    #[test]
    fn scan_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let locations = scan_dir(&temp.path().join("dist"), Scope::Local).unwrap();
        assert!(locations.is_empty());
    }

    #[test]
    fn scan_file_root_fails() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("dist");
        fs::write(&file, "not a dir").unwrap();

        let err = scan_dir(&file, Scope::Local).unwrap_err();
        assert!(matches!(err, ReleaseError::NotADirectory { .. }));
    }

    #[test]
    fn scan_lists_top_level_entries_sorted() {
        let temp = TempDir::new().unwrap();
        let dist = temp.path();
        fs::create_dir_all(dist.join("stable/css")).unwrap();
        fs::create_dir_all(dist.join("latest")).unwrap();
        fs::write(dist.join("index.html"), "<html></html>").unwrap();

        let locations = scan_dir(dist, Scope::Local).unwrap();
        let names: Vec<_> = locations.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["index.html", "latest", "stable"]);
        assert_eq!(locations[2].path, dist.join("stable"));
    }

    #[test]
    fn remote_scan_uses_relative_paths() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("preview-2024-01-01")).unwrap();

        let locations = scan_dir(temp.path(), Scope::Remote).unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].path, PathBuf::from("preview-2024-01-01"));
        assert!(locations[0].is_preview());
        assert_eq!(locations[0].scope, Scope::Remote);
    }
}
