//! Channel and variant type definitions
//!
//! # Catalog
//! ```text
//! stable     default variant   dist/stable            <root>/stable
//! latest     default variant   dist/latest            <root>/latest
//! preview    default variant   dist/preview-{stamp}   <root>/preview-{stamp}
//! prefixed   p                 dist/p                 <root>/p
//! vars       v                 dist/v                 <root>/v
//! clean      c                 dist/c                 <root>/c
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder replaced with a UTC timestamp when a path template is resolved
pub const STAMP_PLACEHOLDER: &str = "{stamp}";

/// Format used for preview stamps (e.g. `preview-2024-01-01-120000`)
pub const STAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S";

/// Folder prefix shared by every preview snapshot
pub const PREVIEW_PREFIX: &str = "preview-";

/// Root index document kept at the top of the remote tree
pub const INDEX_DOCUMENT: &str = "index.html";

/// Build variant handed to the asset compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// Regular class names and custom properties
    #[default]
    Default,
    /// Prefixed class names
    Prefixed,
    /// Namespaced custom properties
    Vars,
    /// Unopinionated build without defaults
    Clean,
}

impl Variant {
    /// Short tag passed to the compiler (empty for the default variant)
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Default => "",
            Self::Prefixed => "p",
            Self::Vars => "v",
            Self::Clean => "c",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Prefixed => "prefixed",
            Self::Vars => "vars",
            Self::Clean => "clean",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named build variant of the distribution and where it lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Channel identifier (e.g. "stable", "preview")
    pub id: &'static str,
    pub variant: Variant,
    /// Path under the local dist directory, may contain `{stamp}`
    pub local_path: &'static str,
    /// Path under the remote root, may contain `{stamp}`
    pub remote_path: &'static str,
    /// Whether destructive operations keep this channel unless told otherwise
    pub protected_by_default: bool,
}

impl Channel {
    pub const fn new(
        id: &'static str,
        variant: Variant,
        local_path: &'static str,
        remote_path: &'static str,
        protected_by_default: bool,
    ) -> Self {
        Self {
            id,
            variant,
            local_path,
            remote_path,
            protected_by_default,
        }
    }

    /// Local artifact directory for a build started at `now`
    pub fn resolve_local(&self, dist_dir: &Path, now: DateTime<Utc>) -> PathBuf {
        dist_dir.join(render(self.local_path, now))
    }

    /// Remote path (relative to the remote root) for a push at `now`
    pub fn resolve_remote(&self, now: DateTime<Utc>) -> String {
        render(self.remote_path, now)
    }

    /// Check whether a top-level folder name belongs to this channel
    ///
    /// Timestamped templates match on the part before `{stamp}`;
    /// fixed templates need an exact match.
    pub fn owns_folder(&self, name: &str) -> bool {
        match self.local_path.split_once(STAMP_PLACEHOLDER) {
            Some((prefix, _)) => name.starts_with(prefix) && name.len() > prefix.len(),
            None => name == self.local_path,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Check whether a folder name is a preview snapshot
pub fn is_preview_folder(name: &str) -> bool {
    name.len() > PREVIEW_PREFIX.len() && name.starts_with(PREVIEW_PREFIX)
}

fn render(template: &str, now: DateTime<Utc>) -> String {
    if template.contains(STAMP_PLACEHOLDER) {
        template.replace(STAMP_PLACEHOLDER, &now.format(STAMP_FORMAT).to_string())
    } else {
        template.to_string()
    }
}
