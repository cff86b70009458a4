//! Transport for a remote root mounted into the local filesystem
//! (NFS, SSHFS, a CI workspace shared with the web server, ...)

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{ReleaseError, Result};
use crate::inventory::{scan_dir, ArtifactLocation, Scope};

use super::{validate_entry_name, RemoteTransport};

#[derive(Debug, Clone)]
pub struct MountedTransport {
    root: PathBuf,
}

impl MountedTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn err(&self, e: impl std::fmt::Display) -> ReleaseError {
        ReleaseError::transport(self.describe(), e)
    }

    fn copy_tree(&self, src: &Path, dst: &Path) -> Result<usize> {
        let mut copied = 0;
        for entry in WalkDir::new(src) {
            let entry = entry.map_err(|e| self.err(e))?;
            let relative = entry
                .path()
                .strip_prefix(src)
                .map_err(|e| self.err(e))?;
            let target = dst.join(relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).map_err(|e| self.err(e))?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| self.err(e))?;
                }
                fs::copy(entry.path(), &target).map_err(|e| self.err(e))?;
                copied += 1;
            }
        }
        Ok(copied)
    }

    fn remove_path(path: &Path) -> std::io::Result<()> {
        let metadata = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let removed = if metadata.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match removed {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

impl RemoteTransport for MountedTransport {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn root_exists(&self) -> Result<bool> {
        Ok(self.root.is_dir())
    }

    fn create_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| self.err(e))
    }

    fn list(&self) -> Result<Vec<ArtifactLocation>> {
        scan_dir(&self.root, Scope::Remote).map_err(|e| self.err(e))
    }

    /// Copies into a staging folder first, then swaps it into place
    fn upload(&self, local_dir: &Path, remote_path: &str) -> Result<()> {
        validate_entry_name(&self.describe(), remote_path)?;

        let staging = self.root.join(format!(".{}.partial", remote_path));
        let dest = self.root.join(remote_path);

        Self::remove_path(&staging).map_err(|e| self.err(e))?;
        let copied = self.copy_tree(local_dir, &staging)?;
        Self::remove_path(&dest).map_err(|e| self.err(e))?;
        fs::rename(&staging, &dest).map_err(|e| self.err(e))?;

        tracing::debug!(dest = %dest.display(), files = copied, "uploaded to mounted root");
        Ok(())
    }

    fn remove(&self, remote_path: &str) -> Result<()> {
        validate_entry_name(&self.describe(), remote_path)?;
        Self::remove_path(&self.root.join(remote_path)).map_err(|e| self.err(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn artifact(temp: &TempDir, content: &str) -> PathBuf {
        let dir = temp.path().join("build");
        fs::create_dir_all(dir.join("css")).unwrap();
        fs::write(dir.join("css/main.css"), content).unwrap();
        dir
    }

    #[test]
    fn upload_replaces_previous_contents() {
        let temp = TempDir::new().unwrap();
        let transport = MountedTransport::new(temp.path().join("www"));
        assert!(!transport.root_exists().unwrap());
        transport.create_root().unwrap();

        let stale = temp.path().join("www/latest/stale.css");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "old").unwrap();

        transport.upload(&artifact(&temp, "body{}"), "latest").unwrap();

        let uploaded = temp.path().join("www/latest/css/main.css");
        assert_eq!(fs::read_to_string(uploaded).unwrap(), "body{}");
        assert!(!stale.exists());
        assert!(!temp.path().join("www/.latest.partial").exists());
    }

    #[test]
    fn list_and_remove() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("www");
        fs::create_dir_all(root.join("stable")).unwrap();
        fs::create_dir_all(root.join("preview-2024-01-01")).unwrap();
        fs::write(root.join("index.html"), "").unwrap();
        let transport = MountedTransport::new(&root);

        let names: Vec<_> = transport.list().unwrap().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["index.html", "preview-2024-01-01", "stable"]);

        transport.remove("preview-2024-01-01").unwrap();
        transport.remove("index.html").unwrap();
        transport.remove("already-gone").unwrap();
        assert!(transport.remove("../outside").is_err());

        let names: Vec<_> = transport.list().unwrap().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["stable"]);
    }
}
