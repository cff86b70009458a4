//! Transport for a remote host reached with `ssh` and `rsync`

use std::path::Path;
use std::process::{Command, Output, Stdio};

use chrono::{DateTime, Utc};

use crate::error::{ReleaseError, Result};
use crate::inventory::{ArtifactLocation, CreatedAt};

use super::{validate_entry_name, RemoteTransport};

/// Exit status ssh uses for its own (connection) failures
const SSH_CONNECTION_FAILURE: i32 = 255;

#[derive(Debug, Clone)]
pub struct SshTransport {
    host: String,
    root: String,
}

impl SshTransport {
    pub fn new(host: impl Into<String>, root: impl Into<String>) -> Self {
        let root: String = root.into();
        Self {
            host: host.into(),
            root: root.trim_end_matches('/').to_string(),
        }
    }

    fn err(&self, e: impl std::fmt::Display) -> ReleaseError {
        ReleaseError::transport(self.describe(), e)
    }

    fn remote_path(&self, name: &str) -> String {
        format!("{}/{}", self.root, name)
    }

    /// Run a shell snippet on the host
    fn run(&self, script: &str) -> Result<Output> {
        tracing::debug!(host = %self.host, %script, "ssh");
        let output = Command::new("ssh")
            .args(["-o", "BatchMode=yes"])
            .arg(&self.host)
            .arg(script)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.err(format!("failed to spawn ssh: {}", e)))?;

        if output.status.code() == Some(SSH_CONNECTION_FAILURE) {
            return Err(self.err(stderr_of(&output)));
        }
        Ok(output)
    }

    /// Run a shell snippet that must succeed
    fn run_checked(&self, script: &str) -> Result<String> {
        let output = self.run(script)?;
        if !output.status.success() {
            return Err(self.err(stderr_of(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl RemoteTransport for SshTransport {
    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.root)
    }

    fn root_exists(&self) -> Result<bool> {
        let output = self.run(&format!("test -d {}", shell_quote(&self.root)))?;
        Ok(output.status.success())
    }

    fn create_root(&self) -> Result<()> {
        self.run_checked(&format!("mkdir -p {}", shell_quote(&self.root)))?;
        Ok(())
    }

    /// Lists entries with their birth time (`stat %W`); hosts whose
    /// filesystem does not record one report `0` and come back as unknown
    fn list(&self) -> Result<Vec<ArtifactLocation>> {
        let script = format!(
            "test -d {root} || exit 0; cd {root} && find . -mindepth 1 -maxdepth 1 -exec stat -c '%W %n' {{}} +",
            root = shell_quote(&self.root)
        );
        let stdout = self.run_checked(&script)?;
        Ok(parse_stat_listing(&stdout))
    }

    fn upload(&self, local_dir: &Path, remote_path: &str) -> Result<()> {
        validate_entry_name(&self.describe(), remote_path)?;

        let mut source = local_dir.as_os_str().to_owned();
        source.push("/");
        let dest = format!("{}:{}/", self.host, self.remote_path(remote_path));

        let output = Command::new("rsync")
            .args(["-a", "--delete", "-e", "ssh -o BatchMode=yes"])
            .arg(&source)
            .arg(&dest)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.err(format!("failed to spawn rsync: {}", e)))?;

        if !output.status.success() {
            return Err(self.err(stderr_of(&output)));
        }
        Ok(())
    }

    fn remove(&self, remote_path: &str) -> Result<()> {
        validate_entry_name(&self.describe(), remote_path)?;
        self.run_checked(&format!(
            "rm -rf -- {}",
            shell_quote(&self.remote_path(remote_path))
        ))?;
        Ok(())
    }
}

/// Parse `stat -c '%W %n'` lines produced from inside the remote root
pub fn parse_stat_listing(stdout: &str) -> Vec<ArtifactLocation> {
    stdout
        .lines()
        .filter_map(|line| {
            let (birth, name) = line.trim_end().split_once(' ')?;
            let name = name.strip_prefix("./").unwrap_or(name);
            if name.is_empty() || name.contains('/') {
                return None;
            }
            let created_at = match birth.parse::<i64>() {
                Ok(secs) if secs > 0 => DateTime::<Utc>::from_timestamp(secs, 0)
                    .map(CreatedAt::Known)
                    .unwrap_or(CreatedAt::Unknown),
                _ => CreatedAt::Unknown,
            };
            Some(ArtifactLocation::remote(name, created_at))
        })
        .collect()
}

/// Quote a string for a POSIX shell
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn stderr_of(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("command failed ({})", output.status)
    } else {
        stderr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_listing_with_birth_times() {
        let stdout = "1704067200 ./preview-2024-01-01\n0 ./stable\n- ./latest\n1704067200 ./index.html\n";
        let locations = parse_stat_listing(stdout);

        assert_eq!(locations.len(), 4);
        assert_eq!(locations[0].name, "preview-2024-01-01");
        assert_eq!(
            locations[0].created_at,
            CreatedAt::Known(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(locations[1].created_at, CreatedAt::Unknown);
        assert_eq!(locations[2].created_at, CreatedAt::Unknown);
        assert_eq!(locations[3].name, "index.html");
    }

    #[test]
    fn parse_listing_keeps_spaces_in_names() {
        let locations = parse_stat_listing("1704067200 ./old build\n\ngarbage\n");
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].name, "old build");
    }

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(shell_quote("/srv/css"), "'/srv/css'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn describe_trims_trailing_slash() {
        let transport = SshTransport::new("deploy@cdn", "/srv/css/");
        assert_eq!(transport.describe(), "deploy@cdn:/srv/css");
        assert_eq!(transport.remote_path("latest"), "/srv/css/latest");
    }
}
