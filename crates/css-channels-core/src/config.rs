use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReleaseError, Result};
use crate::retention::{DEFAULT_PREVIEW_MAX_AGE_DAYS, MAX_PREVIEW_MAX_AGE_DAYS};

pub const CONFIG_FILE: &str = "css-channels.toml";

/// Default config template with rich comments
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# css-channels configuration file
# Location: ./css-channels.toml (or --config / CSS_CHANNELS_CONFIG)

[paths]
# Local artifact directory, relative to this file
dist = "dist"

[build]
# Compiler command, run once per channel.
# The channel is passed as CSS_CHANNEL, CSS_VARIANT (p, v, c or empty)
# and CSS_OUT_DIR environment variables.
command = ["npm", "run", "build:css"]
working_dir = "."

# What `clean` rebuilds afterwards: "all" channels or only "existing" ones
rebuild = "all"

[remote]
# "mounted": root is a locally mounted directory
# "ssh": root is a path on `host`, reached with ssh and rsync
kind = "mounted"
root = ""
host = ""

[retention]
# Preview folders older than this are removed by `clean --preview`
# and `remote cleanup`. Folders with unknown age are always kept.
preview_max_age_days = 7
"#;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_dist")]
    pub dist: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dist: default_dist(),
        }
    }
}

fn default_dist() -> PathBuf {
    PathBuf::from("dist")
}

/// Which channels a rebuild-after-clean covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebuildScope {
    /// Every channel in the registry
    #[default]
    All,
    /// Only channels that had a folder among the deleted entries
    Existing,
}

impl RebuildScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Existing => "existing",
        }
    }
}

impl std::str::FromStr for RebuildScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "existing" => Ok(Self::Existing),
            _ => Err(format!("unknown rebuild scope: {} (expected all or existing)", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_command")]
    pub command: Vec<String>,

    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    #[serde(default)]
    pub rebuild: RebuildScope,
}

fn default_command() -> Vec<String> {
    ["npm", "run", "build:css"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            working_dir: default_working_dir(),
            rebuild: RebuildScope::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    #[default]
    Mounted,
    Ssh,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mounted => "mounted",
            Self::Ssh => "ssh",
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mounted" => Ok(Self::Mounted),
            "ssh" => Ok(Self::Ssh),
            _ => Err(format!("unknown transport: {} (expected mounted or ssh)", s)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub kind: TransportKind,

    /// Remote root; empty means no remote is configured
    #[serde(default)]
    pub root: String,

    /// Host for the ssh transport (e.g. "deploy@cdn.example.com")
    #[serde(default)]
    pub host: String,
}

impl RemoteConfig {
    pub fn is_configured(&self) -> bool {
        let has_root = !self.root.trim().is_empty();
        match self.kind {
            TransportKind::Mounted => has_root,
            TransportKind::Ssh => has_root && !self.host.trim().is_empty(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_preview_max_age_days")]
    pub preview_max_age_days: i64,
}

fn default_preview_max_age_days() -> i64 {
    DEFAULT_PREVIEW_MAX_AGE_DAYS
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            preview_max_age_days: default_preview_max_age_days(),
        }
    }
}

impl Config {
    /// Load config from a file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|e| ReleaseError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        config.validate(path)?;
        Ok(config)
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Config file path inside a project directory
    pub fn path(project_dir: &Path) -> PathBuf {
        project_dir.join(CONFIG_FILE)
    }

    /// Initialize config with default template (rich comments)
    pub fn init(path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        if !path.exists() {
            fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
        }

        Ok(path.to_path_buf())
    }

    /// Local dist directory, anchored at `base_dir` when relative
    pub fn dist_dir(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.paths.dist)
    }

    /// Compiler working directory, anchored at `base_dir` when relative
    pub fn working_dir(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.build.working_dir)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let days = self.retention.preview_max_age_days;
        if !(0..=MAX_PREVIEW_MAX_AGE_DAYS).contains(&days) {
            return Err(ReleaseError::ConfigParse {
                path: path.to_path_buf(),
                message: format!(
                    "retention.preview_max_age_days must be between 0 and {}, got {}",
                    MAX_PREVIEW_MAX_AGE_DAYS, days
                ),
            });
        }
        Ok(())
    }

    /// Get a config value by dot-notation key
    pub fn get(&self, key: &str) -> Option<String> {
        self.list()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Set a config value by dot-notation key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = |message: String| ReleaseError::InvalidArgument { message };

        match key {
            "paths.dist" => self.paths.dist = PathBuf::from(value.trim()),
            "build.command" => self.build.command = parse_string_list(value)?,
            "build.working_dir" => self.build.working_dir = PathBuf::from(value.trim()),
            "build.rebuild" => self.build.rebuild = value.parse().map_err(invalid)?,
            "remote.kind" => self.remote.kind = value.parse().map_err(invalid)?,
            "remote.root" => self.remote.root = value.trim().to_string(),
            "remote.host" => self.remote.host = value.trim().to_string(),
            "retention.preview_max_age_days" => {
                let days: i64 = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("not a number of days: {}", value)))?;
                if !(0..=MAX_PREVIEW_MAX_AGE_DAYS).contains(&days) {
                    return Err(invalid(format!(
                        "preview_max_age_days must be between 0 and {}",
                        MAX_PREVIEW_MAX_AGE_DAYS
                    )));
                }
                self.retention.preview_max_age_days = days;
            }
            _ => {
                return Err(ReleaseError::ConfigKeyNotFound {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    /// List all config keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            (
                "paths.dist".to_string(),
                self.paths.dist.display().to_string(),
            ),
            (
                "build.command".to_string(),
                format!("{:?}", self.build.command),
            ),
            (
                "build.working_dir".to_string(),
                self.build.working_dir.display().to_string(),
            ),
            (
                "build.rebuild".to_string(),
                self.build.rebuild.as_str().to_string(),
            ),
            (
                "remote.kind".to_string(),
                self.remote.kind.as_str().to_string(),
            ),
            ("remote.root".to_string(), self.remote.root.clone()),
            ("remote.host".to_string(), self.remote.host.clone()),
            (
                "retention.preview_max_age_days".to_string(),
                self.retention.preview_max_age_days.to_string(),
            ),
        ]
    }
}

/// Parse a comma-separated or JSON-like list string
fn parse_string_list(value: &str) -> Result<Vec<String>> {
    let trimmed = value.trim();

    // Try JSON array format first: ["a", "b"]
    let inner = if trimmed.starts_with('[') && trimmed.ends_with(']') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };

    let items: Vec<String> = inner
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if items.is_empty() {
        return Err(ReleaseError::InvalidArgument {
            message: "list must contain at least one item".to_string(),
        });
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_string_list_comma() {
        let result = parse_string_list("npm,run,build:css").unwrap();
        assert_eq!(result, vec!["npm", "run", "build:css"]);
    }

    #[test]
    fn test_parse_string_list_json() {
        let result = parse_string_list(r#"["make", "css"]"#).unwrap();
        assert_eq!(result, vec!["make", "css"]);
    }

    #[test]
    fn test_parse_string_list_empty() {
        assert!(parse_string_list("[]").is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(&temp.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.paths.dist, PathBuf::from("dist"));
        assert_eq!(config.build.rebuild, RebuildScope::All);
        assert_eq!(config.retention.preview_max_age_days, 7);
        assert!(!config.remote.is_configured());
    }

    #[test]
    fn test_template_parses() {
        let temp = TempDir::new().unwrap();
        let path = Config::init(&Config::path(temp.path())).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.build.command, vec!["npm", "run", "build:css"]);
        assert_eq!(config.remote.kind, TransportKind::Mounted);
    }

    #[test]
    fn test_config_get_set() {
        let mut config = Config::default();

        config.set("build.rebuild", "existing").unwrap();
        assert_eq!(config.build.rebuild, RebuildScope::Existing);

        config.set("remote.kind", "ssh").unwrap();
        config.set("remote.root", "/srv/css").unwrap();
        assert!(!config.remote.is_configured());
        config.set("remote.host", "deploy@cdn").unwrap();
        assert!(config.remote.is_configured());

        config.set("retention.preview_max_age_days", "14").unwrap();
        assert_eq!(config.get("retention.preview_max_age_days").unwrap(), "14");

        assert!(config.set("retention.preview_max_age_days", "-1").is_err());
        assert!(config.set("build.rebuild", "some").is_err());
        assert!(matches!(
            config.set("nope", "1"),
            Err(ReleaseError::ConfigKeyNotFound { .. })
        ));
    }

    #[test]
    fn test_save_load_roundtrip_keeps_remote() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join(CONFIG_FILE);

        let mut config = Config::default();
        config.set("remote.root", "/mnt/cdn").unwrap();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.remote.root, "/mnt/cdn");
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "[retention]\npreview_max_age_days = \"soon\"\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ReleaseError::ConfigParse { .. }));
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn test_retention_window_is_bounded() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "[retention]\npreview_max_age_days = 200000000000000\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ReleaseError::ConfigParse { .. }));

        let mut config = Config::default();
        assert!(config
            .set("retention.preview_max_age_days", "200000000000000")
            .is_err());
        assert!(config
            .set("retention.preview_max_age_days", &(MAX_PREVIEW_MAX_AGE_DAYS + 1).to_string())
            .is_err());
        assert_eq!(config.retention.preview_max_age_days, 7);

        config
            .set("retention.preview_max_age_days", &MAX_PREVIEW_MAX_AGE_DAYS.to_string())
            .unwrap();
        assert_eq!(config.retention.preview_max_age_days, MAX_PREVIEW_MAX_AGE_DAYS);
    }
}
