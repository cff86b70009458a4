use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};

use css_channels_core::Variant;

#[derive(Parser)]
#[command(name = "css-channels")]
#[command(about = "Build, deploy and clean CSS release channels")]
#[command(version)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ./css-channels.toml)
    #[arg(long, global = true, env = "CSS_CHANNELS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Build variant selected on the command line
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum VariantArg {
    /// Prefixed class names
    #[value(name = "p")]
    Prefixed,
    /// Namespaced custom properties
    #[value(name = "v")]
    Vars,
    /// Unopinionated build without defaults
    #[value(name = "c")]
    Clean,
}

impl From<VariantArg> for Variant {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Prefixed => Variant::Prefixed,
            VariantArg::Vars => Variant::Vars,
            VariantArg::Clean => Variant::Clean,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build one channel, or every channel with --full
    #[command(group(ArgGroup::new("target").args(["channel", "full"])))]
    Build {
        /// Channel id (default: latest)
        #[arg(short, long)]
        channel: Option<String>,

        /// Build every registered channel
        #[arg(long)]
        full: bool,
    },

    /// Build a channel and push it to the remote
    Deploy {
        /// Channel id (default: latest, or the channel of --variant)
        #[arg(short, long)]
        channel: Option<String>,

        /// Variant to deploy
        #[arg(long, value_enum)]
        variant: Option<VariantArg>,
    },

    /// Clean the local dist directory (default: delete all, then rebuild)
    #[command(group(ArgGroup::new("mode").args(["all", "safe", "preview", "folder"])))]
    Clean {
        /// Delete everything without rebuilding
        #[arg(long)]
        all: bool,

        /// Keep stable and latest
        #[arg(long)]
        safe: bool,

        /// Delete previews older than the retention window
        #[arg(long)]
        preview: bool,

        /// Delete a single folder by exact name
        folder: Option<String>,

        /// Show what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage the remote root
    Remote {
        #[command(subcommand)]
        action: RemoteAction,
    },

    /// Delete the local dist directory contents and the whole remote root
    Nuke {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show local and remote inventories
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List registered channels
    Channels,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum RemoteAction {
    /// Delete expired remote previews
    Cleanup {
        /// Show what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete remote channels (default: keep stable, p, v and index.html)
    #[command(group(ArgGroup::new("mode").args(["all", "safe", "stable"])))]
    Wipe {
        /// Delete everything in the remote root
        #[arg(long)]
        all: bool,

        /// Delete previews only
        #[arg(long)]
        safe: bool,

        /// Keep only stable and index.html
        #[arg(long)]
        stable: bool,

        /// Show what would be deleted
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g., remote.root)
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key (e.g., retention.preview_max_age_days)
        key: String,

        /// Value (lists as comma separated or TOML array)
        value: String,
    },

    /// List all config values
    List,

    /// Show config file path
    Path,

    /// Write a commented config template
    Init,
}
