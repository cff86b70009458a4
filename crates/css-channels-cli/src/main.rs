use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;

use css_channels_core::config::CONFIG_FILE;
use css_channels_core::orchestrator::{CleanMode, RemoteStatus, StatusEntry, WipeMode};
use css_channels_core::{
    ApplyResult, BuildResult, Config, Decision, DeleteReport, Orchestrator, RebuildOutcome,
    ReleaseError, Result, Variant, DEFAULT_DEPLOY_CHANNEL,
};

mod args;
mod telemetry;
use args::{Cli, Commands, ConfigAction, RemoteAction, Shell};

fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::init_tracing(telemetry::level_for(cli.verbose, cli.quiet));

    let result = match cli.command {
        Some(Commands::Completions { shell }) => {
            handle_completions(shell);
            Ok(())
        }
        Some(command) => resolve_config(cli.config).and_then(|location| run(command, &location)),
        None => {
            Cli::command().print_help().ok();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// Where the config lives and what relative paths in it are anchored to
struct ConfigLocation {
    path: PathBuf,
    base_dir: PathBuf,
}

/// `--config` / `CSS_CHANNELS_CONFIG`, then `./css-channels.toml`, then the
/// user config directory
fn resolve_config(explicit: Option<PathBuf>) -> Result<ConfigLocation> {
    let cwd = std::env::current_dir()?;

    if let Some(path) = explicit {
        let path = cwd.join(path);
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.clone());
        return Ok(ConfigLocation { path, base_dir });
    }

    let local = Config::path(&cwd);
    if !local.exists() {
        if let Some(global) = dirs::config_dir().map(|d| d.join("css-channels").join(CONFIG_FILE)) {
            if global.exists() {
                return Ok(ConfigLocation {
                    path: global,
                    base_dir: cwd,
                });
            }
        }
    }

    Ok(ConfigLocation {
        path: local,
        base_dir: cwd,
    })
}

fn run(command: Commands, location: &ConfigLocation) -> Result<()> {
    if let Commands::Config { action } = command {
        return handle_config(action, &location.path);
    }

    let config = Config::load(&location.path)?;
    tracing::debug!(config = %location.path.display(), "loaded config");
    let orch = Orchestrator::from_config(&config, &location.base_dir)?;

    match command {
        Commands::Build { channel, full } => handle_build(&orch, channel.as_deref(), full),
        Commands::Deploy { channel, variant } => handle_deploy(
            &orch,
            channel.as_deref(),
            variant.map(Variant::from).unwrap_or_default(),
        ),
        Commands::Clean {
            all,
            safe,
            preview,
            folder,
            dry_run,
        } => {
            let mode = match (all, safe, preview, folder) {
                (true, _, _, _) => CleanMode::All,
                (_, true, _, _) => CleanMode::Safe,
                (_, _, true, _) => CleanMode::Preview,
                (_, _, _, Some(folder)) => CleanMode::Folder(folder),
                _ => CleanMode::Rebuild,
            };
            handle_clean(&orch, mode, dry_run)
        }
        Commands::Remote { action } => handle_remote(&orch, action),
        Commands::Nuke { yes } => handle_nuke(&orch, yes),
        Commands::Status { json } => handle_status(&orch, json),
        Commands::Channels => {
            handle_channels(&orch);
            Ok(())
        }
        Commands::Config { .. } | Commands::Completions { .. } => Ok(()),
    }
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let shell = match shell {
        Shell::Bash => clap_complete::Shell::Bash,
        Shell::Zsh => clap_complete::Shell::Zsh,
        Shell::Fish => clap_complete::Shell::Fish,
        Shell::PowerShell => clap_complete::Shell::PowerShell,
        Shell::Elvish => clap_complete::Shell::Elvish,
    };
    generate(shell, &mut cmd, "css-channels", &mut io::stdout());
}

fn handle_config(action: ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load(path)?;
            match config.get(&key) {
                Some(value) => println!("{}", value),
                None => return Err(ReleaseError::ConfigKeyNotFound { key }),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load(path)?;
            config.set(&key, &value)?;
            config.save(path)?;
            println!("{} {} = {}", "Set:".green(), key, value);
        }
        ConfigAction::List => {
            let config = Config::load(path)?;
            println!();
            for (key, value) in config.list() {
                println!("{} = {}", key.cyan(), value);
            }
            println!();
        }
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Init => {
            let path = Config::init(path)?;
            println!("{} {}", "Initialized:".green(), path.display());
        }
    }

    Ok(())
}

// ============================================================================
// Build & deploy
// ============================================================================

fn print_build_result(result: &BuildResult) {
    match &result.outcome {
        Ok(elapsed) => println!(
            "  {} {:<10} {} ({} ms)",
            "[OK]".green(),
            result.channel_id,
            result.out_dir.display(),
            elapsed.as_millis()
        ),
        Err(message) => println!(
            "  {} {:<10} {}",
            "[FAIL]".red().bold(),
            result.channel_id,
            message
        ),
    }
}

fn handle_build(orch: &Orchestrator, channel: Option<&str>, full: bool) -> Result<()> {
    println!();
    if !full {
        let id = channel.unwrap_or(DEFAULT_DEPLOY_CHANNEL);
        let result = orch.build(id)?;
        print_build_result(&result);
        println!();
        return match result.outcome {
            Ok(_) => Ok(()),
            Err(message) => Err(ReleaseError::BuildFailed {
                channel: result.channel_id,
                message,
            }),
        };
    }

    println!("Building {} channels...", orch.registry().all().len());
    let report = orch.build_full();
    for result in &report.results {
        print_build_result(result);
    }
    println!();

    let failed = report.failed();
    if failed.is_empty() {
        println!("{} {} channels built", "Done:".green(), report.results.len());
        return Ok(());
    }

    // A partial batch is still a completed run
    println!(
        "{} {} of {} channels failed:",
        "[WARN]".yellow().bold(),
        failed.len(),
        report.results.len()
    );
    for result in failed {
        if let Err(message) = &result.outcome {
            println!("  {} {}: {}", "[FAIL]".red(), result.channel_id, message);
        }
    }
    println!();
    Ok(())
}

fn handle_deploy(orch: &Orchestrator, channel: Option<&str>, variant: Variant) -> Result<()> {
    let target = orch.deploy_channel(channel, variant)?;
    println!();
    println!("Channel: {}", target.id.cyan());

    let report = orch.deploy(channel, variant)?;
    print_build_result(&report.build);
    if report.push.bootstrapped {
        println!("  {} created remote root", "[NEW]".yellow());
    }
    println!(
        "  {} pushed to {}",
        "[OK]".green(),
        report.push.remote_path.bold()
    );
    println!();
    Ok(())
}

// ============================================================================
// Cleanup
// ============================================================================

fn print_decision(decision: &Decision) {
    for location in &decision.to_delete {
        println!("  {} {}", "[DEL]".red(), location.name);
    }
    for location in &decision.to_preserve {
        println!("  {} {}", "[KEEP]".green(), location.name.dimmed());
    }
}

fn warn_failures<'a>(failures: impl IntoIterator<Item = (&'a str, &'a str)>) {
    let failures: Vec<_> = failures.into_iter().collect();
    if failures.is_empty() {
        return;
    }
    println!();
    println!(
        "{} {} location(s) could not be deleted:",
        "[WARN]".yellow().bold(),
        failures.len()
    );
    for (name, message) in failures {
        println!("  {} {}: {}", "[FAIL]".red(), name, message);
    }
}

fn print_apply_result(result: &ApplyResult) {
    for location in &result.deleted {
        println!("  {} {}", "[DEL]".red(), location.name);
    }
    for location in &result.already_absent {
        println!("  {} {} (already gone)", "[SKIP]".yellow(), location.name);
    }

    match &result.rebuild {
        RebuildOutcome::NotRequested => {}
        RebuildOutcome::Skipped { reason } => {
            println!("  {} rebuild skipped: {}", "[WARN]".yellow(), reason);
        }
        RebuildOutcome::Completed(report) => {
            println!();
            println!("Rebuilding...");
            for build in &report.results {
                print_build_result(build);
            }
        }
    }

    warn_failures(
        result
            .failed
            .iter()
            .map(|(l, m)| (l.name.as_str(), m.as_str())),
    );
}

fn print_delete_report(report: &DeleteReport) {
    for location in &report.succeeded {
        println!("  {} {}", "[DEL]".red(), location.name);
    }
    warn_failures(
        report
            .failed
            .iter()
            .map(|(l, m)| (l.name.as_str(), m.as_str())),
    );
}

fn handle_clean(orch: &Orchestrator, mode: CleanMode, dry_run: bool) -> Result<()> {
    println!();
    println!("Dist: {}", orch.dist_dir().display());

    if dry_run {
        println!("{}", "(dry run)".yellow());
        println!();
        match orch.plan_clean(&mode) {
            Ok(decision) => print_decision(&decision),
            Err(ReleaseError::NotFound { name }) => println!("Nothing to clean: {} not found", name),
            Err(e) => return Err(e),
        }
        println!();
        return Ok(());
    }

    let report = orch.clean(mode)?;
    println!("Policy: {}", report.policy.to_string().cyan());
    println!();

    if report.target_missing {
        println!("Nothing to clean.");
        return Ok(());
    }
    if report.decision.is_noop() {
        println!("Nothing to clean.");
        return Ok(());
    }

    print_apply_result(&report.applied);
    println!();
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    println!();
    println!("{}", prompt);
    print!("Type 'yes' to confirm: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim() == "yes")
}

fn handle_remote(orch: &Orchestrator, action: RemoteAction) -> Result<()> {
    let (mode, dry_run, yes) = match action {
        RemoteAction::Cleanup { dry_run } => {
            println!();
            if dry_run {
                println!("{}", "(dry run)".yellow());
                print_decision(&orch.plan_remote_cleanup()?);
                println!();
                return Ok(());
            }
            let report = orch.remote_cleanup()?;
            if report.decision.to_delete.is_empty() {
                println!("No expired previews.");
            }
            print_delete_report(&report.deleted);
            println!();
            return Ok(());
        }
        RemoteAction::Wipe {
            all,
            safe,
            stable,
            dry_run,
            yes,
        } => {
            let mode = if all {
                WipeMode::All
            } else if safe {
                WipeMode::Safe
            } else if stable {
                WipeMode::KeepStable
            } else {
                WipeMode::Default
            };
            (mode, dry_run, yes)
        }
    };

    println!();
    println!("Policy: {}", mode.policy().to_string().cyan());

    let plan = orch.plan_remote_wipe(mode)?;
    if dry_run {
        println!("{}", "(dry run)".yellow());
        println!();
        print_decision(&plan);
        println!();
        return Ok(());
    }

    if plan.to_delete.is_empty() {
        println!("Nothing to delete.");
        return Ok(());
    }

    if mode == WipeMode::All && !yes {
        let prompt = format!(
            "Delete {} entries from the remote root? This removes stable too.",
            plan.to_delete.len()
        );
        if !confirm(&prompt)? {
            println!("Aborted.");
            return Ok(());
        }
    }

    let report = orch.apply_remote_decision(mode.policy(), plan)?;
    println!();
    print_delete_report(&report.deleted);
    println!();
    Ok(())
}

fn handle_nuke(orch: &Orchestrator, yes: bool) -> Result<()> {
    if !yes {
        let prompt = format!(
            "Delete everything in {} and the whole remote root?",
            orch.dist_dir().display()
        );
        if !confirm(&prompt)? {
            println!("Aborted.");
            return Ok(());
        }
    }

    let report = orch.nuke();
    let complete = report.is_complete();

    println!();
    println!("Local:");
    let local_err = match report.local {
        Ok(result) => {
            print_apply_result(&result);
            None
        }
        Err(e) => {
            println!("  {} {}", "[FAIL]".red().bold(), e);
            Some(e)
        }
    };

    println!("Remote:");
    let remote_err = match report.remote {
        Ok(deleted) => {
            print_delete_report(&deleted);
            None
        }
        Err(e) => {
            println!("  {} {}", "[FAIL]".red().bold(), e);
            Some(e)
        }
    };
    println!();

    match local_err.or(remote_err) {
        Some(e) => Err(e),
        None => {
            if complete {
                println!("{}", "Nuked.".green());
            }
            Ok(())
        }
    }
}

// ============================================================================
// Status
// ============================================================================

fn print_entries(entries: &[StatusEntry]) {
    if entries.is_empty() {
        println!("  (empty)");
        return;
    }
    for entry in entries {
        let name = format!("{:<32}", entry.location.name);
        let name = if entry.protected {
            name.bold()
        } else {
            name.normal()
        };
        let channel = format!("{:<10}", entry.channel.unwrap_or("-"));
        let created = entry.location.created_at.to_string();
        println!("  {} {} {}", name, channel.cyan(), created.dimmed());
    }
}

fn handle_status(orch: &Orchestrator, json: bool) -> Result<()> {
    let status = orch.status()?;

    if json {
        let out = serde_json::to_string_pretty(&status).map_err(io::Error::other)?;
        println!("{}", out);
        return Ok(());
    }

    println!();
    println!("Local ({}):", orch.dist_dir().display());
    print_entries(&status.local);
    println!();

    match &status.remote {
        RemoteStatus::NotConfigured => {
            println!("Remote: {}", "not configured".dimmed());
        }
        RemoteStatus::Unavailable { message } => {
            println!("Remote: {} {}", "[FAIL]".red().bold(), message);
        }
        RemoteStatus::Listed { target, entries } => {
            println!("Remote ({}):", target);
            print_entries(entries);
        }
    }
    println!();
    Ok(())
}

fn handle_channels(orch: &Orchestrator) {
    println!();
    for channel in orch.registry().all() {
        let marker = if channel.protected_by_default {
            " (protected)".yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} {:<9} local: {:<18} remote: {}{}",
            format!("{:<10}", channel.id).cyan().bold(),
            channel.variant.as_str(),
            channel.local_path,
            channel.remote_path,
            marker
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn orchestrator_with_missing_compiler(project: &Path) -> Orchestrator {
        let mut config = Config::default();
        config
            .set("build.command", "css-channels-test-missing-compiler")
            .unwrap();
        config.set("remote.root", "www").unwrap();
        Orchestrator::from_config(&config, project).unwrap()
    }

    #[test]
    fn full_build_with_failures_still_succeeds() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator_with_missing_compiler(temp.path());

        assert!(handle_build(&orch, None, true).is_ok());
        assert_eq!(orch.build_full().failed().len(), 6);
    }

    #[test]
    fn single_build_failure_is_an_error() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator_with_missing_compiler(temp.path());

        let err = handle_build(&orch, Some("stable"), false).unwrap_err();
        assert!(matches!(err, ReleaseError::BuildFailed { ref channel, .. } if channel == "stable"));
    }

    #[test]
    fn confirmed_remote_wipe_removes_planned_entries() {
        let temp = TempDir::new().unwrap();
        for name in ["stable", "latest", "index.html"] {
            std::fs::create_dir_all(temp.path().join("www").join(name)).unwrap();
        }
        let orch = orchestrator_with_missing_compiler(temp.path());

        let action = RemoteAction::Wipe {
            all: true,
            safe: false,
            stable: false,
            dry_run: false,
            yes: true,
        };
        handle_remote(&orch, action).unwrap();
        assert!(std::fs::read_dir(temp.path().join("www")).unwrap().next().is_none());
    }
}
