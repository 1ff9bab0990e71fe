// src/commands/install.rs
//! Install and tarball export commands

use super::Context;
use anyhow::{Context as _, Result};
use sitkit::install::{InstallEngine, InstallOutcome, Strategy, check_batch_sources};
use sitkit::prompt::{AutoPrompt, Prompt, StdinPrompt};
use std::path::PathBuf;
use tracing::info;

/// Install one or more source packages
pub fn cmd_install(
    ctx: &Context,
    dirs: &[PathBuf],
    strategy: Strategy,
    reason: Option<String>,
    yes: bool,
    dry_run: bool,
) -> Result<()> {
    let location = ctx.location();

    if dirs.len() > 1 {
        info!("Checking {} packages for dependency conflicts", dirs.len());
        check_batch_sources(dirs, location.active_path(), &ctx.probe())
            .context("Refusing to install conflicting packages together")?;
    }

    let mut env = ctx.env.clone();
    if reason.is_some() {
        env.install_reason = reason;
    }

    for dir in dirs {
        let mut auto = AutoPrompt::yes();
        let mut stdin = StdinPrompt;
        let prompt: &mut dyn Prompt = if yes { &mut auto } else { &mut stdin };

        let outcome = InstallEngine::new(dir, strategy.clone(), ctx.config.clone(), env.clone(), prompt)
            .with_dry_run(dry_run)
            .run()
            .with_context(|| format!("Failed to install {}", dir.display()))?;

        print_outcome(&outcome);
    }

    Ok(())
}

fn print_outcome(outcome: &InstallOutcome) {
    let verb = if outcome.dry_run { "Would install" } else { "Installed" };

    match (&outcome.archive, &outcome.target) {
        (Some(archive), _) => {
            println!("{} {} into {}", verb, outcome.identity, archive.display());
        }
        (None, Some(target)) => {
            println!("{} {} into {} ({} files)", verb, outcome.identity, target.display(), outcome.files.len());
        }
        (None, None) => println!("{} {} ({} files)", verb, outcome.identity, outcome.files.len()),
    }

    if outcome.dry_run {
        for file in &outcome.files {
            println!("  {}", file.display());
        }
    }

    if outcome.symlink_updated == Some(false) {
        println!("  version symlink left unchanged");
    }
    for name in &outcome.failed_generators {
        println!("  warning: generator '{}' failed", name);
    }
    for warning in &outcome.warnings {
        println!("  warning: {}", warning);
    }
    if let Some(ledger) = &outcome.ledger {
        println!("  install log: {}", ledger.display());
    }
}
