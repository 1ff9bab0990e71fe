// src/commands/clean.rs
//! Uninstall and build-directory cleanup

use super::{Context, parse_package};
use anyhow::{Context as _, Result};
use sitkit::install::clean;
use std::path::Path;

/// Remove a package from the proxy and optionally the root
pub fn cmd_uninstall(ctx: &Context, package: &str, include_root: bool, dry_run: bool) -> Result<()> {
    let identity = parse_package(package)?;
    let location = ctx.location();

    let removed = clean::uninstall(&identity, &location, include_root, dry_run)
        .with_context(|| format!("Failed to uninstall {}", identity))?;

    if removed.is_empty() {
        println!("{} is not installed", identity);
        return Ok(());
    }
    let verb = if dry_run { "Would remove" } else { "Removed" };
    for path in removed {
        println!("{} {}", verb, path.display());
    }
    Ok(())
}

/// Remove `build/<platform>` directories of a source package
pub fn cmd_clean(ctx: &Context, dir: &Path, dry_run: bool) -> Result<()> {
    clean::require_top_level_dir(dir)?;
    let removed = clean::distclean_build_dirs(dir, &ctx.platforms(), dry_run)
        .with_context(|| format!("Failed to clean {}", dir.display()))?;

    if removed.is_empty() {
        println!("Nothing to clean in {}", dir.display());
    }
    let verb = if dry_run { "Would remove" } else { "Removed" };
    for path in removed {
        println!("{} {}", verb, path.display());
    }
    Ok(())
}
