// src/commands/proxy.rs
//! Proxy tree commands

use super::Context;
use anyhow::{Context as _, Result, anyhow};
use sitkit::tree::proxy::{self, UpdateOptions};
use std::path::PathBuf;

/// Flags of `sitkit proxy update`
pub struct ProxyUpdateArgs {
    pub keep_broken: bool,
    pub no_new: bool,
    pub no_relink: bool,
    pub remove_installations: bool,
    pub dry_run: bool,
}

pub fn cmd_proxy_create(ctx: &Context, dir: Option<PathBuf>, root: Option<PathBuf>) -> Result<()> {
    let proxy = match dir {
        Some(dir) => dir,
        None => ctx
            .resolver
            .default_proxy()
            .ok_or_else(|| anyhow!("No proxy directory configured and no home directory found"))?,
    };
    let root = root.unwrap_or_else(|| ctx.resolver.default_root());

    let linked = proxy::create_proxy(&root, &proxy)
        .with_context(|| format!("Failed to create proxy {}", proxy.display()))?;
    println!("Created proxy {} for {} ({} packages)", proxy.display(), root.display(), linked);
    Ok(())
}

pub fn cmd_proxy_update(ctx: &Context, dir: Option<PathBuf>, args: ProxyUpdateArgs) -> Result<()> {
    let proxy = proxy_dir(ctx, dir)?;
    let options = UpdateOptions {
        remove_broken_links: !args.keep_broken,
        link_new_packages: !args.no_new,
        relink_outdated: !args.no_relink,
        remove_proxy_installations: args.remove_installations,
        expected_root: Some(ctx.resolver.default_root()).filter(|root| root.is_dir()),
        dry_run: args.dry_run,
        ..UpdateOptions::default()
    };

    let report = proxy::update_proxy(&proxy, &options)
        .with_context(|| format!("Failed to update proxy {}", proxy.display()))?;

    if report.is_empty() {
        println!("Proxy {} is up to date", proxy.display());
        return Ok(());
    }

    let prefix = if args.dry_run { "would " } else { "" };
    if report.parent_relinked {
        println!("{}re-point parent link", prefix);
    }
    for path in report.removed_broken.iter().chain(&report.removed_empty) {
        println!("{}remove {}", prefix, path.display());
    }
    for package in &report.linked {
        println!("{}link {}", prefix, package);
    }
    for package in &report.relinked {
        println!("{}relink {}", prefix, package);
    }
    for package in &report.removed_installations {
        println!("{}remove proxy installation {}", prefix, package);
    }
    Ok(())
}

pub fn cmd_proxy_list(ctx: &Context, dir: Option<PathBuf>) -> Result<()> {
    let proxy = proxy_dir(ctx, dir)?;
    let found = proxy::find_proxy_installations(&proxy);
    if found.is_empty() {
        println!("No packages installed into {}", proxy.display());
    }
    for package in found {
        println!("{}", package);
    }
    Ok(())
}

fn proxy_dir(ctx: &Context, dir: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = dir {
        return Ok(dir);
    }
    let location = ctx.location();
    location
        .proxy_path
        .clone()
        .ok_or_else(|| anyhow!("{} is not a proxy tree", location.active_path().display()))
}
