// src/commands/patchlevel.rs
//! Patchlevel queries

use super::{Context, parse_package};
use anyhow::Result;
use sitkit::PatchlevelManager;
use sitkit::tree::active_patchlevel;

/// Print the patchlevel the next global install would get
pub fn cmd_patchlevel_next(ctx: &Context, package: &str) -> Result<()> {
    let identity = parse_package(package)?;
    let location = ctx.location();
    let manager = PatchlevelManager::new(&location.root_path, ctx.env.patchlevel);
    println!("{}", manager.allocate(&identity));
    Ok(())
}

/// Print the patchlevel the current-version link points at
pub fn cmd_patchlevel_current(ctx: &Context, package: &str, all: bool) -> Result<()> {
    let identity = parse_package(package)?;
    let location = ctx.location();

    match active_patchlevel(location.active_path(), &identity) {
        Some(pl) => println!("{}: {}.{}", identity, identity.version, pl),
        None => println!("{}: no patchlevel", identity),
    }

    if all {
        let manager = PatchlevelManager::new(&location.root_path, None);
        for pl in manager.existing_patchlevels(&identity) {
            println!("  {}.{}", identity.version, pl);
        }
    }
    Ok(())
}
