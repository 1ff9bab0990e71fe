// src/commands/tree.rs
//! Active tree information

use super::Context;
use anyhow::Result;
use sitkit::tree::{self, resolve_parent, resolve_root};

/// Show the active tree, its parent and root
pub fn cmd_tree(ctx: &Context, list: bool) -> Result<()> {
    let location = ctx.location();

    println!("Active tree: {}", location.active_path().display());
    if location.is_proxy() {
        println!("Parent:      {}", resolve_parent(&location).display());
        println!("Root:        {}", resolve_root(&location).display());
    } else {
        println!("(not a proxy)");
    }
    println!("Epoch:       {}", ctx.resolver.epoch());
    println!("Platforms:   {}", ctx.platforms().join(", "));

    if list {
        let packages = tree::list_packages(location.active_path());
        println!("\n{} package entries:", packages.len());
        for package in packages {
            println!("  {}", package);
        }
    }
    Ok(())
}
