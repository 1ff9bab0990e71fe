// src/commands/libindex.rs
//! Library index command

use super::Context;
use anyhow::{Context as _, Result};
use sitkit::deps::PackageUrl;
use sitkit::libindex::{self, Filter, LibIndexOptions, LinkMode};
use std::path::Path;

/// Options of `sitkit libindex` besides the package list
pub struct LibIndexArgs<'a> {
    pub output: &'a Path,
    pub filter: Filter,
    pub mode: LinkMode,
    pub recursive: bool,
    pub check_conflicts: bool,
}

/// Build and write a library index
pub fn cmd_libindex(ctx: &Context, packages: &[String], args: LibIndexArgs<'_>) -> Result<()> {
    let urls = packages
        .iter()
        .map(|p| PackageUrl::parse(p).with_context(|| format!("Invalid package URL '{}'", p)))
        .collect::<Result<Vec<_>>>()?;

    let location = ctx.location();
    let platforms = ctx.platforms();
    let options = LibIndexOptions {
        recursive: args.recursive,
        check_conflicts: args.check_conflicts,
        platforms: platforms.clone(),
    };

    let result = libindex::build(location.active_path(), &urls, args.filter, &options, &ctx.probe())
        .context("Failed to build library index")?;

    let report = libindex::materialize(&result.index, args.mode, args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!(
        "{} entries from {} package(s) in {}",
        result.index.len(),
        result.packages.len(),
        args.output.display()
    );
    let clashes = result.clashes.len() + report.clashes.len();
    if clashes > 0 {
        println!("{} library name clash(es), see log for details", clashes);
    }

    let output = std::fs::canonicalize(args.output).unwrap_or_else(|_| args.output.to_path_buf());
    let current = std::env::var("LD_LIBRARY_PATH").ok();
    println!(
        "export LD_LIBRARY_PATH={}",
        libindex::library_path(&output, &platforms, current.as_deref())
    );
    Ok(())
}

/// Delete a library index
pub fn cmd_libindex_remove(output: &Path) -> Result<()> {
    libindex::remove(output).with_context(|| format!("Failed to remove {}", output.display()))?;
    println!("Removed {}", output.display());
    Ok(())
}
