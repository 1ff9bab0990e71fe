// src/commands/deps.rs
//! Dependency queries

use super::Context;
use anyhow::{Context as _, Result};
use sitkit::deps::{DependencyCache, DependencyResolver, PackageUrl, ResolveOptions};
use sitkit::install::{load_source_info, package_identity};
use sitkit::metadata::PkgInfo;
use sitkit::tree::bootstrap::bootstrap_tree;
use std::path::Path;

/// Show the dependencies (or reverse dependencies) of a package
pub fn cmd_deps(
    ctx: &Context,
    package: &str,
    source: bool,
    reverse: bool,
    flat: bool,
    options: ResolveOptions,
) -> Result<()> {
    let location = ctx.location();
    let probe = ctx.probe();
    let resolver = DependencyResolver::new(location.active_path(), &probe);
    let mut cache = DependencyCache::new();

    let url = if source {
        source_url(Path::new(package), &mut cache)?
    } else {
        PackageUrl::parse(package).with_context(|| format!("Invalid package URL '{}'", package))?
    };

    if reverse {
        let users = resolver.reverse_dependencies(&url, &mut cache);
        if users.is_empty() {
            println!("No installed package depends on {}", url);
        }
        for user in users {
            println!("{}", user);
        }
        return Ok(());
    }

    let tree = resolver
        .resolve(&url, &options, &mut cache)
        .with_context(|| format!("Failed to resolve dependencies of {}", url))?;

    if flat {
        for dep in tree.unique() {
            println!("{}", dep);
        }
    } else {
        print!("{}", tree);
    }

    let missing = tree.missing();
    if !missing.is_empty() {
        println!("\n{} missing dependencies", missing.len());
    }
    Ok(())
}

/// List installed packages without dependents, with their maintainers
pub fn cmd_orphans(ctx: &Context, all: bool) -> Result<()> {
    let location = ctx.location();
    let probe = ctx.probe();
    let resolver = DependencyResolver::new(location.active_path(), &probe);

    for orphan in resolver.orphans(all, &mut DependencyCache::new()) {
        let info = PkgInfo::load_or_default(&resolver.tree().join(&orphan.path));
        let maintainer = info.maintainer.as_deref().unwrap_or("unknown");
        println!("{} ({})", orphan.path, maintainer);
    }
    Ok(())
}

/// Create a minimal tree at `dir` holding `packages` and their closure
pub fn cmd_bootstrap(ctx: &Context, dir: &Path, packages: &[String]) -> Result<()> {
    let urls = packages
        .iter()
        .map(|p| PackageUrl::parse(p).with_context(|| format!("Invalid package URL '{}'", p)))
        .collect::<Result<Vec<_>>>()?;

    let location = ctx.location();
    let probe = ctx.probe();
    let resolver = DependencyResolver::new(location.active_path(), &probe);
    let linked = bootstrap_tree(&resolver, dir, &urls, &mut DependencyCache::new())
        .with_context(|| format!("Failed to bootstrap {}", dir.display()))?;

    println!("Linked {} package(s) into {}", linked.len(), dir.display());
    Ok(())
}

/// URL of a source package, with its metadata pre-loaded into `cache`
fn source_url(dir: &Path, cache: &mut DependencyCache) -> Result<PackageUrl> {
    let info = load_source_info(dir)?;
    let identity = package_identity(dir, &info)?;
    let url = PackageUrl::sit(&identity.canonical_path());

    for (build, list) in [(false, &info.depends), (true, &info.build_depends)] {
        let urls = list
            .iter()
            .map(|d| PackageUrl::parse(d))
            .collect::<sitkit::Result<Vec<_>>>()
            .with_context(|| format!("Invalid dependency in {}", dir.display()))?;
        cache.seed(&url, build, urls);
    }
    Ok(url)
}
