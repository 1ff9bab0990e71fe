// src/commands/mod.rs
//! Command handlers for the sitkit CLI

mod clean;
mod deps;
mod install;
mod libindex;
mod patchlevel;
mod proxy;
mod tree;

pub use clean::{cmd_clean, cmd_uninstall};
pub use deps::{cmd_bootstrap, cmd_deps, cmd_orphans};
pub use install::cmd_install;
pub use libindex::{LibIndexArgs, cmd_libindex, cmd_libindex_remove};
pub use patchlevel::{cmd_patchlevel_current, cmd_patchlevel_next};
pub use proxy::{ProxyUpdateArgs, cmd_proxy_create, cmd_proxy_list, cmd_proxy_update};
pub use tree::cmd_tree;

use anyhow::{Context as _, Result};
use sitkit::deps::DpkgProbe;
use sitkit::{Config, Environment, PackageIdentity, SitLocation, TreeResolver};
use std::path::{Path, PathBuf};

/// Settings shared by all handlers
pub struct Context {
    pub config: Config,
    pub env: Environment,
    pub resolver: TreeResolver,
}

impl Context {
    pub fn load(config_path: Option<&Path>, tree: Option<PathBuf>) -> Result<Self> {
        let config = match config_path {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => Config::load().context("Failed to load config")?,
        };
        let env = Environment::capture().context("Invalid environment")?;

        let mut resolver = TreeResolver::from_config(&config, &env);
        if tree.is_some() {
            resolver = resolver.with_override(tree);
        }

        Ok(Self {
            config,
            env,
            resolver,
        })
    }

    pub fn location(&self) -> SitLocation {
        self.resolver.resolve_active_tree()
    }

    pub fn platforms(&self) -> Vec<String> {
        self.config.platforms(&self.env)
    }

    /// System package lookups, bounded by the configured subprocess timeout
    pub fn probe(&self) -> DpkgProbe {
        DpkgProbe::new(self.config.hook_timeout())
    }
}

/// Parse a canonical package path given on the command line
pub(crate) fn parse_package(package: &str) -> Result<PackageIdentity> {
    sitkit::path::parse_canonical_path(package.trim_start_matches("sit://"))
        .with_context(|| format!("'{}' is not a package path", package))
}
