// src/cli/mod.rs
//! CLI definitions for sitkit
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.
//!
//! Primary commands:
//! - `install` - Install source package(s) into the root, the proxy, or a tarball
//! - `uninstall` - Remove a package from the proxy (and optionally the root)
//! - `deps` - Show (reverse) dependencies of a package
//! - `libindex` - Build a fused library directory for a package set
//! - `clean` - Remove build directories of a source package
//! - `tree` - Show the active tree
//!
//! Management contexts:
//! - `proxy` - Proxy tree creation and maintenance
//! - `patchlevel` - Patchlevel queries

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

mod patchlevel;
mod proxy;

pub use patchlevel::PatchlevelCommands;
pub use proxy::ProxyCommands;

#[derive(Parser)]
#[command(name = "sitkit")]
#[command(author, version)]
#[command(about = "Manage Software Installation Trees: install, proxy overlays, patchlevels, library indexes", long_about = None)]
pub struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use this tree instead of the active one (overrides $SIT)
    #[arg(long, global = true, value_name = "DIR")]
    pub tree: Option<PathBuf>,

    /// Config file (overrides $SITKIT_CONFIG)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install source package(s)
    ///
    /// Without flags the package goes into the root tree, which requires a
    /// clean working tree and an install reason. Several directories are
    /// checked for dependency conflicts before the first one is installed.
    Install {
        /// Top-level package source directories
        #[arg(default_value = ".")]
        dirs: Vec<PathBuf>,

        /// Install into your proxy tree instead of the root
        #[arg(long, conflicts_with = "tar")]
        proxy: bool,

        /// Export into a tarball instead of a tree
        #[arg(long)]
        tar: bool,

        /// Tarball path (with --tar)
        #[arg(short, long, requires = "tar")]
        output: Option<PathBuf>,

        /// Install reason, e.g. "FIX: crash on empty input"
        #[arg(short, long)]
        reason: Option<String>,

        /// Answer yes to all questions
        #[arg(short, long)]
        yes: bool,

        /// Show what would be installed without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove an installed package
    Uninstall {
        /// Canonical package path, e.g. Libraries/Foo/1.0
        package: String,

        /// Remove from the root tree as well
        #[arg(long)]
        root: bool,

        /// Show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Show dependencies of a package
    Deps {
        /// Package URL or canonical path; a source directory with --source
        package: String,

        /// Treat PACKAGE as a source directory and read its metadata
        #[arg(long)]
        source: bool,

        /// Follow dependencies recursively
        #[arg(short, long)]
        recursive: bool,

        /// Show installed packages depending on PACKAGE instead
        #[arg(long, conflicts_with_all = ["recursive", "build"])]
        reverse: bool,

        /// Build dependencies instead of runtime dependencies
        #[arg(long)]
        build: bool,

        /// Include system packages (deb://)
        #[arg(long)]
        system: bool,

        /// Keep going when a dependency is missing
        #[arg(long)]
        ignore_errors: bool,

        /// Print a flat, de-duplicated list instead of a tree
        #[arg(long)]
        flat: bool,
    },

    /// List installed packages nothing else depends on
    Orphans {
        /// Include categories whose packages normally have no dependents
        #[arg(short, long)]
        all: bool,
    },

    /// Create a minimal tree linking a set of packages and their dependencies
    Bootstrap {
        /// Directory of the new tree; must not exist
        dir: PathBuf,

        /// Package URLs or canonical paths
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Build a library index for a set of packages
    Libindex {
        /// Package URLs or canonical paths
        #[arg(required_unless_present = "remove")]
        packages: Vec<String>,

        /// Output directory
        #[arg(short, long, default_value = sitkit::libindex::DEFAULT_OUTPUT_DIR)]
        output: PathBuf,

        /// Which files to index
        #[arg(short, long, value_enum, default_value = "libraries")]
        filter: FilterArg,

        /// Copy files instead of symlinking
        #[arg(long)]
        copy: bool,

        /// Index only the listed packages, not their dependencies
        #[arg(long)]
        no_deps: bool,

        /// Skip the dependency version conflict check
        #[arg(long)]
        no_conflict_check: bool,

        /// Delete the output directory instead of building it
        #[arg(long, conflicts_with = "packages")]
        remove: bool,
    },

    /// Remove build directories of a source package
    Clean {
        /// Top-level package source directory
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the active tree and its root
    Tree {
        /// Also list installed packages
        #[arg(short, long)]
        list: bool,
    },

    /// Proxy tree management
    #[command(subcommand)]
    Proxy(ProxyCommands),

    /// Patchlevel queries
    #[command(subcommand)]
    Patchlevel(PatchlevelCommands),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FilterArg {
    /// Shared libraries, layout kept
    Libraries,
    /// Everything fused into <platform>/
    Fuse,
    /// Libraries and executables, layout kept
    Main,
}

impl From<FilterArg> for sitkit::libindex::Filter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::Libraries => Self::Libraries,
            FilterArg::Fuse => Self::FuseIntoSingleDirectory,
            FilterArg::Main => Self::MainPackage,
        }
    }
}
