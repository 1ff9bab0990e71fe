// src/cli/proxy.rs
//! Proxy tree commands

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum ProxyCommands {
    /// Create a proxy tree linking every package of the root
    Create {
        /// Proxy directory (default: the configured proxy for this epoch)
        dir: Option<PathBuf>,

        /// Root tree to link against (default: the configured root)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Bring the proxy in line with its root
    Update {
        /// Proxy directory (default: the active proxy)
        dir: Option<PathBuf>,

        /// Keep broken symlinks
        #[arg(long)]
        keep_broken: bool,

        /// Do not link packages new in the root
        #[arg(long)]
        no_new: bool,

        /// Do not re-link outdated version links
        #[arg(long)]
        no_relink: bool,

        /// Delete packages installed locally into the proxy
        #[arg(long)]
        remove_installations: bool,

        /// Show what would change
        #[arg(long)]
        dry_run: bool,
    },

    /// List packages installed locally into the proxy
    List {
        /// Proxy directory (default: the active proxy)
        dir: Option<PathBuf>,
    },
}
