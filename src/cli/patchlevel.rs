// src/cli/patchlevel.rs
//! Patchlevel commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum PatchlevelCommands {
    /// Patchlevel the next install of a package would get
    Next {
        /// Canonical package path, e.g. Libraries/Foo/1.0
        package: String,
    },

    /// Patchlevel the current-version link points at
    Current {
        /// Canonical package path, e.g. Libraries/Foo/1.0
        package: String,

        /// Also list all installed patchlevels
        #[arg(short, long)]
        all: bool,
    },
}
