// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands, PatchlevelCommands, ProxyCommands};
use commands::{Context, LibIndexArgs, ProxyUpdateArgs};
use sitkit::deps::ResolveOptions;
use sitkit::install::Strategy;
use sitkit::libindex::LinkMode;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "sitkit", &mut std::io::stdout());
        return Ok(());
    }

    let ctx = Context::load(cli.config.as_deref(), cli.tree)?;

    match cli.command {
        Commands::Install {
            dirs,
            proxy,
            tar,
            output,
            reason,
            yes,
            dry_run,
        } => {
            let strategy = if tar {
                Strategy::Tar { output }
            } else if proxy {
                Strategy::Proxy
            } else {
                Strategy::Global
            };
            commands::cmd_install(&ctx, &dirs, strategy, reason, yes, dry_run)
        }

        Commands::Uninstall {
            package,
            root,
            dry_run,
        } => commands::cmd_uninstall(&ctx, &package, root, dry_run),

        Commands::Deps {
            package,
            source,
            recursive,
            reverse,
            build,
            system,
            ignore_errors,
            flat,
        } => {
            let options = ResolveOptions {
                recursive,
                ignore_errors,
                highlight_missing: true,
                include_system_packages: system,
                build_dependencies: build,
            };
            commands::cmd_deps(&ctx, &package, source, reverse, flat, options)
        }

        Commands::Orphans { all } => commands::cmd_orphans(&ctx, all),

        Commands::Bootstrap { dir, packages } => commands::cmd_bootstrap(&ctx, &dir, &packages),

        Commands::Libindex {
            packages,
            output,
            filter,
            copy,
            no_deps,
            no_conflict_check,
            remove,
        } => {
            if remove {
                return commands::cmd_libindex_remove(&output);
            }
            let args = LibIndexArgs {
                output: &output,
                filter: filter.into(),
                mode: if copy { LinkMode::Copy } else { LinkMode::Symlink },
                recursive: !no_deps,
                check_conflicts: !no_conflict_check,
            };
            commands::cmd_libindex(&ctx, &packages, args)
        }

        Commands::Clean { dir, dry_run } => commands::cmd_clean(&ctx, &dir, dry_run),

        Commands::Tree { list } => commands::cmd_tree(&ctx, list),

        Commands::Proxy(ProxyCommands::Create { dir, root }) => {
            commands::cmd_proxy_create(&ctx, dir, root)
        }
        Commands::Proxy(ProxyCommands::Update {
            dir,
            keep_broken,
            no_new,
            no_relink,
            remove_installations,
            dry_run,
        }) => {
            let args = ProxyUpdateArgs {
                keep_broken,
                no_new,
                no_relink,
                remove_installations,
                dry_run,
            };
            commands::cmd_proxy_update(&ctx, dir, args)
        }
        Commands::Proxy(ProxyCommands::List { dir }) => commands::cmd_proxy_list(&ctx, dir),

        Commands::Patchlevel(PatchlevelCommands::Next { package }) => {
            commands::cmd_patchlevel_next(&ctx, &package)
        }
        Commands::Patchlevel(PatchlevelCommands::Current { package, all }) => {
            commands::cmd_patchlevel_current(&ctx, &package, all)
        }

        Commands::Completions { .. } => Ok(()),
    }
}
