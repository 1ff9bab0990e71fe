// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: show what would happen
fn dry_run_arg() -> Arg {
    Arg::new("dry_run")
        .long("dry-run")
        .action(ArgAction::SetTrue)
        .help("Show what would be done without writing anything")
}

/// Common argument: canonical package path
fn package_arg() -> Arg {
    Arg::new("package")
        .required(true)
        .help("Canonical package path, e.g. Libraries/Foo/1.0")
}

/// Common argument: proxy directory
fn proxy_dir_arg() -> Arg {
    Arg::new("dir").help("Proxy directory (default: the active proxy)")
}

fn build_cli() -> Command {
    Command::new("sitkit")
        .version(env!("CARGO_PKG_VERSION"))
        .author("sitkit Contributors")
        .about("Manage Software Installation Trees: install, proxy overlays, patchlevels, library indexes")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Verbose output (debug logging)"),
        )
        .arg(Arg::new("tree").long("tree").value_name("DIR").help("Use this tree instead of the active one"))
        .arg(Arg::new("config").long("config").value_name("FILE").help("Config file"))
        .subcommand(
            Command::new("install")
                .about("Install source package(s) into the root, the proxy, or a tarball")
                .arg(Arg::new("dirs").num_args(0..).default_value(".").help("Package source directories"))
                .arg(Arg::new("proxy").long("proxy").action(ArgAction::SetTrue).help("Install into your proxy tree"))
                .arg(Arg::new("tar").long("tar").action(ArgAction::SetTrue).help("Export into a tarball"))
                .arg(Arg::new("output").short('o').long("output").help("Tarball path (with --tar)"))
                .arg(Arg::new("reason").short('r').long("reason").help("Install reason, e.g. \"FIX: crash on empty input\""))
                .arg(Arg::new("yes").short('y').long("yes").action(ArgAction::SetTrue).help("Answer yes to all questions"))
                .arg(dry_run_arg()),
        )
        .subcommand(
            Command::new("uninstall")
                .about("Remove an installed package")
                .arg(package_arg())
                .arg(Arg::new("root").long("root").action(ArgAction::SetTrue).help("Remove from the root tree as well"))
                .arg(dry_run_arg()),
        )
        .subcommand(
            Command::new("deps")
                .about("Show dependencies of a package")
                .arg(Arg::new("package").required(true).help("Package URL or canonical path"))
                .arg(Arg::new("recursive").short('r').long("recursive").action(ArgAction::SetTrue).help("Follow dependencies recursively"))
                .arg(Arg::new("reverse").long("reverse").action(ArgAction::SetTrue).help("Show installed packages depending on PACKAGE"))
                .arg(Arg::new("build").long("build").action(ArgAction::SetTrue).help("Build dependencies"))
                .arg(Arg::new("flat").long("flat").action(ArgAction::SetTrue).help("Flat, de-duplicated list")),
        )
        .subcommand(
            Command::new("orphans")
                .about("List installed packages nothing else depends on")
                .arg(Arg::new("all").short('a').long("all").action(ArgAction::SetTrue).help("Include exempt categories")),
        )
        .subcommand(
            Command::new("bootstrap")
                .about("Create a minimal tree linking a set of packages")
                .arg(Arg::new("dir").required(true).help("Directory of the new tree"))
                .arg(Arg::new("packages").required(true).num_args(1..).help("Package URLs or canonical paths")),
        )
        .subcommand(
            Command::new("libindex")
                .about("Build a library index for a set of packages")
                .arg(Arg::new("packages").num_args(1..).help("Package URLs or canonical paths"))
                .arg(Arg::new("output").short('o').long("output").default_value("LibIndex").help("Output directory"))
                .arg(Arg::new("filter").short('f').long("filter").default_value("libraries").help("libraries, fuse or main"))
                .arg(Arg::new("copy").long("copy").action(ArgAction::SetTrue).help("Copy files instead of symlinking"))
                .arg(Arg::new("remove").long("remove").action(ArgAction::SetTrue).help("Delete the output directory")),
        )
        .subcommand(
            Command::new("clean")
                .about("Remove build directories of a source package")
                .arg(Arg::new("dir").default_value(".").help("Package source directory"))
                .arg(dry_run_arg()),
        )
        .subcommand(Command::new("tree").about("Show the active tree and its root"))
        .subcommand(
            Command::new("proxy")
                .about("Proxy tree management")
                .subcommand(Command::new("create").about("Create a proxy tree").arg(proxy_dir_arg()))
                .subcommand(
                    Command::new("update")
                        .about("Bring the proxy in line with its root")
                        .arg(proxy_dir_arg())
                        .arg(dry_run_arg()),
                )
                .subcommand(
                    Command::new("list")
                        .about("List packages installed locally into the proxy")
                        .arg(proxy_dir_arg()),
                ),
        )
        .subcommand(
            Command::new("patchlevel")
                .about("Patchlevel queries")
                .subcommand(Command::new("next").about("Next patchlevel of a package").arg(package_arg()))
                .subcommand(Command::new("current").about("Current patchlevel of a package").arg(package_arg())),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("sitkit.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
