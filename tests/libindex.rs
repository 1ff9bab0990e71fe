// tests/libindex.rs

//! Integration tests for library indexes over an installed tree.

mod common;

use common::{PLATFORM, make_installed};
use sitkit::deps::{NoSystemPackages, PackageUrl};
use sitkit::install::scan::LINK_ALL_LIBRARIES;
use sitkit::libindex::{self, Filter, LibIndexOptions, LinkMode};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn options() -> LibIndexOptions {
    LibIndexOptions {
        platforms: vec![PLATFORM.to_string()],
        ..Default::default()
    }
}

#[test]
fn test_index_of_closure_is_usable() {
    let tree = TempDir::new().unwrap();
    make_installed(tree.path(), "Applications/App/1.0", &["sit://Libraries/Foo/1.0"]);
    make_installed(tree.path(), "Libraries/Foo/1.0", &["sit://Libraries/Bar/2.1", "deb://zlib1g"]);
    make_installed(tree.path(), "Libraries/Bar/2.1", &[]);

    let urls = vec![PackageUrl::sit("Applications/App/1.0")];
    let result = libindex::build(tree.path(), &urls, Filter::Libraries, &options(), &NoSystemPackages).unwrap();
    assert_eq!(result.packages.len(), 3);
    assert!(result.clashes.is_empty());

    let out = TempDir::new().unwrap();
    let out_dir = out.path().join("LibIndex");
    let report = libindex::materialize(&result.index, LinkMode::Symlink, &out_dir).unwrap();
    assert_eq!(report.written, 3);

    let bar = out_dir.join("lib").join(PLATFORM).join("libBar.so.1.0.0");
    assert_eq!(fs::read_to_string(&bar).unwrap(), "Libraries/Bar/2.1");

    let value = libindex::library_path(&out_dir, &[PLATFORM.to_string()], None);
    assert_eq!(value, out_dir.join("lib").join(PLATFORM).to_string_lossy());
}

#[test]
fn test_link_all_marker_selects_everything() {
    let tree = TempDir::new().unwrap();
    let foo = make_installed(tree.path(), "Libraries/Foo/1.0", &[]);
    let lib = foo.join("lib").join(PLATFORM);
    fs::write(lib.join("plugin.conf"), "").unwrap();

    let urls = vec![PackageUrl::sit("Libraries/Foo/1.0")];
    let plain = libindex::build(tree.path(), &urls, Filter::Libraries, &options(), &NoSystemPackages).unwrap();
    assert!(plain.index.get(Path::new("lib/focal64/plugin.conf")).is_none());

    fs::write(foo.join(LINK_ALL_LIBRARIES), "").unwrap();
    let all = libindex::build(tree.path(), &urls, Filter::Libraries, &options(), &NoSystemPackages).unwrap();
    assert!(all.index.get(Path::new("lib/focal64/plugin.conf")).is_some());
}

#[test]
fn test_fused_copy() {
    let tree = TempDir::new().unwrap();
    let foo = make_installed(tree.path(), "Libraries/Foo/1.0", &[]);
    let bin = foo.join("bin").join(PLATFORM);
    fs::create_dir_all(&bin).unwrap();
    fs::write(bin.join("foo-tool"), "tool").unwrap();

    let urls = vec![PackageUrl::sit("Libraries/Foo/1.0")];
    let result = libindex::build(
        tree.path(),
        &urls,
        Filter::FuseIntoSingleDirectory,
        &options(),
        &NoSystemPackages,
    )
    .unwrap();

    let out = TempDir::new().unwrap();
    libindex::materialize(&result.index, LinkMode::Copy, out.path()).unwrap();
    let fused = out.path().join(PLATFORM);
    assert!(fused.join("foo-tool").is_file());
    assert!(fused.join("libFoo.so.1.0.0").is_file());
}

#[test]
fn test_skip_marker_still_follows_dependencies() {
    let tree = TempDir::new().unwrap();
    let meta = make_installed(tree.path(), "Meta/Bundle/1.0", &["sit://Libraries/Bar/2.1"]);
    make_installed(tree.path(), "Libraries/Bar/2.1", &[]);
    fs::write(meta.join(libindex::SKIP_LIB_INDEX), "").unwrap();

    let urls = vec![PackageUrl::sit("Meta/Bundle/1.0")];
    let result = libindex::build(tree.path(), &urls, Filter::Libraries, &options(), &NoSystemPackages).unwrap();
    assert_eq!(result.packages.len(), 2);
    assert_eq!(result.index.len(), 1);
    assert!(result.index.get(Path::new("lib/focal64/libBar.so.1.0.0")).is_some());
}

#[test]
fn test_same_file_through_version_link_is_not_a_clash() {
    let tree = TempDir::new().unwrap();
    make_installed(tree.path(), "Libraries/Foo/1.0.2", &[]);
    std::os::unix::fs::symlink("1.0.2", tree.path().join("Libraries/Foo/1.0")).unwrap();

    let urls = vec![PackageUrl::sit("Libraries/Foo/1.0"), PackageUrl::sit("Libraries/Foo/1.0.2")];
    let options = LibIndexOptions {
        check_conflicts: false,
        ..options()
    };
    let result = libindex::build(tree.path(), &urls, Filter::Libraries, &options, &NoSystemPackages).unwrap();
    assert!(result.clashes.is_empty());
    assert_eq!(result.index.len(), 1);
}

#[test]
fn test_different_files_clash() {
    let tree = TempDir::new().unwrap();
    make_installed(tree.path(), "Libraries/Foo/1.0", &[]);
    make_installed(tree.path(), "External/Foo/1.0", &[]);

    let urls = vec![PackageUrl::sit("Libraries/Foo/1.0"), PackageUrl::sit("External/Foo/1.0")];
    let result = libindex::build(tree.path(), &urls, Filter::Libraries, &options(), &NoSystemPackages).unwrap();
    assert_eq!(result.clashes.len(), 1);
    let clash = &result.clashes[0];
    assert_eq!(clash.destination, Path::new("lib/focal64/libFoo.so.1.0.0"));
    assert!(clash.kept.starts_with(tree.path().join("Libraries/Foo/1.0")));
    assert!(clash.rejected.starts_with(tree.path().join("External/Foo/1.0")));
}
