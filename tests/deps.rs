// tests/deps.rs

//! Integration tests for dependency resolution against a tree.

mod common;

use common::make_installed;
use sitkit::deps::{DependencyCache, DependencyResolver, NoSystemPackages, PackageUrl, ResolveOptions};
use sitkit::tree::bootstrap::bootstrap_tree;
use sitkit::Error;
use tempfile::TempDir;

fn url(s: &str) -> PackageUrl {
    PackageUrl::parse(s).unwrap()
}

/// App -> Foo -> Bar, App -> deb://zlib1g
fn setup_tree() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let tree = temp_dir.path();
    make_installed(tree, "Applications/App/1.0", &["sit://Libraries/Foo/1.0", "deb://zlib1g"]);
    make_installed(tree, "Libraries/Foo/1.0", &["sit://Libraries/Bar/2.1"]);
    make_installed(tree, "Libraries/Bar/2.1", &[]);
    temp_dir
}

#[test]
fn test_recursive_closure() {
    let temp_dir = setup_tree();
    let resolver = DependencyResolver::new(temp_dir.path(), &NoSystemPackages);
    let mut cache = DependencyCache::new();

    let options = ResolveOptions {
        recursive: true,
        ..Default::default()
    };
    let tree = resolver.resolve(&url("Applications/App/1.0"), &options, &mut cache).unwrap();
    assert_eq!(
        tree.flatten(),
        vec![url("Libraries/Foo/1.0"), url("Libraries/Bar/2.1")]
    );

    // a warm cache answers without touching the filesystem
    let reads = cache.reads();
    let again = resolver.resolve(&url("Applications/App/1.0"), &options, &mut cache).unwrap();
    assert_eq!(again, tree);
    assert_eq!(cache.reads(), reads);
}

#[test]
fn test_direct_list_with_system_packages() {
    let temp_dir = setup_tree();
    let resolver = DependencyResolver::new(temp_dir.path(), &NoSystemPackages);
    let options = ResolveOptions {
        include_system_packages: true,
        ..Default::default()
    };

    let tree = resolver
        .resolve(&url("Applications/App/1.0"), &options, &mut DependencyCache::new())
        .unwrap();
    assert_eq!(tree.flatten(), vec![url("Libraries/Foo/1.0"), url("deb://zlib1g")]);
}

#[test]
fn test_missing_dependency() {
    let temp_dir = setup_tree();
    make_installed(temp_dir.path(), "Applications/Broken/1.0", &["sit://Libraries/Gone/0.1"]);
    let resolver = DependencyResolver::new(temp_dir.path(), &NoSystemPackages);

    let strict = ResolveOptions {
        recursive: true,
        ..Default::default()
    };
    match resolver.resolve(&url("Applications/Broken/1.0"), &strict, &mut DependencyCache::new()) {
        Err(Error::DependencyMissing { dependency, .. }) => {
            assert_eq!(dependency, "sit://Libraries/Gone/0.1");
        }
        other => panic!("expected DependencyMissing, got {:?}", other),
    }

    let lenient = ResolveOptions {
        ignore_errors: true,
        highlight_missing: true,
        ..strict
    };
    let tree = resolver
        .resolve(&url("Applications/Broken/1.0"), &lenient, &mut DependencyCache::new())
        .unwrap();
    assert_eq!(tree.missing(), vec![url("Libraries/Gone/0.1")]);
}

#[test]
fn test_reverse_dependencies() {
    let temp_dir = setup_tree();
    let resolver = DependencyResolver::new(temp_dir.path(), &NoSystemPackages);

    let users = resolver.reverse_dependencies(&url("Libraries/Bar/2.1"), &mut DependencyCache::new());
    assert_eq!(users, vec![url("Libraries/Foo/1.0")]);
}

#[test]
fn test_orphans_skip_exempt_categories() {
    let temp_dir = setup_tree();
    make_installed(temp_dir.path(), "Libraries/Leftover/0.3", &[]);
    let resolver = DependencyResolver::new(temp_dir.path(), &NoSystemPackages);
    let mut cache = DependencyCache::new();

    assert_eq!(resolver.orphans(false, &mut cache), vec![url("Libraries/Leftover/0.3")]);
    assert_eq!(
        resolver.orphans(true, &mut cache),
        vec![url("Applications/App/1.0"), url("Libraries/Leftover/0.3")]
    );
}

#[test]
fn test_bootstrapped_tree_resolves_like_its_source() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("source");
    make_installed(&source, "Applications/App/1.0", &["sit://Libraries/Foo/1.0", "deb://zlib1g"]);
    make_installed(&source, "Libraries/Foo/1.0", &["sit://Libraries/Bar/2.1"]);
    make_installed(&source, "Libraries/Bar/2.1", &[]);
    make_installed(&source, "Libraries/Leftover/0.3", &[]);

    let target = temp_dir.path().join("minimal");
    let resolver = DependencyResolver::new(&source, &NoSystemPackages);
    let linked = bootstrap_tree(&resolver, &target, &[url("Applications/App/1.0")], &mut DependencyCache::new())
        .unwrap();
    assert_eq!(linked.len(), 3);

    let options = ResolveOptions {
        recursive: true,
        ..Default::default()
    };
    let minimal = DependencyResolver::new(&target, &NoSystemPackages);
    let tree = minimal.resolve(&url("Applications/App/1.0"), &options, &mut DependencyCache::new()).unwrap();
    assert_eq!(tree.flatten(), vec![url("Libraries/Foo/1.0"), url("Libraries/Bar/2.1")]);
    assert!(!minimal.is_installed(&url("Libraries/Leftover/0.3"), &mut DependencyCache::new()));
}

/// X -> Y, Zed; Y -> X
fn setup_cycle() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let tree = temp_dir.path();
    make_installed(tree, "Libraries/X/1.0", &["sit://Libraries/Y/1.0", "sit://Libraries/Zed/1.0"]);
    make_installed(tree, "Libraries/Y/1.0", &["sit://Libraries/X/1.0"]);
    make_installed(tree, "Libraries/Zed/1.0", &[]);
    temp_dir
}

#[test]
fn test_cycle_does_not_poison_shared_cache() {
    let temp_dir = setup_cycle();
    let resolver = DependencyResolver::new(temp_dir.path(), &NoSystemPackages);
    let options = ResolveOptions {
        recursive: true,
        ..Default::default()
    };

    let fresh = resolver
        .resolve(&url("Libraries/Y/1.0"), &options, &mut DependencyCache::new())
        .unwrap();
    assert_eq!(
        fresh.flatten(),
        vec![url("Libraries/X/1.0"), url("Libraries/Y/1.0"), url("Libraries/Zed/1.0")]
    );

    let mut cache = DependencyCache::new();
    resolver.resolve(&url("Libraries/X/1.0"), &options, &mut cache).unwrap();
    let shared = resolver.resolve(&url("Libraries/Y/1.0"), &options, &mut cache).unwrap();
    assert_eq!(shared, fresh);
}

#[test]
fn test_closure_map_independent_of_order() {
    let temp_dir = setup_cycle();
    let resolver = DependencyResolver::new(temp_dir.path(), &NoSystemPackages);
    let options = ResolveOptions {
        recursive: true,
        ..Default::default()
    };
    let x = url("Libraries/X/1.0");
    let y = url("Libraries/Y/1.0");

    let forward = resolver
        .closure_map(&[x.clone(), y.clone()], &options, &mut DependencyCache::new())
        .unwrap();
    let backward = resolver
        .closure_map(&[y, x], &options, &mut DependencyCache::new())
        .unwrap();
    assert_eq!(forward, backward);
}
