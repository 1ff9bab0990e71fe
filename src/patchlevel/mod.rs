// src/patchlevel/mod.rs

//! Patchlevel bookkeeping
//!
//! Packages that opt into patchlevels are installed side by side as
//! `<name>/<major>.<minor>.<patchlevel>`; the plain `<major>.<minor>` entry
//! is a symlink to the one users should get ("current version").
//!
//! ```text
//! Libraries/Foo/1.0   -> 1.0.2
//! Libraries/Foo/1.0.0
//! Libraries/Foo/1.0.1
//! Libraries/Foo/1.0.2
//! ```
//!
//! Allocation lists the existing siblings, so two concurrent installs of the
//! same version could pick the same number. [`PatchlevelManager::reserve`]
//! serializes them with an exclusive lock file next to the versions.

use crate::error::{Error, Result};
use crate::path::PackageIdentity;
use crate::prompt::Prompt;
use crate::tree::SitLocation;
use crate::tree::proxy::remove_path;
use fs2::FileExt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Allocates patchlevels and maintains current-version links in one tree
#[derive(Debug, Clone)]
pub struct PatchlevelManager {
    tree: PathBuf,
    pin: Option<u32>,
}

/// A patchlevel held under an exclusive lock
///
/// The lock is released on drop or through [`Reservation::release`].
#[derive(Debug)]
pub struct Reservation {
    pub patchlevel: u32,
    lock_path: PathBuf,
    file: File,
}

impl Reservation {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn release(self) -> Result<()> {
        FileExt::unlock(&self.file)
            .map_err(|e| Error::IoError(format!("Failed to release {:?}: {}", self.lock_path, e)))?;
        debug!("Released patchlevel lock {:?}", self.lock_path);
        Ok(())
    }
}

impl PatchlevelManager {
    /// `pin` (from `SIT_PATCHLEVEL`) overrides allocation when set
    pub fn new(tree: impl Into<PathBuf>, pin: Option<u32>) -> Self {
        Self {
            tree: tree.into(),
            pin,
        }
    }

    pub fn tree(&self) -> &Path {
        &self.tree
    }

    /// `<tree>/<category>/<name>`
    fn package_dir(&self, identity: &PackageIdentity) -> PathBuf {
        self.tree.join(&identity.category).join(&identity.name)
    }

    /// Patchlevels installed for the identity's major.minor, ascending
    pub fn existing_patchlevels(&self, identity: &PackageIdentity) -> Vec<u32> {
        let prefix = format!("{}.", identity.version);
        let entries = match fs::read_dir(self.package_dir(identity)) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut levels: Vec<u32> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.strip_prefix(&prefix)?.parse::<u32>().ok()
            })
            .collect();
        levels.sort_unstable();
        levels.dedup();
        levels
    }

    /// Next patchlevel: the pin, else `max + 1`, else `0`
    pub fn allocate(&self, identity: &PackageIdentity) -> u32 {
        if let Some(pin) = self.pin {
            debug!("Using pinned patchlevel {} for {}", pin, identity);
            return pin;
        }
        let next = self
            .existing_patchlevels(identity)
            .last()
            .map_or(0, |max| max + 1);
        debug!("Auto-detected patchlevel {} for {}", next, identity);
        next
    }

    /// Lock `<package dir>/.<version>.patchlevel.lock`, then allocate
    ///
    /// Blocks while another install of the same version holds the lock.
    pub fn reserve(&self, identity: &PackageIdentity) -> Result<Reservation> {
        let dir = self.package_dir(identity);
        fs::create_dir_all(&dir)?;
        let lock_path = dir.join(format!(".{}.patchlevel.lock", identity.version));

        let file = File::create(&lock_path)?;
        file.lock_exclusive()
            .map_err(|e| Error::IoError(format!("Failed to lock {:?}: {}", lock_path, e)))?;
        debug!("Acquired patchlevel lock {:?}", lock_path);

        let patchlevel = self.allocate(identity);
        Ok(Reservation {
            patchlevel,
            lock_path,
            file,
        })
    }

    /// Non-blocking [`reserve`](Self::reserve); `None` if the lock is taken
    pub fn try_reserve(&self, identity: &PackageIdentity) -> Result<Option<Reservation>> {
        let dir = self.package_dir(identity);
        fs::create_dir_all(&dir)?;
        let lock_path = dir.join(format!(".{}.patchlevel.lock", identity.version));

        let file = File::create(&lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                let patchlevel = self.allocate(identity);
                Ok(Some(Reservation {
                    patchlevel,
                    lock_path,
                    file,
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("Patchlevel lock {:?} is held elsewhere", lock_path);
                Ok(None)
            }
            Err(e) => Err(Error::IoError(format!("Failed to lock {:?}: {}", lock_path, e))),
        }
    }

    /// Point `<version>` at `<version>.<patchlevel>` after asking `prompt`
    ///
    /// Returns `false` and leaves the link alone when the answer is no.
    #[cfg(unix)]
    pub fn update_current_symlink(
        &self,
        identity: &PackageIdentity,
        patchlevel: u32,
        prompt: &mut dyn Prompt,
    ) -> Result<bool> {
        let link = self.tree.join(identity.canonical_path());
        let target = format!("{}.{}", identity.version, patchlevel);

        let question = format!("Update symlink {} --> {}?", identity.version, target);
        if !prompt.confirm(&question, true) {
            info!("Keeping existing version symlink {:?}", link);
            return Ok(false);
        }

        info!("Updating version symlink {:?} -> {}", link, target);
        replace_symlink(Path::new(&target), &link)?;
        Ok(true)
    }

    /// Mirror a fresh root install into the user's proxy
    ///
    /// Whatever the proxy had at the canonical path (a stale link or a
    /// proxy-local installation) is replaced by a link into the root.
    #[cfg(unix)]
    pub fn propagate_to_proxy(
        &self,
        identity: &PackageIdentity,
        patchlevel: Option<u32>,
        location: &SitLocation,
    ) -> Result<()> {
        let Some(proxy) = &location.proxy_path else {
            debug!("No proxy tree, nothing to propagate");
            return Ok(());
        };

        let canonical = identity.canonical_path();
        let link = proxy.join(&canonical);
        if fs::symlink_metadata(&link).is_ok() {
            debug!("rm -r {:?}", link);
            remove_path(&link)?;
        }
        replace_symlink(&location.root_path.join(&canonical), &link)?;

        if let Some(pl) = patchlevel {
            let versioned = format!("{}.{}", canonical, pl);
            replace_symlink(&location.root_path.join(&versioned), &proxy.join(&versioned))?;
        }

        info!("Linked {} into proxy {:?}", canonical, proxy);
        Ok(())
    }
}

/// Atomically make `link` a symlink to `target`
///
/// The new link is created under a temporary name and renamed over the old
/// one. A real directory at `link` is refused.
#[cfg(unix)]
pub(crate) fn replace_symlink(target: &Path, link: &Path) -> Result<()> {
    let parent = link
        .parent()
        .ok_or_else(|| Error::InvalidPath(format!("{} has no parent", link.display())))?;
    fs::create_dir_all(parent)?;

    if let Ok(meta) = fs::symlink_metadata(link)
        && meta.is_dir()
    {
        return Err(Error::InvalidPath(format!(
            "{} is a directory, not a version symlink",
            link.display()
        )));
    }

    let name = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(".{}.tmp-{}", name, uuid::Uuid::new_v4()));

    std::os::unix::fs::symlink(target, &temp)?;
    if let Err(e) = fs::rename(&temp, link) {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::path::parse_canonical_path;
    use crate::prompt::AutoPrompt;
    use tempfile::TempDir;

    fn foo() -> PackageIdentity {
        parse_canonical_path("Libraries/Foo/1.0").unwrap()
    }

    #[test]
    fn test_allocate_empty_is_zero() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PatchlevelManager::new(temp_dir.path(), None);
        assert_eq!(manager.allocate(&foo()), 0);
    }

    #[test]
    fn test_allocate_after_max() {
        let temp_dir = TempDir::new().unwrap();
        for dir in ["1.0.0", "1.0.1", "1.0.3", "1.1.7", "1.0_exp"] {
            fs::create_dir_all(temp_dir.path().join("Libraries/Foo").join(dir)).unwrap();
        }
        let manager = PatchlevelManager::new(temp_dir.path(), None);
        assert_eq!(manager.existing_patchlevels(&foo()), vec![0, 1, 3]);
        assert_eq!(manager.allocate(&foo()), 4);
    }

    #[test]
    fn test_pin_wins() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("Libraries/Foo/1.0.5")).unwrap();
        let manager = PatchlevelManager::new(temp_dir.path(), Some(2));
        assert_eq!(manager.allocate(&foo()), 2);
    }

    #[test]
    fn test_reservation_excludes_second_holder() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PatchlevelManager::new(temp_dir.path(), None);

        let held = manager.reserve(&foo()).unwrap();
        assert_eq!(held.patchlevel, 0);
        assert!(held.lock_path().exists());
        assert!(manager.try_reserve(&foo()).unwrap().is_none());

        held.release().unwrap();
        assert!(manager.try_reserve(&foo()).unwrap().is_some());
    }

    #[test]
    fn test_update_symlink_accepted() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("Libraries/Foo/1.0.0")).unwrap();
        fs::create_dir_all(temp_dir.path().join("Libraries/Foo/1.0.1")).unwrap();
        let manager = PatchlevelManager::new(temp_dir.path(), None);

        let mut prompt = AutoPrompt::yes();
        assert!(manager.update_current_symlink(&foo(), 0, &mut prompt).unwrap());
        assert!(manager.update_current_symlink(&foo(), 1, &mut prompt).unwrap());

        let link = temp_dir.path().join("Libraries/Foo/1.0");
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("1.0.1"));
        assert_eq!(prompt.asked.len(), 2);
    }

    #[test]
    fn test_update_symlink_declined_leaves_link() {
        let temp_dir = TempDir::new().unwrap();
        let pkg = temp_dir.path().join("Libraries/Foo");
        fs::create_dir_all(pkg.join("1.0.0")).unwrap();
        fs::create_dir_all(pkg.join("1.0.1")).unwrap();
        std::os::unix::fs::symlink("1.0.0", pkg.join("1.0")).unwrap();
        let manager = PatchlevelManager::new(temp_dir.path(), None);

        let updated = manager
            .update_current_symlink(&foo(), 1, &mut AutoPrompt::no())
            .unwrap();
        assert!(!updated);
        assert_eq!(fs::read_link(pkg.join("1.0")).unwrap(), PathBuf::from("1.0.0"));
    }

    #[test]
    fn test_update_symlink_refuses_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("Libraries/Foo/1.0")).unwrap();
        let manager = PatchlevelManager::new(temp_dir.path(), None);
        assert!(manager.update_current_symlink(&foo(), 1, &mut AutoPrompt::yes()).is_err());
    }

    #[test]
    fn test_propagate_to_proxy() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        let proxy = temp_dir.path().join("proxy");
        fs::create_dir_all(root.join("Libraries/Foo/1.0.2")).unwrap();
        std::os::unix::fs::symlink("1.0.2", root.join("Libraries/Foo/1.0")).unwrap();
        // stale proxy-local installation
        fs::create_dir_all(proxy.join("Libraries/Foo/1.0/lib")).unwrap();

        let location = SitLocation {
            root_path: root.clone(),
            proxy_path: Some(proxy.clone()),
            parent_path: Some(root.clone()),
        };
        let manager = PatchlevelManager::new(&root, None);
        manager.propagate_to_proxy(&foo(), Some(2), &location).unwrap();

        assert_eq!(fs::read_link(proxy.join("Libraries/Foo/1.0")).unwrap(), root.join("Libraries/Foo/1.0"));
        assert_eq!(fs::read_link(proxy.join("Libraries/Foo/1.0.2")).unwrap(), root.join("Libraries/Foo/1.0.2"));
    }
}
