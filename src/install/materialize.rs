// src/install/materialize.rs

//! File operations: copying the index into a tree, and tarball export

use super::index::InstallIndex;
use crate::error::{Error, Result};
use crate::tree::proxy::remove_path;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Copy `src` to `dst`, replacing whatever is at `dst`
///
/// Symlinks are recreated rather than followed. A failed file copy is
/// retried once.
pub fn copy_worker(src: &Path, dst: &Path) -> Result<()> {
    if fs::symlink_metadata(dst).is_ok() {
        remove_path(dst)?;
    }

    if let Some(parent) = dst.parent() {
        // a plain file where a directory is needed
        if fs::symlink_metadata(parent).is_ok_and(|m| !m.is_dir() && !m.file_type().is_symlink()) {
            debug!("Removing file {:?} in the way of a directory", parent);
            fs::remove_file(parent)?;
        }
        fs::create_dir_all(parent)?;
    }

    let meta = fs::symlink_metadata(src)
        .map_err(|e| Error::NotFound(format!("{}: {}", src.display(), e)))?;

    if meta.file_type().is_symlink() {
        let target = fs::read_link(src)?;
        std::os::unix::fs::symlink(&target, dst)?;
    } else if meta.is_dir() {
        copy_tree(src, dst)?;
    } else {
        copy_with_retry(src, dst)?;
    }
    Ok(())
}

fn copy_with_retry(src: &Path, dst: &Path) -> Result<()> {
    match fs::copy(src, dst) {
        Ok(_) => Ok(()),
        Err(first) => {
            debug!("Copying {:?} failed ({}), retrying", src, first);
            fs::copy(src, dst).map(|_| ()).map_err(|e| {
                Error::IoError(format!("Failed to copy {} to {}: {}", src.display(), dst.display(), e))
            })
        }
    }
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| Error::IoError(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::InvalidPath(e.to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_symlink() {
            let link = fs::read_link(entry.path())?;
            std::os::unix::fs::symlink(link, &target)?;
        } else {
            copy_with_retry(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Copy every index entry from `source_dir` into `root_dir`
///
/// Returns the written destinations. With `dry_run` nothing is written and
/// the would-be destinations are returned.
pub fn install_worker(
    index: &InstallIndex,
    source_dir: &Path,
    root_dir: &Path,
    dry_run: bool,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(index.len());

    for entry in index.iter() {
        let src = source_dir.join(&entry.source);
        let dst = root_dir.join(&entry.destination);

        if dry_run {
            debug!("[DRY-RUN] cp {:?} {:?}", src, dst);
        } else {
            debug!("cp {:?} {:?}", src, dst);
            copy_worker(&src, &dst)?;
        }
        written.push(dst);
    }
    Ok(written)
}

/// Pack the materialized index below `scratch_dir` into a gzip tarball
pub fn write_archive(index: &InstallIndex, scratch_dir: &Path, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    info!("Writing {:?}", output);

    let file = File::create(output)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut archive = tar::Builder::new(encoder);
    archive.follow_symlinks(false);

    for entry in index.iter() {
        let path = scratch_dir.join(&entry.destination);
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                warn!("{:?} missing from scratch directory: {}", path, e);
                continue;
            }
        };
        debug!("{}", entry.destination.display());

        if meta.file_type().is_symlink() {
            let target = fs::read_link(&path)?;
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_mode(0o777);
            header.set_size(0);
            archive.append_link(&mut header, &entry.destination, &target)?;
        } else if meta.is_dir() {
            archive.append_dir_all(&entry.destination, &path)?;
        } else {
            archive.append_path_with_name(&path, &entry.destination)?;
        }
    }

    let encoder = archive.into_inner()?;
    encoder.finish()?;
    Ok(())
}
