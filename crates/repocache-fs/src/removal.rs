//! Recursive removal with byte/file/dir accounting.
//!
//! Derived from Cargo's `cargo_clean.rs` removal routine (by way of
//! `puffin-cache::removal`): walk the tree bottom-up so directories are
//! empty by the time we try to remove them, and retry removal of
//! read-only files after clearing their permissions.

use std::fs;
use std::path::Path;

use crate::error::FsError;

/// Tally of what [`remove_dir_all`] actually deleted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Removal {
    pub num_files: u64,
    pub num_dirs: u64,
    pub total_bytes: u64,
}

impl Removal {
    fn add_file(&mut self, len: u64) {
        self.num_files += 1;
        self.total_bytes += len;
    }

    fn add_dir(&mut self) {
        self.num_dirs += 1;
    }
}

/// Removes `path` and everything beneath it, returning how much was removed.
///
/// A missing `path` is not an error: it contributes an empty [`Removal`].
pub fn remove_dir_all(path: &Path) -> Result<Removal, FsError> {
    let mut removal = Removal::default();
    rm_rf(path, &mut removal)?;
    Ok(removal)
}

/// Recursively sums the bytes used by files under `path`, without removing
/// anything. Used by the lifecycle manager and size-bounded pruning.
pub fn dir_size(path: &Path) -> Result<u64, FsError> {
    let mut total = 0u64;
    if !path.exists() {
        return Ok(0);
    }
    for entry in walkdir::WalkDir::new(path) {
        let entry = entry.map_err(|source| FsError::Walk {
            path: path.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() {
            total += entry.metadata().map_or(0, |m| m.len());
        }
    }
    Ok(total)
}

fn rm_rf(path: &Path, removal: &mut Removal) -> Result<(), FsError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(FsError::Remove {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if !metadata.is_dir() {
        remove_file(path, metadata.len(), removal)?;
        return Ok(());
    }

    for entry in fs::read_dir(path).map_err(|source| FsError::ReadDir {
        path: path.to_path_buf(),
        source,
    })? {
        let entry = entry.map_err(|source| FsError::ReadDir {
            path: path.to_path_buf(),
            source,
        })?;
        rm_rf(&entry.path(), removal)?;
    }

    fs::remove_dir(path).map_err(|source| FsError::Remove {
        path: path.to_path_buf(),
        source,
    })?;
    removal.add_dir();
    Ok(())
}

fn remove_file(path: &Path, len: u64, removal: &mut Removal) -> Result<(), FsError> {
    match fs::remove_file(path) {
        Ok(()) => {
            removal.add_file(len);
            Ok(())
        }
        Err(source) if source.kind() == std::io::ErrorKind::PermissionDenied => {
            let mut perms = fs::metadata(path)
                .map_err(|source| FsError::Remove {
                    path: path.to_path_buf(),
                    source,
                })?
                .permissions();
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            fs::set_permissions(path, perms).map_err(|source| FsError::Remove {
                path: path.to_path_buf(),
                source,
            })?;
            fs::remove_file(path).map_err(|source| FsError::Remove {
                path: path.to_path_buf(),
                source,
            })?;
            removal.add_file(len);
            Ok(())
        }
        Err(source) => Err(FsError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}
