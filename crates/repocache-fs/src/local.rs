use std::fs::Metadata;
use std::path::{Path, PathBuf};

use fs_err as fs;

use crate::error::FsError;
use crate::removal::{self, Removal};
use crate::{DirEntry, Filesystem};

/// A [`Filesystem`] rooted at a real directory on disk.
///
/// All paths passed to its methods are treated as relative to `root`;
/// [`LocalFilesystem::scoped`] walks further down the tree without ever
/// handing callers a path outside it.
#[derive(Debug, Clone)]
pub struct LocalFilesystem {
    root: PathBuf,
}

impl LocalFilesystem {
    /// Opens `root` as a filesystem provider. Does not create `root`; call
    /// [`Filesystem::create_dir_all`] with an empty relative path first if
    /// it may not exist yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, rel: &Path) -> Result<PathBuf, FsError> {
        if rel.is_absolute() {
            return Err(FsError::PathEscape {
                path: rel.to_path_buf(),
            });
        }
        let mut resolved = self.root.clone();
        for component in rel.components() {
            use std::path::Component;
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(FsError::PathEscape {
                        path: rel.to_path_buf(),
                    });
                }
            }
        }
        Ok(resolved)
    }
}

impl Filesystem for LocalFilesystem {
    fn root(&self) -> &Path {
        &self.root
    }

    fn stat(&self, rel: &Path) -> Result<Metadata, FsError> {
        let path = self.resolve(rel)?;
        fs::metadata(&path).map_err(|source| FsError::Stat { path, source })
    }

    fn exists(&self, rel: &Path) -> Result<bool, FsError> {
        let path = self.resolve(rel)?;
        match fs::metadata(&path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(FsError::Stat { path, source }),
        }
    }

    fn create_dir_all(&self, rel: &Path) -> Result<(), FsError> {
        let path = self.resolve(rel)?;
        fs::create_dir_all(&path).map_err(|source| FsError::CreateDir { path, source })
    }

    fn create_file(&self, rel: &Path) -> Result<fs::File, FsError> {
        let path = self.resolve(rel)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| FsError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::File::create(&path).map_err(|source| FsError::CreateFile { path, source })
    }

    fn read_to_string(&self, rel: &Path) -> Result<String, FsError> {
        let path = self.resolve(rel)?;
        fs::read_to_string(&path).map_err(|source| FsError::Stat { path, source })
    }

    fn remove_file(&self, rel: &Path) -> Result<(), FsError> {
        let path = self.resolve(rel)?;
        fs::remove_file(&path).map_err(|source| FsError::Remove { path, source })
    }

    fn remove_dir_all(&self, rel: &Path) -> Result<Removal, FsError> {
        let path = self.resolve(rel)?;
        removal::remove_dir_all(&path)
    }

    fn read_dir(&self, rel: &Path) -> Result<Vec<DirEntry>, FsError> {
        let path = self.resolve(rel)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&path).map_err(|source| FsError::ReadDir {
            path: path.clone(),
            source,
        })? {
            let entry = entry.map_err(|source| FsError::ReadDir {
                path: path.clone(),
                source,
            })?;
            let file_type = entry.file_type().map_err(|source| FsError::ReadDir {
                path: path.clone(),
                source,
            })?;
            entries.push(DirEntry {
                name: entry.file_name(),
                is_dir: file_type.is_dir(),
            });
        }
        Ok(entries)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        let from_abs = self.resolve(from)?;
        let to_abs = self.resolve(to)?;
        if let Some(parent) = to_abs.parent() {
            fs::create_dir_all(parent).map_err(|source| FsError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::rename(&from_abs, &to_abs).map_err(|source| FsError::Rename {
            from: from_abs,
            to: to_abs,
            source,
        })
    }

    fn dir_size(&self, rel: &Path) -> Result<u64, FsError> {
        let path = self.resolve(rel)?;
        removal::dir_size(&path)
    }

    fn scoped(&self, rel: &Path) -> Result<Box<dyn Filesystem>, FsError> {
        let path = self.resolve(rel)?;
        Ok(Box::new(LocalFilesystem::new(path)))
    }
}
