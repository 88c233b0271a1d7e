use std::fs;
use std::path::{Path, PathBuf};

use git2::{Oid, Repository, ResetType};

use crate::auth::GitAuth;
use crate::error::GitError;
use crate::RepositoryDriver;

/// The real [`RepositoryDriver`], backed by `git2` (libgit2).
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Driver;

impl Git2Driver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn open(path: &Path) -> Result<Repository, GitError> {
        Repository::open(path).map_err(|source| GitError::Open {
            path: path.to_path_buf(),
            source,
        })
    }

    fn remote_callbacks(auth: Option<&GitAuth>) -> git2::RemoteCallbacks<'_> {
        let mut callbacks = git2::RemoteCallbacks::new();
        if let Some(auth) = auth {
            callbacks.credentials(auth.to_credentials());
        }
        callbacks
    }

    fn alternates_path(checkout_path: &Path) -> PathBuf {
        checkout_path.join(".git").join("objects").join("info").join("alternates")
    }
}

impl RepositoryDriver for Git2Driver {
    fn init_bare(&self, path: &Path) -> Result<(), GitError> {
        Repository::init_bare(path).map_err(|source| GitError::Init {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    fn is_valid_bare(&self, path: &Path) -> bool {
        Repository::open_bare(path)
            .map(|repo| repo.is_bare())
            .unwrap_or(false)
    }

    fn set_remote_url(&self, path: &Path, remote: &str, url: &str) -> Result<(), GitError> {
        let repo = Self::open(path)?;
        if repo.find_remote(remote).is_ok() {
            repo.remote_set_url(remote, url)
        } else {
            repo.remote(remote, url).map(|_| ())
        }
        .map_err(|source| GitError::Remote {
            path: path.to_path_buf(),
            remote: remote.to_string(),
            source,
        })
    }

    fn fetch(
        &self,
        path: &Path,
        remote: &str,
        refspecs: &[String],
        depth: Option<u32>,
        auth: Option<&GitAuth>,
    ) -> Result<(), GitError> {
        let repo = Self::open(path)?;
        let mut remote = repo.find_remote(remote).map_err(|source| GitError::Remote {
            path: path.to_path_buf(),
            remote: remote.to_string(),
            source,
        })?;

        let callbacks = Self::remote_callbacks(auth);
        let mut fetch_options = git2::FetchOptions::new();
        fetch_options.remote_callbacks(callbacks);
        fetch_options.download_tags(git2::AutotagOption::All);
        if let Some(depth) = depth {
            fetch_options.depth(i32::try_from(depth).unwrap_or(i32::MAX));
        }

        let refspec_strs: Vec<&str> = if refspecs.is_empty() {
            Vec::new()
        } else {
            refspecs.iter().map(String::as_str).collect()
        };

        remote
            .fetch(&refspec_strs, Some(&mut fetch_options), None)
            .map_err(|source| GitError::Fetch {
                path: path.to_path_buf(),
                remote: remote.name().unwrap_or_default().to_string(),
                refspec: refspecs.join(","),
                source,
            })
    }

    fn resolve_revision(&self, path: &Path, revision: &str) -> Result<String, GitError> {
        let repo = Self::open(path)?;
        let object = repo
            .revparse_single(revision)
            .map_err(|source| GitError::ResolveRevision {
                path: path.to_path_buf(),
                revision: revision.to_string(),
                source,
            })?;
        let commit = object
            .peel_to_commit()
            .map_err(|source| GitError::ResolveRevision {
                path: path.to_path_buf(),
                revision: revision.to_string(),
                source,
            })?;
        Ok(commit.id().to_string())
    }

    fn head_sha(&self, path: &Path) -> Result<String, GitError> {
        let repo = Self::open(path)?;
        let head = repo.head().map_err(|source| GitError::Head {
            path: path.to_path_buf(),
            source,
        })?;
        let commit = head.peel_to_commit().map_err(|source| GitError::Head {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(commit.id().to_string())
    }

    fn is_shallow(&self, path: &Path) -> Result<bool, GitError> {
        let repo = Self::open(path)?;
        Ok(repo.is_shallow())
    }

    fn clone_with_shared_objects(
        &self,
        bare_path: &Path,
        checkout_path: &Path,
        revision: &str,
        branch: Option<&str>,
    ) -> Result<(), GitError> {
        let resolved = self.resolve_revision(bare_path, revision)?;
        let oid = Oid::from_str(&resolved).map_err(|_| GitError::RevisionNotFound {
            path: bare_path.to_path_buf(),
            revision: revision.to_string(),
        })?;

        let repo = Repository::init(checkout_path).map_err(|source| GitError::Clone {
            source_path: bare_path.to_path_buf(),
            target_path: checkout_path.to_path_buf(),
            source,
        })?;

        let alternates = Self::alternates_path(checkout_path);
        if let Some(parent) = alternates.parent() {
            fs::create_dir_all(parent).map_err(|source| GitError::Alternates {
                path: alternates.clone(),
                source,
            })?;
        }
        let objects_dir = bare_path.join("objects");
        fs::write(&alternates, format!("{}\n", objects_dir.display())).map_err(|source| {
            GitError::Alternates {
                path: alternates.clone(),
                source,
            }
        })?;
        repo.odb()
            .and_then(|odb| odb.refresh())
            .map_err(|source| GitError::Clone {
                source_path: bare_path.to_path_buf(),
                target_path: checkout_path.to_path_buf(),
                source,
            })?;

        let commit = repo.find_commit(oid).map_err(|source| GitError::Clone {
            source_path: bare_path.to_path_buf(),
            target_path: checkout_path.to_path_buf(),
            source,
        })?;

        if let Some(name) = branch {
            repo.branch(name, &commit, true).map_err(|source| GitError::Clone {
                source_path: bare_path.to_path_buf(),
                target_path: checkout_path.to_path_buf(),
                source,
            })?;
            repo.set_head(&format!("refs/heads/{name}"))
                .map_err(|source| GitError::Clone {
                    source_path: bare_path.to_path_buf(),
                    target_path: checkout_path.to_path_buf(),
                    source,
                })?;
        } else {
            repo.set_head_detached(commit.id())
                .map_err(|source| GitError::Clone {
                    source_path: bare_path.to_path_buf(),
                    target_path: checkout_path.to_path_buf(),
                    source,
                })?;
        }

        let mut checkout_builder = git2::build::CheckoutBuilder::new();
        checkout_builder.force();
        repo.checkout_head(Some(&mut checkout_builder))
            .map_err(|source| GitError::Clone {
                source_path: bare_path.to_path_buf(),
                target_path: checkout_path.to_path_buf(),
                source,
            })?;

        Ok(())
    }

    fn reset_hard(&self, checkout_path: &Path, revision: &str) -> Result<(), GitError> {
        let repo = Self::open(checkout_path)?;
        let object = repo
            .revparse_single(revision)
            .map_err(|source| GitError::Reset {
                path: checkout_path.to_path_buf(),
                revision: revision.to_string(),
                source,
            })?;
        let mut checkout_builder = git2::build::CheckoutBuilder::new();
        checkout_builder.force();
        repo.reset(&object, ResetType::Hard, Some(&mut checkout_builder))
            .map_err(|source| GitError::Reset {
                path: checkout_path.to_path_buf(),
                revision: revision.to_string(),
                source,
            })
    }

    fn list_remote_branches(&self, path: &Path, remote: &str) -> Result<Vec<(String, String)>, GitError> {
        let repo = Self::open(path)?;
        let prefix = format!("refs/remotes/{remote}/");
        let glob = format!("{prefix}*");
        let mut branches = Vec::new();
        let refs = repo.references_glob(&glob).map_err(|source| GitError::Head {
            path: path.to_path_buf(),
            source,
        })?;
        for reference in refs {
            let reference = reference.map_err(|source| GitError::Head {
                path: path.to_path_buf(),
                source,
            })?;
            let Some(name) = reference.name() else { continue };
            let branch_name = name.trim_start_matches(&prefix);
            if branch_name == "HEAD" {
                continue;
            }
            let Some(target) = reference.target() else { continue };
            branches.push((branch_name.to_string(), target.to_string()));
        }
        Ok(branches)
    }

    fn local_branch_exists(&self, path: &Path, name: &str) -> Result<bool, GitError> {
        let repo = Self::open(path)?;
        Ok(repo.find_branch(name, git2::BranchType::Local).is_ok())
    }

    fn set_local_branch(&self, path: &Path, name: &str, sha: &str) -> Result<(), GitError> {
        let repo = Self::open(path)?;
        let oid = Oid::from_str(sha).map_err(|_| GitError::RevisionNotFound {
            path: path.to_path_buf(),
            revision: sha.to_string(),
        })?;
        let commit = repo.find_commit(oid).map_err(|source| GitError::ResolveRevision {
            path: path.to_path_buf(),
            revision: sha.to_string(),
            source,
        })?;
        repo.branch(name, &commit, true)
            .map_err(|source| GitError::ResolveRevision {
                path: path.to_path_buf(),
                revision: sha.to_string(),
                source,
            })?;
        Ok(())
    }

    fn set_head_to_branch(&self, path: &Path, name: &str) -> Result<(), GitError> {
        let repo = Self::open(path)?;
        repo.set_head(&format!("refs/heads/{name}"))
            .map_err(|source| GitError::Head {
                path: path.to_path_buf(),
                source,
            })
    }

    fn head_ref_name(&self, path: &Path) -> Result<String, GitError> {
        let repo = Self::open(path)?;
        let head = repo.head().map_err(|source| GitError::Head {
            path: path.to_path_buf(),
            source,
        })?;
        if head.is_branch() {
            if let Some(shorthand) = head.shorthand() {
                return Ok(shorthand.to_string());
            }
        }
        let commit = head.peel_to_commit().map_err(|source| GitError::Head {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(crate::short_sha(&commit.id().to_string()).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit_file(repo: &Repository, name: &str, contents: &str) -> Oid {
        std::fs::write(repo.workdir().unwrap().join(name), contents).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@example.com").unwrap();
        let parents: Vec<git2::Commit> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, "msg", &tree, &parent_refs)
            .unwrap()
    }

    #[test]
    fn init_bare_creates_bare_repository() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repo.git");
        let driver = Git2Driver::new();
        driver.init_bare(&path).unwrap();
        assert!(driver.is_valid_bare(&path));
    }

    #[test]
    fn clone_with_shared_objects_checks_out_revision() {
        let dir = tempfile::tempdir().unwrap();
        let origin_path = dir.path().join("origin");
        let origin = Repository::init(&origin_path).unwrap();
        let oid = commit_file(&origin, "a.txt", "hello");

        let bare_path = dir.path().join("bare.git");
        let driver = Git2Driver::new();
        driver.init_bare(&bare_path).unwrap();
        driver
            .set_remote_url(&bare_path, "origin", &format!("file://{}", origin_path.display()))
            .unwrap();
        driver
            .fetch(&bare_path, "origin", &["+refs/heads/*:refs/heads/*".to_string()], None, None)
            .unwrap();

        let checkout_path = dir.path().join("checkout");
        driver
            .clone_with_shared_objects(&bare_path, &checkout_path, &oid.to_string(), None)
            .unwrap();

        assert!(checkout_path.join("a.txt").exists());
        assert!(alternates_exists(&checkout_path));
        assert_eq!(driver.head_sha(&checkout_path).unwrap(), oid.to_string());
    }

    #[test]
    fn clone_with_shared_objects_checks_out_local_branch_non_detached() {
        let dir = tempfile::tempdir().unwrap();
        let origin_path = dir.path().join("origin");
        let origin = Repository::init(&origin_path).unwrap();
        let oid = commit_file(&origin, "a.txt", "hello");

        let bare_path = dir.path().join("bare.git");
        let driver = Git2Driver::new();
        driver.init_bare(&bare_path).unwrap();
        driver
            .set_remote_url(&bare_path, "origin", &format!("file://{}", origin_path.display()))
            .unwrap();
        driver
            .fetch(&bare_path, "origin", &["+refs/heads/*:refs/heads/*".to_string()], None, None)
            .unwrap();

        let checkout_path = dir.path().join("checkout");
        driver
            .clone_with_shared_objects(&bare_path, &checkout_path, &oid.to_string(), Some("master"))
            .unwrap();

        assert!(checkout_path.join("a.txt").exists());
        assert_eq!(driver.head_ref_name(&checkout_path).unwrap(), "master");
    }

    fn alternates_exists(checkout_path: &Path) -> bool {
        Git2Driver::alternates_path(checkout_path).exists()
    }

    #[test]
    fn reset_hard_discards_local_changes() {
        let dir = tempfile::tempdir().unwrap();
        let origin_path = dir.path().join("origin");
        let origin = Repository::init(&origin_path).unwrap();
        let first = commit_file(&origin, "a.txt", "hello");
        let second = commit_file(&origin, "a.txt", "world");

        let bare_path = dir.path().join("bare.git");
        let driver = Git2Driver::new();
        driver.init_bare(&bare_path).unwrap();
        driver
            .set_remote_url(&bare_path, "origin", &format!("file://{}", origin_path.display()))
            .unwrap();
        driver
            .fetch(&bare_path, "origin", &["+refs/heads/*:refs/heads/*".to_string()], None, None)
            .unwrap();

        let checkout_path = dir.path().join("checkout");
        driver
            .clone_with_shared_objects(&bare_path, &checkout_path, &second.to_string(), None)
            .unwrap();

        std::fs::write(checkout_path.join("b.txt"), "untracked").unwrap();
        driver.reset_hard(&checkout_path, &first.to_string()).unwrap();

        assert_eq!(
            std::fs::read_to_string(checkout_path.join("a.txt")).unwrap(),
            "hello"
        );
    }

    #[test]
    fn list_remote_branches_and_reconcile_local() {
        let dir = tempfile::tempdir().unwrap();
        let origin_path = dir.path().join("origin");
        let origin = Repository::init(&origin_path).unwrap();
        let oid = commit_file(&origin, "a.txt", "hello");

        let bare_path = dir.path().join("bare.git");
        let driver = Git2Driver::new();
        driver.init_bare(&bare_path).unwrap();
        driver
            .set_remote_url(&bare_path, "origin", &format!("file://{}", origin_path.display()))
            .unwrap();
        driver.fetch(&bare_path, "origin", &[], None, None).unwrap();

        let branches = driver.list_remote_branches(&bare_path, "origin").unwrap();
        assert!(branches.iter().any(|(name, sha)| name == "master" && sha == &oid.to_string()));

        assert!(!driver.local_branch_exists(&bare_path, "master").unwrap());
        driver.set_local_branch(&bare_path, "master", &oid.to_string()).unwrap();
        assert!(driver.local_branch_exists(&bare_path, "master").unwrap());

        driver.set_head_to_branch(&bare_path, "master").unwrap();
        assert_eq!(driver.head_ref_name(&bare_path).unwrap(), "master");
    }
}
