//! # Repository Handle
//!
//! Locates the `.git` directory and owns the lazily-filled, process-wide
//! caches: HEAD, the merged config, the packed-refs map, and the pack
//! directory. A [`Repo`] is a cheap shared handle; dropping every clone and
//! reopening is how live mode invalidates state between renders.

use std::cell::RefCell;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::error::{GitError, Result};
use crate::git::config::{Config, read_config};
use crate::git::decode::{CommitData, decompress};
use crate::git::pack::{ObjectKind, PackDir};
use crate::git::refs::read_packed_refs;

struct RepoInner {
  git_dir: PathBuf,
  head: RefCell<Option<Rc<String>>>,
  config: RefCell<Option<Rc<Config>>>,
  packed_refs: RefCell<Option<Rc<HashMap<String, String>>>>,
  packs: RefCell<Option<PackDir>>,
}

/// A handle to one repository's on-disk state.
#[derive(Clone)]
pub struct Repo {
  inner: Rc<RepoInner>,
}

impl std::fmt::Debug for Repo {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Repo").field("git_dir", &self.inner.git_dir).finish()
  }
}

impl PartialEq for Repo {
  fn eq(&self, other: &Self) -> bool {
    self.inner.git_dir == other.inner.git_dir
  }
}

impl Eq for Repo {}

impl Repo {
  /// Discovers the repository containing the current working directory.
  pub fn open() -> Result<Repo> {
    Self::open_at(&env::current_dir()?)
  }

  /// Discovers the repository containing `dir` by walking towards the
  /// filesystem root.
  pub fn open_at(dir: &Path) -> Result<Repo> {
    for candidate in dir.ancestors() {
      let git_dir = candidate.join(".git");
      if git_dir.is_dir() {
        debug!("found repository at {}", git_dir.display());
        return Ok(Self::from_git_dir(git_dir));
      }
    }
    Err(GitError::NotARepository)
  }

  /// Wraps an already-located `.git` directory.
  pub fn from_git_dir(git_dir: PathBuf) -> Repo {
    Repo {
      inner: Rc::new(RepoInner {
        git_dir,
        head: RefCell::new(None),
        config: RefCell::new(None),
        packed_refs: RefCell::new(None),
        packs: RefCell::new(None),
      }),
    }
  }

  /// The `.git` directory this handle reads from.
  pub fn git_dir(&self) -> &Path {
    &self.inner.git_dir
  }

  /// Drops every cached value, so the next access re-reads the disk.
  pub fn reset_caches(&mut self) {
    self.inner = Rc::new(RepoInner {
      git_dir: self.inner.git_dir.clone(),
      head: RefCell::new(None),
      config: RefCell::new(None),
      packed_refs: RefCell::new(None),
      packs: RefCell::new(None),
    });
  }

  /// The trimmed contents of `HEAD`.
  pub fn head(&self) -> Result<Rc<String>> {
    if let Some(head) = self.inner.head.borrow().as_ref() {
      return Ok(head.clone());
    }
    let head = Rc::new(fs::read_to_string(self.inner.git_dir.join("HEAD"))?.trim().to_owned());
    *self.inner.head.borrow_mut() = Some(head.clone());
    Ok(head)
  }

  /// The merged system/user/repo configuration.
  pub fn config(&self) -> Result<Rc<Config>> {
    if let Some(config) = self.inner.config.borrow().as_ref() {
      return Ok(config.clone());
    }
    let config = Rc::new(read_config(&self.inner.git_dir)?);
    *self.inner.config.borrow_mut() = Some(config.clone());
    Ok(config)
  }

  /// The packed-refs map, keyed by ref name relative to `refs/`.
  pub fn packed_refs(&self) -> Result<Rc<HashMap<String, String>>> {
    if let Some(refs) = self.inner.packed_refs.borrow().as_ref() {
      return Ok(refs.clone());
    }
    let refs = Rc::new(read_packed_refs(&self.inner.git_dir)?);
    *self.inner.packed_refs.borrow_mut() = Some(refs.clone());
    Ok(refs)
  }

  /// Reads and decodes the commit object for `hash`, trying the loose store
  /// first and falling back to the packs.
  pub(crate) fn load_commit_data(&self, hash: &str) -> Result<CommitData> {
    if hash.len() < 3 {
      return Err(GitError::MissingObject(hash.to_owned()));
    }
    let loose = self.inner.git_dir.join("objects").join(&hash[..2]).join(&hash[2..]);
    match fs::File::open(&loose) {
      Ok(file) => {
        let raw = decompress(file)?;
        return CommitData::decode(&raw);
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => return Err(e.into()),
    }

    if self.inner.packs.borrow().is_none() {
      let packs = PackDir::open(&self.inner.git_dir)?;
      *self.inner.packs.borrow_mut() = Some(packs);
    }
    let mut packs = self.inner.packs.borrow_mut();
    let packs = packs
      .as_mut()
      .ok_or_else(|| GitError::Io(std::io::Error::other("pack directory unavailable")))?;
    match packs.get(hash)? {
      Some((ObjectKind::Commit, data)) => CommitData::decode(&data),
      Some(_) | None => Err(GitError::MissingObject(hash.to_owned())),
    }
  }
}

#[cfg(test)]
mod tests {
  use sprig_test_utils::FixtureRepo;

  use super::*;

  #[test]
  fn test_open_at_walks_upward() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fixture = FixtureRepo::new(dir.path()).expect("fixture");
    let nested = fixture.root().join("a").join("b");
    fs::create_dir_all(&nested).expect("mkdir");

    let repo = Repo::open_at(&nested).expect("open");
    assert_eq!(repo.git_dir(), fixture.git_dir());
  }

  #[test]
  fn test_open_at_fails_outside_a_repository() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(matches!(Repo::open_at(dir.path()), Err(GitError::NotARepository)));
  }

  #[test]
  fn test_head_is_cached_until_reset() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fixture = FixtureRepo::new(dir.path()).expect("fixture");
    let mut repo = Repo::from_git_dir(fixture.git_dir().to_path_buf());
    assert_eq!(repo.head().expect("head").as_str(), "ref: refs/heads/main");

    fixture.head("feature").expect("re-point");
    assert_eq!(repo.head().expect("head").as_str(), "ref: refs/heads/main");
    repo.reset_caches();
    assert_eq!(repo.head().expect("head").as_str(), "ref: refs/heads/feature");
  }

  #[test]
  fn test_load_commit_data_from_loose_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut fixture = FixtureRepo::new(dir.path()).expect("fixture");
    let hash = fixture.commit_at(&[], 100, "first").expect("commit");

    let repo = Repo::from_git_dir(fixture.git_dir().to_path_buf());
    let data = repo.load_commit_data(&hash).expect("load");
    assert_eq!(data.commit_time, 100);
    assert_eq!(data.message, b"first\n");
  }

  #[test]
  fn test_load_commit_data_falls_back_to_packs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fixture = FixtureRepo::new(dir.path()).expect("fixture");
    let hash = "ab12ab12ab12ab12ab12ab12ab12ab12ab12ab12";
    let body = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
author A <a@b> 500 +0000\ncommitter A <a@b> 501 +0000\n\npacked commit\n";
    sprig_test_utils::PackFixtureBuilder::single_commit_pack(fixture.git_dir(), hash, body)
      .expect("pack");

    let repo = Repo::from_git_dir(fixture.git_dir().to_path_buf());
    let data = repo.load_commit_data(hash).expect("load");
    assert_eq!(data.commit_time, 501);
    assert_eq!(data.message, b"packed commit\n");
  }

  #[test]
  fn test_load_commit_data_missing_everywhere() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fixture = FixtureRepo::new(dir.path()).expect("fixture");
    let repo = Repo::from_git_dir(fixture.git_dir().to_path_buf());
    let missing = FixtureRepo::missing_hash();
    assert!(matches!(repo.load_commit_data(&missing), Err(GitError::MissingObject(_))));
  }
}
