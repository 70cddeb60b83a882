//! # Commit Objects
//!
//! A [`Commit`] is a value identified by its hash. The underlying object is
//! loaded from the store on first attribute access and shared between
//! clones of the same instance; two commits are equal iff their hashes are
//! equal. A commit whose object is absent (shallow clone) surfaces
//! [`GitError::MissingCommit`] from every attribute accessor.

use std::cell::OnceCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::error::{GitError, Result, catch_missing};
use crate::git::decode::CommitData;
use crate::git::repo::Repo;

/// A lazily-loaded commit.
#[derive(Clone)]
pub struct Commit {
  repo: Repo,
  hash: String,
  record: Rc<OnceCell<Option<Rc<CommitData>>>>,
}

impl Commit {
  /// Wraps a hash; no I/O happens until an attribute is read.
  pub fn new(repo: &Repo, hash: impl Into<String>) -> Commit {
    Commit {
      repo: repo.clone(),
      hash: hash.into(),
      record: Rc::new(OnceCell::new()),
    }
  }

  /// The 40-character hex hash.
  pub fn hash(&self) -> &str {
    &self.hash
  }

  fn record(&self) -> Result<Rc<CommitData>> {
    if let Some(cached) = self.record.get() {
      return cached.clone().ok_or_else(|| GitError::MissingCommit(self.hash.clone()));
    }
    match self.repo.load_commit_data(&self.hash) {
      Ok(data) => {
        let data = Rc::new(data);
        let _ = self.record.set(Some(data.clone()));
        Ok(data)
      }
      Err(GitError::MissingObject(_)) => {
        let _ = self.record.set(None);
        Err(GitError::MissingCommit(self.hash.clone()))
      }
      Err(e) => Err(e),
    }
  }

  /// All parents, in object order.
  pub fn parents(&self) -> Result<Vec<Commit>> {
    let record = self.record()?;
    Ok(record.parents.iter().map(|hash| Commit::new(&self.repo, hash.clone())).collect())
  }

  /// The first parent, or `None` for a root commit.
  pub fn first_parent(&self) -> Result<Option<Commit>> {
    let record = self.record()?;
    Ok(record.first_parent().map(|hash| Commit::new(&self.repo, hash.to_owned())))
  }

  /// The parents whose objects can actually be loaded. A commit that is
  /// itself missing has no available parents.
  pub fn available_parents(&self) -> Result<Vec<Commit>> {
    self.available_from(0)
  }

  /// The non-first parents whose objects can be loaded — the commits this
  /// one merged in.
  pub fn available_merge_parents(&self) -> Result<Vec<Commit>> {
    self.available_from(1)
  }

  fn available_from(&self, skip: usize) -> Result<Vec<Commit>> {
    let Some(parents) = catch_missing(self.parents())? else {
      return Ok(Vec::new());
    };
    let mut available = Vec::new();
    for parent in parents.into_iter().skip(skip) {
      if catch_missing(parent.record().map(|_| ()))?.is_some() {
        available.push(parent);
      }
    }
    Ok(available)
  }

  /// Author timestamp in epoch seconds. Survives rebases and cherry-picks.
  pub fn author_time(&self) -> Result<i64> {
    Ok(self.record()?.author_time)
  }

  /// Committer timestamp in epoch seconds.
  pub fn commit_time(&self) -> Result<i64> {
    Ok(self.record()?.commit_time)
  }

  /// The commit message, including its trailing newline.
  pub fn message(&self) -> Result<Vec<u8>> {
    Ok(self.record()?.message.clone())
  }
}

impl PartialEq for Commit {
  fn eq(&self, other: &Self) -> bool {
    self.hash == other.hash
  }
}

impl Eq for Commit {}

impl Hash for Commit {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.hash.hash(state);
  }
}

impl fmt::Display for Commit {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", &self.hash[..self.hash.len().min(10)])
  }
}

impl fmt::Debug for Commit {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Commit({:?})", self.hash)
  }
}
