//! # Branch Model
//!
//! Local and remote-tracking branches, upstream resolution through the
//! `branch."<name>"` config section, and the remote-sync status the
//! renderer turns into icons.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;

use crate::error::{Result, catch_missing};
use crate::git::commit::Commit;
use crate::git::reflog::{ReflogIter, reflog};
use crate::git::refs::{read_ref, ref_exists};
use crate::git::repo::Repo;

/// A branch under `refs/heads/`.
#[derive(Clone)]
pub struct LocalBranch {
  repo: Repo,
  pub name: String,
}

impl LocalBranch {
  pub fn new(repo: &Repo, name: impl Into<String>) -> LocalBranch {
    LocalBranch { repo: repo.clone(), name: name.into() }
  }

  fn relative_name(&self) -> String {
    format!("heads/{}", self.name)
  }

  /// Whether the ref exists loose or packed.
  pub fn exists(&self) -> Result<bool> {
    ref_exists(&self.repo, &self.relative_name())
  }

  /// The commit the branch currently points at.
  pub fn commit(&self) -> Result<Commit> {
    let hash = read_ref(&self.repo, &self.relative_name())?;
    Ok(Commit::new(&self.repo, hash))
  }

  /// The branch tip's author timestamp; used as the display sort key.
  pub fn timestamp(&self) -> Result<i64> {
    self.commit()?.author_time()
  }

  /// True iff `HEAD` names this branch.
  pub fn is_head(&self) -> Result<bool> {
    Ok(self.repo.head()?.as_str() == format!("ref: refs/heads/{}", self.name))
  }

  /// Resolves the configured upstream, if any.
  ///
  /// `branch."<name>".merge` must name a `refs/heads/` ref; `remote`
  /// defaults to `"."` (this repository). A configured upstream that no
  /// longer exists resolves to `None` — remotes go stale between fetches
  /// and local upstreams get deleted.
  pub fn upstream(&self) -> Result<Option<Upstream>> {
    let config = self.repo.config()?;
    let Some(merge) = config.get_sub("branch", &self.name, "merge") else {
      return Ok(None);
    };
    let Some(merge_branch) = merge.strip_prefix("refs/heads/") else {
      return Ok(None);
    };
    let remote = config.get_sub("branch", &self.name, "remote").unwrap_or(".");
    if remote == "." {
      let upstream = LocalBranch::new(&self.repo, merge_branch);
      if upstream.exists()? {
        return Ok(Some(Upstream::Local(upstream)));
      }
      return Ok(None);
    }
    let upstream = RemoteBranch::new(&self.repo, remote, merge_branch);
    if upstream.exists()? {
      return Ok(Some(Upstream::Remote(upstream)));
    }
    Ok(None)
  }

  /// The branch's reflog, newest entry first.
  pub fn reflog(&self) -> ReflogIter {
    reflog(&self.repo, &self.relative_name())
  }
}

impl PartialEq for LocalBranch {
  fn eq(&self, other: &Self) -> bool {
    self.name == other.name
  }
}

impl Eq for LocalBranch {}

impl Hash for LocalBranch {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.name.hash(state);
  }
}

impl fmt::Display for LocalBranch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name)
  }
}

impl fmt::Debug for LocalBranch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "LocalBranch({:?})", self.name)
  }
}

/// A remote-tracking branch under `refs/remotes/<remote>/`.
#[derive(Clone)]
pub struct RemoteBranch {
  repo: Repo,
  pub remote: String,
  pub name: String,
}

impl RemoteBranch {
  pub fn new(repo: &Repo, remote: impl Into<String>, name: impl Into<String>) -> RemoteBranch {
    RemoteBranch { repo: repo.clone(), remote: remote.into(), name: name.into() }
  }

  fn relative_name(&self) -> String {
    format!("remotes/{}/{}", self.remote, self.name)
  }

  pub fn exists(&self) -> Result<bool> {
    ref_exists(&self.repo, &self.relative_name())
  }

  pub fn commit(&self) -> Result<Commit> {
    let hash = read_ref(&self.repo, &self.relative_name())?;
    Ok(Commit::new(&self.repo, hash))
  }
}

impl PartialEq for RemoteBranch {
  fn eq(&self, other: &Self) -> bool {
    self.remote == other.remote && self.name == other.name
  }
}

impl Eq for RemoteBranch {}

impl Hash for RemoteBranch {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.remote.hash(state);
    self.name.hash(state);
  }
}

impl fmt::Display for RemoteBranch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.remote, self.name)
  }
}

impl fmt::Debug for RemoteBranch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "RemoteBranch({:?}, {:?})", self.remote, self.name)
  }
}

/// A branch's configured upstream: another local branch, or the
/// last-fetched state of a branch on a remote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Upstream {
  Local(LocalBranch),
  Remote(RemoteBranch),
}

impl Upstream {
  pub fn commit(&self) -> Result<Commit> {
    match self {
      Upstream::Local(branch) => branch.commit(),
      Upstream::Remote(branch) => branch.commit(),
    }
  }
}

/// Enumerates the local branches: the union of loose refs under
/// `refs/heads/` and `heads/` entries in packed-refs, sorted by name.
pub fn branches(repo: &Repo) -> Result<Vec<LocalBranch>> {
  let mut names = BTreeSet::new();

  let heads_dir = repo.git_dir().join("refs").join("heads");
  collect_loose(&heads_dir, &heads_dir, &mut names)?;
  for refname in repo.packed_refs()?.keys() {
    if let Some(name) = refname.strip_prefix("heads/") {
      names.insert(name.to_owned());
    }
  }

  Ok(names.into_iter().map(|name| LocalBranch::new(repo, name)).collect())
}

fn collect_loose(root: &Path, dir: &Path, names: &mut BTreeSet<String>) -> Result<()> {
  let entries = match fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
    Err(e) => return Err(e.into()),
  };
  for entry in entries {
    let entry = entry?;
    let path = entry.path();
    if path.is_dir() {
      collect_loose(root, &path, names)?;
    } else if let Ok(relative) = path.strip_prefix(root) {
      let name = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
      names.insert(name);
    }
  }
  Ok(())
}

/// A branch's relationship to its remotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
  /// At least one remote exists and none disagrees.
  InSync,
  /// The upstream remote is newer, or the push-default remote diverges.
  OutOfSync,
  /// No relevant remote-tracking branch exists.
  NoRemote,
}

/// Computes a branch's remote-sync status.
///
/// Two checks, either of which can flag out-of-sync: a remote upstream
/// whose commit is newer than the branch tip, and a push-default remote
/// (`remote.pushdefault`) whose same-named branch points elsewhere.
pub fn remote_sync_status(branch: &LocalBranch) -> Result<SyncStatus> {
  let mut saw_remote = false;
  let mut out_of_sync = false;
  let tip = branch.commit()?;

  if let Some(Upstream::Remote(remote)) = branch.upstream()? {
    saw_remote = true;
    let remote_time = catch_missing(remote.commit()?.commit_time())?;
    let local_time = catch_missing(tip.commit_time())?;
    if let (Some(remote_time), Some(local_time)) = (remote_time, local_time) {
      if remote_time > local_time {
        out_of_sync = true;
      }
    }
  }

  let config = branch.repo.config()?;
  if let Some(push_default) = config.get("remote", "pushdefault") {
    let pushed = RemoteBranch::new(&branch.repo, push_default, &branch.name);
    if pushed.exists()? {
      saw_remote = true;
      if pushed.commit()?.hash() != tip.hash() {
        out_of_sync = true;
      }
    }
  }

  if out_of_sync {
    Ok(SyncStatus::OutOfSync)
  } else if saw_remote {
    Ok(SyncStatus::InSync)
  } else {
    Ok(SyncStatus::NoRemote)
  }
}

#[cfg(test)]
mod tests {
  use sprig_test_utils::FixtureRepo;

  use super::*;

  fn fixture() -> (tempfile::TempDir, FixtureRepo, Repo) {
    let dir = tempfile::tempdir().expect("tempdir");
    let fixture = FixtureRepo::new(dir.path()).expect("fixture");
    let repo = Repo::from_git_dir(fixture.git_dir().to_path_buf());
    (dir, fixture, repo)
  }

  #[test]
  fn test_branches_union_of_loose_and_packed() {
    let (_dir, mut fixture, repo) = fixture();
    let tip = fixture.commit_at(&[], 100, "tip").expect("commit");
    fixture.branch("main", &tip).expect("branch");
    fixture.branch("feature/nested", &tip).expect("branch");
    fixture
      .packed_refs(&[
        ("refs/heads/packed-only", "1234567890abcdef1234567890abcdef12345678"),
        ("refs/heads/main", &tip),
        ("refs/remotes/origin/main", &tip),
      ])
      .expect("packed");

    let names: Vec<String> = branches(&repo).expect("branches").iter().map(|b| b.name.clone()).collect();
    assert_eq!(names, vec!["feature/nested", "main", "packed-only"]);
  }

  #[test]
  fn test_is_head() {
    let (_dir, mut fixture, repo) = fixture();
    let tip = fixture.commit_at(&[], 100, "tip").expect("commit");
    fixture.branch("main", &tip).expect("branch");
    fixture.branch("feature", &tip).expect("branch");
    fixture.head("feature").expect("head");

    assert!(LocalBranch::new(&repo, "feature").is_head().expect("is_head"));
    assert!(!LocalBranch::new(&repo, "main").is_head().expect("is_head"));
  }

  #[test]
  fn test_upstream_defaults_to_local_remote() {
    let (_dir, mut fixture, repo) = fixture();
    let tip = fixture.commit_at(&[], 100, "tip").expect("commit");
    fixture.branch("main", &tip).expect("branch");
    fixture.branch("feature", &tip).expect("branch");
    fixture.set_upstream("feature", "main").expect("config");

    let upstream = LocalBranch::new(&repo, "feature").upstream().expect("upstream");
    assert_eq!(upstream, Some(Upstream::Local(LocalBranch::new(&repo, "main"))));
  }

  #[test]
  fn test_upstream_absent_without_merge_key() {
    let (_dir, mut fixture, repo) = fixture();
    let tip = fixture.commit_at(&[], 100, "tip").expect("commit");
    fixture.branch("main", &tip).expect("branch");
    assert_eq!(LocalBranch::new(&repo, "main").upstream().expect("upstream"), None);
  }

  #[test]
  fn test_remote_upstream_requires_existing_ref() {
    let (_dir, mut fixture, repo) = fixture();
    let tip = fixture.commit_at(&[], 100, "tip").expect("commit");
    fixture.branch("main", &tip).expect("branch");
    fixture.set_remote_upstream("main", "origin", "main").expect("config");

    // Not fetched yet: upstream resolves to none.
    assert_eq!(LocalBranch::new(&repo, "main").upstream().expect("upstream"), None);

    fixture.remote_branch("origin", "main", &tip).expect("remote");
    let mut repo = repo;
    repo.reset_caches();
    let upstream = LocalBranch::new(&repo, "main").upstream().expect("upstream");
    assert_eq!(upstream, Some(Upstream::Remote(RemoteBranch::new(&repo, "origin", "main"))));
  }

  #[test]
  fn test_packed_remote_branch_commit() {
    let (_dir, fixture, repo) = fixture();
    fixture
      .packed_refs(&[("refs/remotes/origin/main", "1234567890abcdef1234567890abcdef12345678")])
      .expect("packed");

    let remote = RemoteBranch::new(&repo, "origin", "main");
    assert!(remote.exists().expect("exists"));
    assert_eq!(remote.commit().expect("commit").hash(), "1234567890abcdef1234567890abcdef12345678");
  }

  #[test]
  fn test_sync_status_no_remote() {
    let (_dir, mut fixture, repo) = fixture();
    let tip = fixture.commit_at(&[], 100, "tip").expect("commit");
    fixture.branch("main", &tip).expect("branch");
    assert_eq!(remote_sync_status(&LocalBranch::new(&repo, "main")).expect("sync"), SyncStatus::NoRemote);
  }

  #[test]
  fn test_sync_status_push_default() {
    let (_dir, mut fixture, repo) = fixture();
    let old = fixture.commit_at(&[], 100, "old").expect("commit");
    let tip = fixture.commit_at(&[&old], 200, "tip").expect("commit");
    fixture.branch("main", &tip).expect("branch");
    fixture.append_config("[remote]\n  pushdefault = origin\n").expect("config");

    fixture.remote_branch("origin", "main", &tip).expect("remote");
    assert_eq!(remote_sync_status(&LocalBranch::new(&repo, "main")).expect("sync"), SyncStatus::InSync);

    fixture.remote_branch("origin", "main", &old).expect("remote");
    let mut repo2 = repo.clone();
    repo2.reset_caches();
    assert_eq!(remote_sync_status(&LocalBranch::new(&repo2, "main")).expect("sync"), SyncStatus::OutOfSync);
  }

  #[test]
  fn test_sync_status_remote_upstream_newer() {
    let (_dir, mut fixture, repo) = fixture();
    let tip = fixture.commit_at(&[], 100, "tip").expect("commit");
    let newer = fixture.commit_at(&[&tip], 500, "fetched").expect("commit");
    fixture.branch("main", &tip).expect("branch");
    fixture.remote_branch("upstream", "main", &newer).expect("remote");
    fixture.set_remote_upstream("main", "upstream", "main").expect("config");

    assert_eq!(remote_sync_status(&LocalBranch::new(&repo, "main")).expect("sync"), SyncStatus::OutOfSync);
  }
}
