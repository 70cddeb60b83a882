//! # Commit Containers
//!
//! Chronologically-ordered collections shared by the windowed analytics:
//! a set with O(1) access to the newest commit, a map with the same, and a
//! multimap flavour. Ordering is by committer timestamp with ties broken by
//! hash; a commit whose timestamp cannot be read sorts older than
//! everything. Removal is lazy: heap entries are discarded when they no
//! longer match the backing set/map.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::git::commit::Commit;

/// A commit with its heap-ordering key. Newest compares greatest.
#[derive(Clone)]
pub(crate) struct ChronoCommit {
  pub commit: Commit,
  pub time: i64,
}

impl ChronoCommit {
  pub fn new(commit: Commit) -> ChronoCommit {
    let time = commit_time_or_oldest(&commit);
    ChronoCommit { commit, time }
  }
}

/// The ordering timestamp: unreadable commit times sort as older than
/// everything.
pub(crate) fn commit_time_or_oldest(commit: &Commit) -> i64 {
  commit.commit_time().unwrap_or(i64::MIN)
}

impl PartialEq for ChronoCommit {
  fn eq(&self, other: &Self) -> bool {
    self.time == other.time && self.commit == other.commit
  }
}

impl Eq for ChronoCommit {}

impl Ord for ChronoCommit {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .time
      .cmp(&other.time)
      .then_with(|| other.commit.hash().cmp(self.commit.hash()))
  }
}

impl PartialOrd for ChronoCommit {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

/// A set of commits with O(1) access to the newest member.
#[derive(Default)]
pub struct CommitSet {
  commits: HashSet<Commit>,
  heap: BinaryHeap<ChronoCommit>,
  last_added: Option<Commit>,
}

impl CommitSet {
  pub fn new() -> CommitSet {
    CommitSet::default()
  }

  /// A set seeded with one commit.
  pub fn with(commit: Commit) -> CommitSet {
    let mut set = CommitSet::new();
    set.insert(commit);
    set
  }

  pub fn len(&self) -> usize {
    self.commits.len()
  }

  pub fn is_empty(&self) -> bool {
    self.commits.is_empty()
  }

  pub fn contains(&self, commit: &Commit) -> bool {
    self.commits.contains(commit)
  }

  pub fn insert(&mut self, commit: Commit) {
    self.last_added = Some(commit.clone());
    if self.commits.insert(commit.clone()) {
      self.heap.push(ChronoCommit::new(commit));
    }
  }

  /// Records `commit` as the last addition; `None` just clears the marker.
  pub fn add(&mut self, commit: Option<Commit>) {
    match commit {
      Some(commit) => self.insert(commit),
      None => self.last_added = None,
    }
  }

  /// The commit most recently passed to `insert`/`add`, if any.
  pub fn last_added(&self) -> Option<&Commit> {
    self.last_added.as_ref()
  }

  pub fn remove(&mut self, commit: &Commit) {
    self.commits.remove(commit);
  }

  fn discard_stale(&mut self) {
    while let Some(top) = self.heap.peek() {
      if self.commits.contains(&top.commit) {
        break;
      }
      self.heap.pop();
    }
  }

  /// The newest commit in the set.
  pub fn peek_newest(&mut self) -> Option<Commit> {
    self.discard_stale();
    self.heap.peek().map(|top| top.commit.clone())
  }

  /// Removes and returns the newest commit.
  pub fn pop_newest(&mut self) -> Option<Commit> {
    self.discard_stale();
    let top = self.heap.pop()?;
    self.commits.remove(&top.commit);
    Some(top.commit)
  }

  /// Prunes every commit with a timestamp strictly newer than `time`.
  pub fn remove_newer_than(&mut self, time: i64) {
    loop {
      self.discard_stale();
      match self.heap.peek() {
        Some(top) if top.time > time => {
          self.commits.remove(&top.commit);
          self.heap.pop();
        }
        _ => break,
      }
    }
  }
}

/// A map keyed by commit with O(1) access to the newest key.
///
/// After a prune, insertions newer than the pruned boundary are refused, so
/// entries the window has moved past cannot reappear.
pub struct CommitMap<V> {
  map: HashMap<Commit, V>,
  heap: BinaryHeap<ChronoCommit>,
  window_top: Option<i64>,
}

impl<V> Default for CommitMap<V> {
  fn default() -> Self {
    CommitMap { map: HashMap::new(), heap: BinaryHeap::new(), window_top: None }
  }
}

impl<V> CommitMap<V> {
  pub fn new() -> CommitMap<V> {
    CommitMap::default()
  }

  pub fn is_empty(&self) -> bool {
    self.map.is_empty()
  }

  pub fn len(&self) -> usize {
    self.map.len()
  }

  pub fn contains_key(&self, commit: &Commit) -> bool {
    self.map.contains_key(commit)
  }

  pub fn get(&self, commit: &Commit) -> Option<&V> {
    self.map.get(commit)
  }

  pub fn get_mut(&mut self, commit: &Commit) -> Option<&mut V> {
    self.map.get_mut(commit)
  }

  /// Inserts unless the key lies above the pruned window top. Returns
  /// whether the value was stored.
  pub fn insert(&mut self, commit: Commit, value: V) -> bool {
    let chrono = ChronoCommit::new(commit);
    if let Some(top) = self.window_top {
      if chrono.time > top {
        return false;
      }
    }
    if !self.map.contains_key(&chrono.commit) {
      self.heap.push(chrono.clone());
    }
    self.map.insert(chrono.commit, value);
    true
  }

  fn discard_stale(&mut self) {
    while let Some(top) = self.heap.peek() {
      if self.map.contains_key(&top.commit) {
        break;
      }
      self.heap.pop();
    }
  }

  /// The newest key in the map.
  pub fn peek_newest(&mut self) -> Option<Commit> {
    self.discard_stale();
    self.heap.peek().map(|top| top.commit.clone())
  }

  /// Removes and returns the newest entry.
  pub fn popitem_newest(&mut self) -> Option<(Commit, V)> {
    self.discard_stale();
    let top = self.heap.pop()?;
    let value = self.map.remove(&top.commit)?;
    Some((top.commit, value))
  }

  /// Prunes entries newer than `time` and sets it as the window top.
  pub fn remove_newer_than(&mut self, time: i64) {
    self.window_top = Some(time);
    loop {
      self.discard_stale();
      match self.heap.peek() {
        Some(top) if top.time > time => {
          self.map.remove(&top.commit);
          self.heap.pop();
        }
        _ => break,
      }
    }
  }
}

/// A commit-keyed multimap; `popitem_newest` drains the newest bucket one
/// value at a time.
pub struct CommitMultimap<T> {
  inner: CommitMap<Vec<T>>,
}

impl<T> Default for CommitMultimap<T> {
  fn default() -> Self {
    CommitMultimap { inner: CommitMap::new() }
  }
}

impl<T> CommitMultimap<T> {
  pub fn new() -> CommitMultimap<T> {
    CommitMultimap::default()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.is_empty()
  }

  pub fn add(&mut self, commit: Commit, value: T) {
    if let Some(bucket) = self.inner.get_mut(&commit) {
      bucket.push(value);
      return;
    }
    self.inner.insert(commit, vec![value]);
  }

  /// The newest key with at least one value.
  pub fn peek_newest(&mut self) -> Option<Commit> {
    self.inner.peek_newest()
  }

  /// Removes one value from the newest bucket, dropping the bucket once
  /// empty.
  pub fn popitem_newest(&mut self) -> Option<(Commit, T)> {
    let commit = self.inner.peek_newest()?;
    let bucket = self.inner.get_mut(&commit)?;
    let value = bucket.pop()?;
    if bucket.is_empty() {
      self.inner.map.remove(&commit);
    }
    Some((commit, value))
  }
}

#[cfg(test)]
mod tests {
  use sprig_test_utils::FixtureRepo;

  use crate::git::repo::Repo;

  use super::*;

  struct Fixture {
    _dir: tempfile::TempDir,
    repo: FixtureRepo,
    handle: Repo,
  }

  impl Fixture {
    fn new() -> Fixture {
      let dir = tempfile::tempdir().expect("tempdir");
      let repo = FixtureRepo::new(dir.path()).expect("fixture");
      let handle = Repo::from_git_dir(repo.git_dir().to_path_buf());
      Fixture { _dir: dir, repo, handle }
    }

    fn commit(&mut self, time: i64) -> Commit {
      let hash = self.repo.commit_at(&[], time, "c").expect("commit");
      Commit::new(&self.handle, hash)
    }

    fn missing(&self) -> Commit {
      Commit::new(&self.handle, FixtureRepo::missing_hash())
    }
  }

  fn in_set(set: &CommitSet, commits: &[Commit]) -> Vec<usize> {
    commits.iter().enumerate().filter(|(_, c)| set.contains(c)).map(|(i, _)| i).collect()
  }

  #[test]
  fn test_commit_set_window_with_out_of_order_sequence() {
    let mut f = Fixture::new();
    let a = f.commit(100);
    let b = f.commit(150);
    let c = f.commit(145);
    let d = f.commit(208);
    let e = f.commit(400);
    let commits = [a.clone(), b.clone(), c.clone(), d.clone(), e.clone()];
    let window = 60;

    let mut w = CommitSet::with(e);
    assert_eq!(in_set(&w, &commits), vec![4]);
    w.insert(d.clone());
    assert_eq!(in_set(&w, &commits), vec![3, 4]);
    w.remove_newer_than(208 + window);
    assert_eq!(in_set(&w, &commits), vec![3]);
    w.insert(c.clone());
    assert_eq!(in_set(&w, &commits), vec![2, 3]);
    w.remove_newer_than(145 + window);
    assert_eq!(in_set(&w, &commits), vec![2]);
    w.insert(b.clone());
    assert_eq!(in_set(&w, &commits), vec![1, 2]);
    w.remove_newer_than(150 + window);
    assert_eq!(in_set(&w, &commits), vec![1, 2]);
    w.insert(a.clone());
    assert_eq!(in_set(&w, &commits), vec![0, 1, 2]);
    w.remove_newer_than(100 + window);
    assert_eq!(in_set(&w, &commits), vec![0, 1, 2]);
  }

  #[test]
  fn test_commit_set_last_added() {
    let mut f = Fixture::new();
    let a = f.commit(150);
    let b = f.commit(145);
    let c = f.commit(208);

    let mut w = CommitSet::with(c.clone());
    assert_eq!(w.last_added(), Some(&c));
    w.add(Some(b.clone()));
    assert_eq!(w.last_added(), Some(&b));
    w.add(Some(a.clone()));
    assert_eq!(w.last_added(), Some(&a));
    w.add(None);
    assert_eq!(w.last_added(), None);
  }

  #[test]
  fn test_commit_set_missing_commit_sorts_oldest() {
    let mut f = Fixture::new();
    let missing = f.missing();
    let b = f.commit(150);
    let c = f.commit(208);
    let d = f.commit(300);

    let mut w = CommitSet::with(d.clone());
    w.insert(c.clone());
    w.insert(b.clone());
    w.insert(missing.clone());
    w.remove_newer_than(150 + 60);
    assert!(w.contains(&missing));
    assert!(w.contains(&b));
    assert!(w.contains(&c));
    assert!(!w.contains(&d));
    // The missing commit is the last one out.
    w.remove_newer_than(i64::MIN);
    assert_eq!(w.peek_newest(), Some(missing.clone()));
  }

  #[test]
  fn test_commit_set_pop_order_is_newest_first() {
    let mut f = Fixture::new();
    let a = f.commit(100);
    let b = f.commit(300);
    let c = f.commit(200);
    let mut set = CommitSet::new();
    set.insert(a.clone());
    set.insert(b.clone());
    set.insert(c.clone());

    assert_eq!(set.pop_newest(), Some(b));
    assert_eq!(set.pop_newest(), Some(c));
    assert_eq!(set.pop_newest(), Some(a));
    assert_eq!(set.pop_newest(), None);
  }

  #[test]
  fn test_commit_map_refuses_reinsertion_above_window_top() {
    let mut f = Fixture::new();
    let newer = f.commit(400);
    let older = f.commit(100);

    let mut map: CommitMap<u32> = CommitMap::new();
    assert!(map.insert(newer.clone(), 1));
    map.remove_newer_than(200);
    assert!(!map.contains_key(&newer));
    // Pruned entries stay out.
    assert!(!map.insert(newer.clone(), 2));
    assert!(map.insert(older.clone(), 3));
    assert_eq!(map.popitem_newest(), Some((older, 3)));
  }

  #[test]
  fn test_commit_multimap_drains_newest_bucket() {
    let mut f = Fixture::new();
    let a = f.commit(100);
    let b = f.commit(300);

    let mut mm: CommitMultimap<&str> = CommitMultimap::new();
    mm.add(a.clone(), "old");
    mm.add(b.clone(), "new-1");
    mm.add(b.clone(), "new-2");

    let (first_commit, _) = mm.popitem_newest().expect("pop");
    assert_eq!(first_commit, b);
    let (second_commit, _) = mm.popitem_newest().expect("pop");
    assert_eq!(second_commit, b);
    let (third_commit, third) = mm.popitem_newest().expect("pop");
    assert_eq!(third_commit, a);
    assert_eq!(third, "old");
    assert!(mm.is_empty());
  }
}
