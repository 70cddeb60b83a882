//! # Commit-Graph Analytics
//!
//! Partial, time-windowed traversals of the commit DAG. Every operation
//! takes a window in seconds bounding how far apart timestamps may drift
//! before commits are considered unrelated; this caps work and memory at
//! the cost of correctness under extreme clock skew. Queries against the
//! windowed structures must be made in non-increasing commit-time order.
//!
//! Commits missing from the store (shallow clones) silently truncate the
//! walks that would need their parents.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{Result, catch_missing};
use crate::git::branch::LocalBranch;
use crate::git::commit::Commit;
use crate::git::containers::{CommitMap, CommitMultimap, CommitSet, commit_time_or_oldest};
use crate::git::reflog::ReflogIter;

/// The default traversal window. Matches typical author/committer-time
/// skew.
pub const DEFAULT_WINDOW_SECS: i64 = 60;

/// Answers "is this commit reachable from the roots by walking all
/// parents?", maintaining a sliding window that follows the (descending)
/// query times.
pub struct WindowedReachable {
  window: i64,
  reachable: CommitSet,
  todo: CommitSet,
}

impl WindowedReachable {
  pub fn new<I: IntoIterator<Item = Commit>>(roots: I, window: i64) -> WindowedReachable {
    let mut reachable = CommitSet::new();
    let mut todo = CommitSet::new();
    for root in roots {
      if !reachable.contains(&root) {
        reachable.insert(root.clone());
        todo.insert(root);
      }
    }
    WindowedReachable { window, reachable, todo }
  }

  /// Tests membership at `commit`'s point in time, expanding ancestors
  /// into the window and pruning commits that have slid out of it.
  pub fn contains(&mut self, commit: &Commit) -> Result<bool> {
    if let Some(time) = catch_missing(commit.commit_time())? {
      self.expand(time)?;
      self.reachable.remove_newer_than(time + self.window);
    }
    Ok(self.reachable.contains(commit))
  }

  fn expand(&mut self, time: i64) -> Result<()> {
    while let Some(next) = self.todo.peek_newest() {
      if commit_time_or_oldest(&next) < time - self.window {
        break;
      }
      self.todo.pop_newest();
      for parent in next.available_parents()? {
        if !self.reachable.contains(&parent) {
          // Parents above the window top are expanded through but not
          // considered reachable; the queries only move backwards.
          if commit_time_or_oldest(&parent) <= time + self.window {
            self.reachable.insert(parent.clone());
          }
          self.todo.insert(parent);
        }
      }
    }
    Ok(())
  }
}

/// The commits on `upstream`'s first-parent chain not merged into any of
/// the `downstreams`, in walk order.
///
/// The walk ends at the first reachable ancestor, or silently where a
/// shallow clone cut the history.
pub fn unmerged_commits(
  upstream: &Commit,
  downstreams: &[Commit],
  window: i64,
) -> Result<Vec<Commit>> {
  let mut reachable = WindowedReachable::new(downstreams.iter().cloned(), window);
  let mut out = Vec::new();
  let mut cursor = Some(upstream.clone());
  while let Some(commit) = cursor {
    if reachable.contains(&commit)? {
      break;
    }
    out.push(commit.clone());
    cursor = catch_missing(commit.first_parent())?.flatten();
  }
  Ok(out)
}

/// The first-parent chain of `downstream` (inclusive), stopping just before
/// the first commit also reachable from `upstream` by any-parent walk
/// within the window.
pub fn range(upstream: &Commit, downstream: &Commit, window: i64) -> Result<Vec<Commit>> {
  let mut seen = CommitSet::with(upstream.clone());
  let mut todo = CommitSet::with(upstream.clone());
  let mut out = Vec::new();
  let mut cursor = Some(downstream.clone());

  while let Some(commit) = cursor {
    if let Some(time) = catch_missing(commit.commit_time())? {
      while let Some(next) = todo.peek_newest() {
        if commit_time_or_oldest(&next) < time - window {
          break;
        }
        todo.pop_newest();
        for parent in next.available_parents()? {
          if !seen.contains(&parent) {
            seen.insert(parent.clone());
            todo.insert(parent);
          }
        }
      }
      seen.remove_newer_than(time + window);
    }
    if seen.contains(&commit) {
      break;
    }
    out.push(commit.clone());
    cursor = catch_missing(commit.first_parent())?.flatten();
  }
  Ok(out)
}

/// Merges already-reverse-chronological `(commit, value)` streams into one
/// reverse-chronological stream.
pub fn merge_reverse_chronological<T>(inputs: Vec<Vec<(Commit, T)>>) -> Vec<(Commit, T)> {
  let mut iters: Vec<std::vec::IntoIter<(Commit, T)>> =
    inputs.into_iter().map(Vec::into_iter).collect();
  let mut pending: Vec<Option<T>> = iters.iter().map(|_| None).collect();
  let mut heads: CommitMultimap<usize> = CommitMultimap::new();

  for (index, iter) in iters.iter_mut().enumerate() {
    if let Some((commit, value)) = iter.next() {
      heads.add(commit, index);
      pending[index] = Some(value);
    }
  }

  let mut out = Vec::new();
  while let Some((commit, index)) = heads.popitem_newest() {
    if let Some(value) = pending[index].take() {
      out.push((commit, value));
    }
    if let Some((next_commit, next_value)) = iters[index].next() {
      heads.add(next_commit, index);
      pending[index] = Some(next_value);
    }
  }
  out
}

/// Yields `(merged_commit, branch)` pairs, reverse-chronological by merged
/// commit: every commit merged into the first-parent route between each
/// branch and its upstream.
pub fn merge_commits(branches: &[LocalBranch], window: i64) -> Result<Vec<(Commit, LocalBranch)>> {
  let mut streams = Vec::new();
  for branch in branches {
    if let Some(upstream) = branch.upstream()? {
      let chain = range(&upstream.commit()?, &branch.commit()?, window)?;
      streams.push(chain.into_iter().map(|commit| (commit, branch.clone())).collect());
    }
  }

  let mut buffer: CommitMultimap<LocalBranch> = CommitMultimap::new();
  let mut out = Vec::new();
  for (commit, branch) in merge_reverse_chronological(streams) {
    let time = commit_time_or_oldest(&commit);
    // Buffered merge parents newer than the stream head are ready to emit.
    while let Some(top) = buffer.peek_newest() {
      if commit_time_or_oldest(&top) <= time {
        break;
      }
      if let Some(item) = buffer.popitem_newest() {
        out.push(item);
      }
    }
    for merge_parent in commit.available_merge_parents()? {
      buffer.add(merge_parent, branch.clone());
    }
  }
  while let Some(item) = buffer.popitem_newest() {
    out.push(item);
  }
  Ok(out)
}

/// A branch's reflog with its newest unconsumed entry, ordered for the
/// reference heap (most recent entry first).
struct ReflogHead {
  timestamp: i64,
  commit: Commit,
  branch: LocalBranch,
  iter: ReflogIter,
}

impl PartialEq for ReflogHead {
  fn eq(&self, other: &Self) -> bool {
    self.timestamp == other.timestamp && self.branch == other.branch
  }
}

impl Eq for ReflogHead {}

impl Ord for ReflogHead {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .timestamp
      .cmp(&other.timestamp)
      .then_with(|| other.branch.name.cmp(&self.branch.name))
  }
}

impl PartialOrd for ReflogHead {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

/// The branch that first referenced a commit, according to reflog
/// timestamps.
#[derive(Clone)]
struct Claim {
  branch: LocalBranch,
  reflog_time: i64,
}

/// Tracks, within a sliding window, the branch whose reflog first
/// referenced each commit. Queries must be made in non-increasing
/// commit-time order.
pub struct WindowedFirstBranchReferences {
  window: i64,
  reflogs: BinaryHeap<ReflogHead>,
  pending: CommitSet,
  refs: CommitMap<Claim>,
}

impl WindowedFirstBranchReferences {
  pub fn new(branches: &[LocalBranch], window: i64) -> WindowedFirstBranchReferences {
    let mut reflogs = BinaryHeap::new();
    for branch in branches {
      let mut iter = branch.reflog();
      if let Some(entry) = iter.next() {
        reflogs.push(ReflogHead {
          timestamp: entry.timestamp,
          commit: entry.commit,
          branch: branch.clone(),
          iter,
        });
      }
    }
    WindowedFirstBranchReferences {
      window,
      reflogs,
      pending: CommitSet::new(),
      refs: CommitMap::new(),
    }
  }

  fn claim(&mut self, claim: Claim, commit: Commit) {
    if let Some(existing) = self.refs.get_mut(&commit) {
      // The oldest reflog reference wins.
      if claim.reflog_time < existing.reflog_time {
        *existing = claim;
      }
      return;
    }
    if self.refs.insert(commit.clone(), claim) {
      self.pending.insert(commit);
    }
  }

  /// Consumes reflog entries at or after `time`, recording references.
  fn pull_reflogs(&mut self, time: i64) {
    while self.reflogs.peek().is_some_and(|head| head.timestamp >= time) {
      let Some(mut head) = self.reflogs.pop() else {
        break;
      };
      let claim = Claim { branch: head.branch.clone(), reflog_time: head.timestamp };
      let commit = head.commit.clone();
      if let Some(next) = head.iter.next() {
        head.timestamp = next.timestamp;
        head.commit = next.commit;
        self.reflogs.push(head);
      }
      self.claim(claim, commit);
    }
  }

  /// Walks first-parents of pending commits at or after `time`,
  /// propagating each commit's claim to its parent.
  fn walk_pending(&mut self, time: i64) -> Result<()> {
    while let Some(commit) = self.pending.peek_newest() {
      if commit_time_or_oldest(&commit) < time {
        break;
      }
      self.pending.pop_newest();
      let Some(claim) = self.refs.get(&commit).cloned() else {
        continue;
      };
      if let Some(parent) = catch_missing(commit.first_parent())?.flatten() {
        self.claim(claim, parent);
      }
    }
    Ok(())
  }

  /// The branch whose reflog first referenced `commit`, if any within the
  /// window.
  pub fn get(&mut self, commit: &Commit) -> Result<Option<LocalBranch>> {
    let Some(time) = catch_missing(commit.commit_time())? else {
      return Ok(None);
    };
    self.pull_reflogs(time - self.window);
    self.walk_pending(time - self.window)?;
    self.refs.remove_newer_than(time + self.window);
    Ok(self.refs.get(commit).map(|claim| claim.branch.clone()))
  }
}
