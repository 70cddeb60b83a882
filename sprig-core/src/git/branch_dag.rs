//! # Branch DAG Builder
//!
//! Derives the branch-level graph the renderer draws: upstream
//! relationships plus "which branch was merged here" edges recovered from
//! merge commits and reflog first-references. Edges are inserted newest
//! first, so when history rewrites produce a cyclic relationship the most
//! recent merge wins and the older back-edge is dropped by the DAG's cycle
//! rejection.

use tracing::debug;

use crate::dag::Dag;
use crate::error::Result;
use crate::git::analytics::{
  WindowedFirstBranchReferences, merge_commits, merge_reverse_chronological,
};
use crate::git::branch::{LocalBranch, Upstream};
use crate::git::commit::Commit;
use crate::git::containers::commit_time_or_oldest;

/// Computes the DAG of merge and upstream connections between branches.
pub fn compute_branch_dag(branches: &[LocalBranch], window: i64) -> Result<Dag<LocalBranch>> {
  // Upstream edges, newest upstream commit first. Remote upstreams carry
  // sync status instead of graph edges.
  let mut upstream_edges: Vec<(Commit, (LocalBranch, LocalBranch))> = Vec::new();
  for branch in branches {
    if let Some(Upstream::Local(upstream)) = branch.upstream()? {
      let commit = upstream.commit()?;
      upstream_edges.push((commit, (upstream, branch.clone())));
    }
  }
  upstream_edges.sort_by_key(|(commit, _)| std::cmp::Reverse(commit_time_or_oldest(commit)));

  // Merge edges: each commit merged into a branch's first-parent route,
  // attributed to the branch whose reflog first referenced it.
  let mut references = WindowedFirstBranchReferences::new(branches, window);
  let mut merge_edges: Vec<(Commit, (LocalBranch, LocalBranch))> = Vec::new();
  for (commit, branch) in merge_commits(branches, window)? {
    if let Some(merged_branch) = references.get(&commit)? {
      merge_edges.push((commit, (merged_branch, branch)));
    }
  }

  let mut dag = Dag::new();
  for branch in branches {
    dag.ensure_node(branch.clone());
  }
  for (commit, (parent, child)) in merge_reverse_chronological(vec![merge_edges, upstream_edges]) {
    if !dag.add(parent.clone(), child.clone()) {
      debug!("dropped branch edge {parent} -> {child} at {commit}");
    }
  }
  Ok(dag)
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use sprig_test_utils::FixtureRepo;

  use crate::git::analytics::DEFAULT_WINDOW_SECS;
  use crate::git::branch::branches;
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

    fn commit(&mut self, time: i64, parents: &[&str]) -> String {
      self.repo.commit_at(parents, time, "c").expect("commit")
    }

    fn dag(&self) -> Dag<LocalBranch> {
      let all = branches(&self.handle).expect("branches");
      compute_branch_dag(&all, DEFAULT_WINDOW_SECS).expect("dag")
    }

    fn edge_names(dag: &Dag<LocalBranch>) -> HashSet<(String, String)> {
      dag
        .edges()
        .into_iter()
        .map(|(p, c)| (p.name.clone(), c.name.clone()))
        .collect()
    }
  }

  #[test]
  fn test_simple_chain_no_merges() {
    // a -- b -- c -- d -- e
    // ↑         ↑         ↑
    // X         Y         Z
    let mut f = Fixture::new();
    let a = f.commit(100, &[]);
    let b = f.commit(300, &[&a]);
    let c = f.commit(310, &[&b]);
    let d = f.commit(320, &[&c]);
    let e = f.commit(500, &[&d]);
    f.repo.branch("x", &a).expect("branch");
    f.repo.branch("y", &c).expect("branch");
    f.repo.branch("z", &e).expect("branch");
    f.repo.reflog("x", &[(&a, 100)]).expect("reflog");
    f.repo.reflog("y", &[(&c, 310)]).expect("reflog");
    f.repo.reflog("z", &[(&e, 500)]).expect("reflog");
    f.repo.set_upstream("y", "x").expect("config");
    f.repo.set_upstream("z", "y").expect("config");

    let dag = f.dag();
    assert_eq!(
      Fixture::edge_names(&dag),
      HashSet::from([("x".into(), "y".into()), ("y".into(), "z".into())]),
    );
  }

  #[test]
  fn test_merge_attributed_to_merged_branch() {
    // X         Z
    // ↓         ↓
    // a -- b -- e
    //  \       /
    //   c --- d  ← Y
    let mut f = Fixture::new();
    let a = f.commit(100, &[]);
    let b = f.commit(300, &[&a]);
    let c = f.commit(310, &[&a]);
    let d = f.commit(320, &[&c]);
    let e = f.commit(500, &[&b, &d]);
    f.repo.branch("x", &a).expect("branch");
    f.repo.branch("y", &d).expect("branch");
    f.repo.branch("z", &e).expect("branch");
    f.repo.reflog("x", &[(&a, 100)]).expect("reflog");
    f.repo.reflog("y", &[(&c, 310), (&d, 320)]).expect("reflog");
    f.repo.reflog("z", &[(&e, 500)]).expect("reflog");
    f.repo.set_upstream("y", "x").expect("config");
    f.repo.set_upstream("z", "x").expect("config");

    let dag = f.dag();
    assert_eq!(
      Fixture::edge_names(&dag),
      HashSet::from([
        ("x".into(), "y".into()),
        ("x".into(), "z".into()),
        ("y".into(), "z".into()),
      ]),
    );
  }

  #[test]
  fn test_past_merge_still_links_branches() {
    // X              Z
    // ↓              ↓
    // a -- b -- e -- f
    //  \       /
    //   c --- d  ← Y
    let mut f = Fixture::new();
    let a = f.commit(100, &[]);
    let b = f.commit(300, &[&a]);
    let c = f.commit(310, &[&a]);
    let d = f.commit(320, &[&c]);
    let e = f.commit(500, &[&b, &d]);
    let fc = f.commit(510, &[&e]);
    f.repo.branch("x", &a).expect("branch");
    f.repo.branch("y", &d).expect("branch");
    f.repo.branch("z", &fc).expect("branch");
    f.repo.reflog("x", &[(&a, 100)]).expect("reflog");
    f.repo.reflog("y", &[(&c, 310), (&d, 320)]).expect("reflog");
    f.repo.reflog("z", &[(&e, 500), (&fc, 510)]).expect("reflog");
    f.repo.set_upstream("y", "x").expect("config");
    f.repo.set_upstream("z", "x").expect("config");

    let dag = f.dag();
    assert_eq!(
      Fixture::edge_names(&dag),
      HashSet::from([
        ("x".into(), "y".into()),
        ("x".into(), "z".into()),
        ("y".into(), "z".into()),
      ]),
    );
  }

  #[test]
  fn test_cyclic_merge_keeps_most_recent_edge() {
    // X              Z
    // ↓              ↓
    // a -- b -- f -- g
    //  \    \       /
    //   c --- d -- e  ← Y
    let mut f = Fixture::new();
    let a = f.commit(100, &[]);
    let b = f.commit(300, &[&a]);
    let c = f.commit(310, &[&a]);
    let d = f.commit(320, &[&c, &b]);
    let e = f.commit(500, &[&d]);
    let fc = f.commit(510, &[&b]);
    let g = f.commit(520, &[&fc, &e]);
    f.repo.branch("x", &a).expect("branch");
    f.repo.branch("y", &e).expect("branch");
    f.repo.branch("z", &g).expect("branch");
    f.repo.reflog("x", &[(&a, 100)]).expect("reflog");
    f.repo.reflog("y", &[(&c, 310), (&d, 320), (&e, 500)]).expect("reflog");
    f.repo.reflog("z", &[(&b, 305), (&fc, 510), (&g, 520)]).expect("reflog");
    f.repo.set_upstream("y", "x").expect("config");
    f.repo.set_upstream("z", "x").expect("config");

    // Y merged Z's old tip (b) long ago; Z merged Y's tip (e) most
    // recently. The newer merge wins, the older back-edge is dropped.
    let dag = f.dag();
    assert_eq!(
      Fixture::edge_names(&dag),
      HashSet::from([
        ("x".into(), "y".into()),
        ("x".into(), "z".into()),
        ("y".into(), "z".into()),
      ]),
    );
  }

  #[test]
  fn test_altered_history_attributes_via_reflog() {
    // X         Z
    // ↓         ↓
    // a -- b -- e
    // |\       /
    // | c --- d
    //  \
    //   c' -- d' ← Y     (Y used to point at d)
    let mut f = Fixture::new();
    let a = f.commit(100, &[]);
    let b = f.commit(300, &[&a]);
    let c = f.commit(310, &[&a]);
    let d = f.commit(320, &[&c]);
    let e = f.commit(500, &[&b, &d]);
    let c2 = f.commit(600, &[&a]);
    let d2 = f.commit(601, &[&c2]);
    f.repo.branch("x", &a).expect("branch");
    f.repo.branch("y", &d2).expect("branch");
    f.repo.branch("z", &e).expect("branch");
    f.repo.reflog("x", &[(&a, 100)]).expect("reflog");
    f.repo
      .reflog("y", &[(&a, 305), (&c, 310), (&d, 320), (&d2, 601)])
      .expect("reflog");
    f.repo.reflog("z", &[(&e, 500)]).expect("reflog");
    f.repo.set_upstream("y", "x").expect("config");
    f.repo.set_upstream("z", "x").expect("config");

    let dag = f.dag();
    assert_eq!(
      Fixture::edge_names(&dag),
      HashSet::from([
        ("x".into(), "y".into()),
        ("x".into(), "z".into()),
        ("y".into(), "z".into()),
      ]),
    );
  }

  #[test]
  fn test_overlapping_reflogs_oldest_reference_wins() {
    // W         Z
    // ↓         ↓
    // a -- b -- e
    //  \       /
    //   c --- d -- f  ← Y
    //    \
    //     d'  ← X        (X referenced d before Y did)
    let mut f = Fixture::new();
    let a = f.commit(100, &[]);
    let b = f.commit(300, &[&a]);
    let c = f.commit(310, &[&a]);
    let d = f.commit(320, &[&c]);
    let e = f.commit(400, &[&b, &d]);
    let fc = f.commit(500, &[&d]);
    let d2 = f.commit(800, &[&c]);
    f.repo.branch("w", &a).expect("branch");
    f.repo.branch("x", &d2).expect("branch");
    f.repo.branch("y", &fc).expect("branch");
    f.repo.branch("z", &e).expect("branch");
    f.repo.reflog("w", &[(&a, 100)]).expect("reflog");
    f.repo
      .reflog("x", &[(&a, 100), (&c, 310), (&d, 320), (&d2, 800)])
      .expect("reflog");
    f.repo.reflog("y", &[(&d, 480), (&fc, 500)]).expect("reflog");
    f.repo.reflog("z", &[(&e, 400)]).expect("reflog");
    f.repo.set_upstream("x", "w").expect("config");
    f.repo.set_upstream("y", "w").expect("config");
    f.repo.set_upstream("z", "w").expect("config");

    let dag = f.dag();
    assert_eq!(
      Fixture::edge_names(&dag),
      HashSet::from([
        ("w".into(), "x".into()),
        ("w".into(), "y".into()),
        ("w".into(), "z".into()),
        ("x".into(), "z".into()),
      ]),
    );
  }
}
