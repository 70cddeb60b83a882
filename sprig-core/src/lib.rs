//! # Sprig Core Library
//!
//! The pipeline that turns a working directory into a rendered branch
//! graph: a from-scratch reader for git's on-disk formats (config, loose
//! and packed objects, refs, reflogs), windowed commit-graph analytics that
//! stay cheap under clock skew and shallow clones, and the branch-level
//! DAG layout with per-row Unicode box-drawing art.
//!
//! The crate never writes to the repository and never invokes git.

pub mod art;
pub mod dag;
pub mod error;
pub mod git;
pub mod order;

// Re-export the main types for the CLI and other consumers
pub use art::{NodeArt, add_node_art, layout};
pub use dag::Dag;
pub use error::{GitError, Result, catch_missing};
pub use git::{
  Commit, DEFAULT_WINDOW_SECS, LocalBranch, ReflogEntry, RemoteBranch, Repo, SyncStatus, Upstream,
  branches, compute_branch_dag, merge_commits, range, remote_sync_status, unmerged_commits,
};
