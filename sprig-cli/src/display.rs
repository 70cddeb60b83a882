//! # Row Rendering
//!
//! Turns the branch DAG into output lines: node art, branch name, remote
//! status icon, and unmerged count. The escape sequences are part of the
//! output contract, so they are spelled out here rather than routed through
//! a styling crate.

use std::io::Write;

use sprig_core::art::layout;
use sprig_core::dag::Dag;
use sprig_core::error::Result;
use sprig_core::git::{
  DEFAULT_WINDOW_SECS, LocalBranch, Repo, SyncStatus, Upstream, branches, compute_branch_dag,
  remote_sync_status, unmerged_commits,
};

pub const BOLD_MAGENTA: &str = "\x1b[1;35m";
pub const BOLD_RED: &str = "\x1b[1;31m";
pub const GREY: &str = "\x1b[37m";
pub const RESET: &str = "\x1b[0m";

const IN_SYNC_ICON: &str = " \u{1F537}";
const OUT_OF_SYNC_ICON: &str = " \u{1F536}";

/// Output options the renderer observes.
#[derive(Debug, Clone, Copy)]
pub struct RenderConfig {
  pub color: bool,
  pub remote_icons: bool,
}

/// Renders the full branch graph of `repo` into `out`.
pub fn render(repo: &Repo, config: &RenderConfig, out: &mut impl Write) -> anyhow::Result<()> {
  let all = branches(repo)?;
  let dag = compute_branch_dag(&all, DEFAULT_WINDOW_SECS)?;
  let rows = layout(&dag, branch_key);
  for (art, branch) in rows {
    let line = format_row(&art.to_string(), &branch, &dag, config)?;
    out.write_all(line.as_bytes())?;
  }
  Ok(())
}

/// The display sort key: author timestamp, then name. A branch whose tip
/// cannot be read sorts oldest rather than aborting the render.
fn branch_key(branch: &LocalBranch) -> (i64, String) {
  (branch.timestamp().unwrap_or(i64::MIN), branch.name.clone())
}

/// Formats one output row, trailing newline included.
pub fn format_row(
  art: &str,
  branch: &LocalBranch,
  dag: &Dag<LocalBranch>,
  config: &RenderConfig,
) -> Result<String> {
  let mut row = format!("{art}  ");

  let merged = merged_into_upstream(branch)?;
  if config.color && branch.is_head()? {
    row.push_str(BOLD_MAGENTA);
    row.push_str(&branch.name);
    row.push_str(RESET);
  } else if config.color && merged {
    row.push_str(GREY);
    row.push_str(&branch.name);
    row.push_str(RESET);
  } else {
    row.push_str(&branch.name);
  }

  if config.remote_icons {
    match remote_sync_status(branch)? {
      SyncStatus::InSync => row.push_str(IN_SYNC_ICON),
      SyncStatus::OutOfSync => row.push_str(OUT_OF_SYNC_ICON),
      SyncStatus::NoRemote => {}
    }
  }

  if !merged {
    let behind = commits_behind_parents(branch, dag)?;
    if behind > 0 {
      if config.color {
        row.push_str(BOLD_RED);
      }
      row.push_str(&format!(" [{behind} unmerged]"));
      if config.color {
        row.push_str(RESET);
      }
    }
  }

  row.push('\n');
  Ok(row)
}

/// Whether every commit of `branch` is reachable from its local upstream —
/// the branch is safe to delete.
fn merged_into_upstream(branch: &LocalBranch) -> Result<bool> {
  let Some(Upstream::Local(upstream)) = branch.upstream()? else {
    return Ok(false);
  };
  let unmerged = unmerged_commits(&branch.commit()?, &[upstream.commit()?], DEFAULT_WINDOW_SECS)?;
  Ok(unmerged.is_empty())
}

/// How many commits on the branch's graph parents have not been merged into
/// the branch.
fn commits_behind_parents(branch: &LocalBranch, dag: &Dag<LocalBranch>) -> Result<usize> {
  let tip = branch.commit()?;
  let mut behind = 0;
  for parent in dag.parents_of(branch) {
    behind += unmerged_commits(&parent.commit()?, &[tip.clone()], DEFAULT_WINDOW_SECS)?.len();
  }
  Ok(behind)
}
