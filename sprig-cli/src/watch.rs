//! # Watch Mode
//!
//! A polling change watcher and the live redraw loop. Every poll interval
//! the watcher snapshots the parts of `.git` the graph depends on — HEAD,
//! config, packed-refs, everything under `refs/` and `logs/`, and the pack
//! listing — and a differing snapshot triggers a fresh [`Repo`] and a full
//! redraw. SIGINT/SIGTERM end the loop cleanly.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use tracing::debug;

use sprig_core::git::Repo;

use crate::display::{RenderConfig, render};

/// Clear the screen and home the cursor.
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[0;0H";

type Snapshot = BTreeMap<PathBuf, (SystemTime, u64)>;

/// Watches a `.git` directory for observable state changes by polling file
/// metadata.
pub struct ChangeWatcher {
  git_dir: PathBuf,
  last: Option<Snapshot>,
}

impl ChangeWatcher {
  pub fn new(git_dir: &Path) -> ChangeWatcher {
    ChangeWatcher { git_dir: git_dir.to_path_buf(), last: None }
  }

  /// Re-snapshots the repository; true when state may have changed since
  /// the previous poll (always true on the first).
  pub fn poll(&mut self) -> bool {
    let snapshot = self.snapshot();
    let changed = self.last.as_ref() != Some(&snapshot);
    self.last = Some(snapshot);
    changed
  }

  fn snapshot(&self) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for file in ["HEAD", "config", "packed-refs"] {
      record(&mut snapshot, &self.git_dir.join(file));
    }
    record_tree(&mut snapshot, &self.git_dir.join("refs"));
    record_tree(&mut snapshot, &self.git_dir.join("logs"));
    record_tree(&mut snapshot, &self.git_dir.join("objects").join("pack"));
    snapshot
  }
}

fn record(snapshot: &mut Snapshot, path: &Path) {
  if let Ok(meta) = fs::metadata(path) {
    if meta.is_file() {
      let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
      snapshot.insert(path.to_path_buf(), (mtime, meta.len()));
    }
  }
}

fn record_tree(snapshot: &mut Snapshot, dir: &Path) {
  let Ok(entries) = fs::read_dir(dir) else {
    return;
  };
  for entry in entries.flatten() {
    let path = entry.path();
    if path.is_dir() {
      record_tree(snapshot, &path);
    } else {
      record(snapshot, &path);
    }
  }
}

fn interrupt_flag() -> anyhow::Result<Arc<AtomicBool>> {
  let flag = Arc::new(AtomicBool::new(false));
  #[cfg(unix)]
  {
    signal_hook::flag::register(signal_hook::consts::SIGINT, flag.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, flag.clone())?;
  }
  Ok(flag)
}

/// Renders immediately, then redraws whenever the watcher reports a change,
/// until interrupted.
pub fn watch_loop(config: &RenderConfig, poll_every: Duration) -> anyhow::Result<()> {
  let interrupted = interrupt_flag()?;
  let repo = Repo::open()?;
  let mut watcher = ChangeWatcher::new(repo.git_dir());
  drop(repo);

  let mut stdout = std::io::stdout();
  while !interrupted.load(Ordering::Relaxed) {
    if watcher.poll() {
      debug!("repository state changed; redrawing");
      // A fresh handle per redraw drops every cache the last one filled.
      let repo = Repo::open()?;
      stdout.write_all(CLEAR_SCREEN.as_bytes())?;
      render(&repo, config, &mut stdout)?;
      stdout.flush()?;
    }
    std::thread::sleep(poll_every);
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use sprig_test_utils::FixtureRepo;

  use super::*;

  #[test]
  fn test_watcher_reports_initial_and_changed_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut fixture = FixtureRepo::new(dir.path()).expect("fixture");
    let tip = fixture.commit_at(&[], 100, "tip").expect("commit");
    fixture.branch("main", &tip).expect("branch");

    let mut watcher = ChangeWatcher::new(fixture.git_dir());
    assert!(watcher.poll(), "first poll always reports a change");
    assert!(!watcher.poll(), "unchanged state is quiet");

    // Same-length ref content; give coarse mtime clocks room to tick.
    std::thread::sleep(Duration::from_millis(20));
    let tip2 = fixture.commit_at(&[&tip], 200, "next").expect("commit");
    fixture.branch("main", &tip2).expect("branch");
    assert!(watcher.poll(), "a moved ref is a change");
    assert!(!watcher.poll());
  }

  #[test]
  fn test_watcher_sees_head_and_config_changes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut fixture = FixtureRepo::new(dir.path()).expect("fixture");
    let mut watcher = ChangeWatcher::new(fixture.git_dir());
    watcher.poll();

    fixture.head("feature").expect("head");
    assert!(watcher.poll());

    fixture.append_config("[remote]\n  pushdefault = origin\n").expect("config");
    assert!(watcher.poll());
  }
}
