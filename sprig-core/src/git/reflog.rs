//! # Reflog Reader
//!
//! Streams a branch's reflog newest-entry-first via the reverse line
//! reader. Each line is
//! `<old-sha1> <new-sha1> <identity> <epoch> <tz>\t<message>`; only the new
//! hash and the timestamp are extracted.

use std::path::Path;

use tracing::warn;

use crate::git::commit::Commit;
use crate::git::repo::Repo;
use crate::git::revlines::{LinesReversed, lines_reversed};

/// One reflog line: the commit the ref moved to, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflogEntry {
  pub commit: Commit,
  pub timestamp: i64,
}

/// Parses one reflog line, or `None` if it does not have the expected
/// shape.
pub fn parse_reflog_line(repo: &Repo, line: &str) -> Option<ReflogEntry> {
  let hash = line.get(41..81)?;
  if !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
    return None;
  }
  let after_identity = line.get(81..)?;
  let (_, tail) = after_identity.split_once('>')?;
  let timestamp = tail.trim_start().split(' ').next()?.parse::<i64>().ok()?;
  Some(ReflogEntry {
    commit: Commit::new(repo, hash.to_owned()),
    timestamp,
  })
}

/// Iterator over reflog entries, newest first.
///
/// Holds one file handle, released when the iterator is dropped. A line
/// that fails to read or parse ends the stream with a warning — a truncated
/// reflog should degrade the graph, not abort the render.
pub struct ReflogIter {
  repo: Repo,
  name: String,
  lines: Option<LinesReversed>,
}

/// Opens the reflog for a ref named relative to `refs/`. A missing reflog
/// file reads as empty.
pub fn reflog(repo: &Repo, relative: &str) -> ReflogIter {
  let path = repo.git_dir().join("logs").join("refs").join(relative);
  let lines = open_if_present(&path);
  ReflogIter {
    repo: repo.clone(),
    name: relative.to_owned(),
    lines,
  }
}

fn open_if_present(path: &Path) -> Option<LinesReversed> {
  if !path.is_file() {
    return None;
  }
  match lines_reversed(path) {
    Ok(lines) => Some(lines),
    Err(e) => {
      warn!("cannot open reflog {}: {e}", path.display());
      None
    }
  }
}

impl Iterator for ReflogIter {
  type Item = ReflogEntry;

  fn next(&mut self) -> Option<Self::Item> {
    let lines = self.lines.as_mut()?;
    loop {
      match lines.next() {
        None => {
          self.lines = None;
          return None;
        }
        Some(Err(e)) => {
          warn!("error reading reflog for {}: {e}", self.name);
          self.lines = None;
          return None;
        }
        Some(Ok(line)) => {
          let trimmed = line.trim_end_matches('\n');
          if trimmed.is_empty() {
            continue;
          }
          match parse_reflog_line(&self.repo, trimmed) {
            Some(entry) => return Some(entry),
            None => {
              warn!("unparseable reflog line for {}", self.name);
              self.lines = None;
              return None;
            }
          }
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use sprig_test_utils::FixtureRepo;

  use super::*;

  #[test]
  fn test_parse_reflog_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fixture = FixtureRepo::new(dir.path()).expect("fixture");
    let repo = Repo::from_git_dir(fixture.git_dir().to_path_buf());

    let line = "0000000000000000000000000000000000000000 \
12abcdef12abcdef12abcdef12abcdef12abcdef \
A U Thor <author@example.com> 1669204860 +0000\tcommit (initial): root";
    let entry = parse_reflog_line(&repo, line).expect("parse");
    assert_eq!(entry.commit.hash(), "12abcdef12abcdef12abcdef12abcdef12abcdef");
    assert_eq!(entry.timestamp, 1669204860);

    assert!(parse_reflog_line(&repo, "short line").is_none());
  }

  #[test]
  fn test_reflog_iterates_newest_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fixture = FixtureRepo::new(dir.path()).expect("fixture");
    let repo = Repo::from_git_dir(fixture.git_dir().to_path_buf());
    fixture
      .reflog(
        "main",
        &[
          ("00000000000000000000000000000000000000aa", 100),
          ("00000000000000000000000000000000000000bb", 200),
          ("00000000000000000000000000000000000000cc", 300),
        ],
      )
      .expect("reflog");

    let entries: Vec<ReflogEntry> = reflog(&repo, "heads/main").collect();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].timestamp, 300);
    assert_eq!(entries[0].commit.hash(), "00000000000000000000000000000000000000cc");
    assert_eq!(entries[2].timestamp, 100);
  }

  #[test]
  fn test_missing_reflog_reads_as_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fixture = FixtureRepo::new(dir.path()).expect("fixture");
    let repo = Repo::from_git_dir(fixture.git_dir().to_path_buf());
    assert_eq!(reflog(&repo, "heads/ghost").count(), 0);
  }
}
