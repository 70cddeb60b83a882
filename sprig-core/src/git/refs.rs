//! # Ref Readers
//!
//! Loose ref files and the `packed-refs` fallback. Ref names are handled
//! relative to `refs/` throughout (`heads/main`, `remotes/origin/main`).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{GitError, Result};
use crate::git::repo::Repo;

/// Parses `<git_dir>/packed-refs` into a map keyed by ref name relative to
/// `refs/`.
///
/// Comment lines (`#`) and peeled-tag lines (`^`) are skipped; an absent
/// file yields an empty map.
pub fn read_packed_refs(git_dir: &Path) -> Result<HashMap<String, String>> {
  let contents = match fs::read_to_string(git_dir.join("packed-refs")) {
    Ok(contents) => contents,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
    Err(e) => return Err(e.into()),
  };

  let mut refs = HashMap::new();
  for line in contents.lines() {
    if line.starts_with('#') || line.starts_with('^') || line.is_empty() {
      continue;
    }
    if let Some((hash, refname)) = line.split_once(' ') {
      if let Some(relative) = refname.strip_prefix("refs/") {
        refs.insert(relative.to_owned(), hash.to_owned());
      }
    }
  }
  Ok(refs)
}

/// Resolves a ref (named relative to `refs/`) to its commit hash, reading
/// the loose file first and falling back to packed-refs.
pub fn read_ref(repo: &Repo, relative: &str) -> Result<String> {
  let loose = repo.git_dir().join("refs").join(relative);
  match fs::read_to_string(&loose) {
    Ok(contents) => {
      let hash = contents.lines().next().unwrap_or("").trim();
      return Ok(hash.to_owned());
    }
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
    Err(e) => return Err(e.into()),
  }
  repo
    .packed_refs()?
    .get(relative)
    .cloned()
    .ok_or_else(|| GitError::MissingRef(relative.to_owned()))
}

/// Whether a ref exists as a loose file or a packed-refs entry.
pub fn ref_exists(repo: &Repo, relative: &str) -> Result<bool> {
  if repo.git_dir().join("refs").join(relative).is_file() {
    return Ok(true);
  }
  Ok(repo.packed_refs()?.contains_key(relative))
}
