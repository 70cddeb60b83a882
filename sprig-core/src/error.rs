//! # Error Types
//!
//! Failure kinds surfaced by the git reader and the graph analytics. Only
//! [`GitError::MissingCommit`] is routinely absorbed by callers (the
//! analytics truncate their walks on it); every other variant propagates to
//! the top level.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading a repository or computing the branch graph.
#[derive(Debug, Error)]
pub enum GitError {
  /// No `.git` directory was found above the working directory.
  #[error("not a git repository (or any of the parent directories): .git")]
  NotARepository,

  /// A git config file contained a line the parser does not recognise.
  #[error("error parsing {}\nUnexpected line {line}: {content}", path.display())]
  ConfigParse {
    path: PathBuf,
    line: usize,
    content: String,
  },

  /// An environment variable held a value that cannot be interpreted.
  #[error("invalid value for {var}: {value:?}")]
  BadEnvValue { var: &'static str, value: String },

  /// A pack index file is not version 2.
  #[error("unsupported pack index format (must be v2): {}", .0.display())]
  UnsupportedIndex(PathBuf),

  /// A pack data file is not version 2.
  #[error("unsupported pack format (must be v2): {}", .0.display())]
  UnsupportedPack(PathBuf),

  /// An object failed to parse: size mismatch, bad header, malformed delta.
  #[error("corrupt object: {0}")]
  CorruptObject(String),

  /// A hash is present in neither the loose store nor any pack.
  #[error("object not found: {0}")]
  MissingObject(String),

  /// A ref exists in neither its loose file nor packed-refs.
  #[error("ref not found: {0}")]
  MissingRef(String),

  /// A commit attribute was needed but the underlying object is absent.
  ///
  /// Expected in shallow clones; the analytics catch this and truncate.
  #[error("shallow clone: commit not found: {0}")]
  MissingCommit(String),

  /// A zlib stream was truncated or invalid.
  #[error("decompression failed: {0}")]
  Decompress(String),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GitError>;

/// Turns a `MissingCommit` error into `None`, propagating anything else.
///
/// The windowed analytics use this at every point where a shallow clone may
/// have cut the history out from under a walk.
pub fn catch_missing<T>(result: Result<T>) -> Result<Option<T>> {
  match result {
    Ok(value) => Ok(Some(value)),
    Err(GitError::MissingCommit(_)) => Ok(None),
    Err(e) => Err(e),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_catch_missing_passes_values_through() {
    assert_eq!(catch_missing(Ok(7)).unwrap(), Some(7));
  }

  #[test]
  fn test_catch_missing_absorbs_missing_commit() {
    let r: Result<i64> = Err(GitError::MissingCommit("abcd".into()));
    assert_eq!(catch_missing(r).unwrap(), None);
  }

  #[test]
  fn test_catch_missing_propagates_other_errors() {
    let r: Result<i64> = Err(GitError::NotARepository);
    assert!(catch_missing(r).is_err());
  }
}
