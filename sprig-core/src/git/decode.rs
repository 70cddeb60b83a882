//! # Object Decoder
//!
//! zlib inflation and commit-object parsing. A commit object is a short
//! header (`commit <len>\0`), newline-delimited header lines (`tree`,
//! `parent`, `author`, `committer`, ...), a blank line, and the message.
//! Only the fields the branch graph needs are extracted.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::{GitError, Result};

/// Decompresses a zlib stream read from `reader`.
///
/// Reads until the decompressor reports end-of-stream; bytes beyond the
/// stream are tolerated and left unread.
pub fn decompress<R: Read>(reader: R) -> Result<Vec<u8>> {
  let mut decoder = ZlibDecoder::new(reader);
  let mut out = Vec::new();
  decoder
    .read_to_end(&mut out)
    .map_err(|e| GitError::Decompress(e.to_string()))?;
  Ok(out)
}

/// The decoded fields of a commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitData {
  /// Parent hashes, in object order. The first entry is the first parent.
  pub parents: Vec<String>,
  /// Author timestamp, in epoch seconds. Preserved across rebases and
  /// cherry-picks.
  pub author_time: i64,
  /// Committer timestamp, in epoch seconds.
  pub commit_time: i64,
  /// The commit message, including its trailing newline.
  pub message: Vec<u8>,
}

impl CommitData {
  /// Parses a decompressed commit object body.
  pub fn decode(raw: &[u8]) -> Result<Self> {
    let body_start = raw
      .iter()
      .position(|&b| b == 0)
      .map(|i| i + 1)
      .unwrap_or(0);
    let body = &raw[body_start..];

    let mut parents = Vec::new();
    let mut author_time = None;
    let mut commit_time = None;
    let mut offset = 0;

    loop {
      let rest = &body[offset..];
      let Some(line_end) = rest.iter().position(|&b| b == b'\n') else {
        return Err(GitError::CorruptObject("missing header terminator".into()));
      };
      let line = &rest[..line_end];
      offset += line_end + 1;
      if line.is_empty() {
        break;
      }
      if let Some(hash) = line.strip_prefix(b"parent ") {
        parents.push(
          std::str::from_utf8(hash)
            .map_err(|_| GitError::CorruptObject("non-ascii parent hash".into()))?
            .to_owned(),
        );
      } else if let Some(ident) = line.strip_prefix(b"author ") {
        if author_time.replace(identity_timestamp(ident)?).is_some() {
          return Err(GitError::CorruptObject("multiple author headers".into()));
        }
      } else if let Some(ident) = line.strip_prefix(b"committer ") {
        if commit_time.replace(identity_timestamp(ident)?).is_some() {
          return Err(GitError::CorruptObject("multiple committer headers".into()));
        }
      }
    }

    let author_time =
      author_time.ok_or_else(|| GitError::CorruptObject("missing author header".into()))?;
    let commit_time =
      commit_time.ok_or_else(|| GitError::CorruptObject("missing committer header".into()))?;
    Ok(CommitData {
      parents,
      author_time,
      commit_time,
      message: body[offset..].to_vec(),
    })
  }

  /// The first parent's hash, if the commit has parents.
  pub fn first_parent(&self) -> Option<&str> {
    self.parents.first().map(String::as_str)
  }
}

/// Extracts the epoch-seconds timestamp from an identity line tail:
/// `Name <email> <epoch> <tz>`.
fn identity_timestamp(ident: &[u8]) -> Result<i64> {
  let mut fields = ident.rsplit(|&b| b == b' ');
  let _tz = fields
    .next()
    .ok_or_else(|| GitError::CorruptObject("truncated identity line".into()))?;
  let epoch = fields
    .next()
    .ok_or_else(|| GitError::CorruptObject("truncated identity line".into()))?;
  std::str::from_utf8(epoch)
    .ok()
    .and_then(|s| s.parse::<i64>().ok())
    .ok_or_else(|| GitError::CorruptObject("unparseable identity timestamp".into()))
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use flate2::Compression;
  use flate2::write::ZlibEncoder;

  use super::*;

  fn compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("compress");
    encoder.finish().expect("finish")
  }

  const SAMPLE: &[u8] = b"commit 196\0tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
parent 3577e8d8a0037df052e118fbae6d6725ccd1ce93\n\
author An Author <author@example.com> 1669204860 +0000\n\
committer A Committer <committer@example.com> 1669204920 +0000\n\
\n\
Commit 1\n";

  #[test]
  fn test_decompress_round_trip() {
    let compressed = compress(b"hello world");
    assert_eq!(decompress(&compressed[..]).expect("decompress"), b"hello world");
  }

  #[test]
  fn test_decompress_tolerates_trailing_bytes() {
    let mut compressed = compress(b"payload");
    compressed.extend_from_slice(b"garbage after the stream");
    assert_eq!(decompress(&compressed[..]).expect("decompress"), b"payload");
  }

  #[test]
  fn test_decompress_rejects_truncated_stream() {
    let compressed = compress(b"some payload that compresses");
    let truncated = &compressed[..compressed.len() / 2];
    assert!(decompress(truncated).is_err());
  }

  #[test]
  fn test_decode_extracts_fields() {
    let data = CommitData::decode(SAMPLE).expect("decode");
    assert_eq!(data.parents, vec!["3577e8d8a0037df052e118fbae6d6725ccd1ce93".to_owned()]);
    assert_eq!(data.first_parent(), Some("3577e8d8a0037df052e118fbae6d6725ccd1ce93"));
    assert_eq!(data.author_time, 1669204860);
    assert_eq!(data.commit_time, 1669204920);
    assert_eq!(data.message, b"Commit 1\n");
  }

  #[test]
  fn test_decode_root_commit_has_no_parents() {
    let raw = b"commit 0\0tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
author A <a@b> 100 +0000\ncommitter A <a@b> 101 +0000\n\nroot\n";
    let data = CommitData::decode(raw).expect("decode");
    assert!(data.parents.is_empty());
    assert_eq!(data.first_parent(), None);
  }

  #[test]
  fn test_decode_preserves_parent_order() {
    let raw = b"commit 0\0parent aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n\
parent bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb\n\
author A <a@b> 100 +0000\ncommitter A <a@b> 101 +0000\n\nmerge\n";
    let data = CommitData::decode(raw).expect("decode");
    assert_eq!(data.first_parent(), Some("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"));
    assert_eq!(data.parents.len(), 2);
  }

  #[test]
  fn test_decode_requires_author_and_committer() {
    let no_author = b"commit 0\0tree x\ncommitter A <a@b> 101 +0000\n\nmsg\n";
    assert!(CommitData::decode(no_author).is_err());
    let no_committer = b"commit 0\0tree x\nauthor A <a@b> 100 +0000\n\nmsg\n";
    assert!(CommitData::decode(no_committer).is_err());
  }

  #[test]
  fn test_decode_multiline_message() {
    let raw = b"commit 0\0author A <a@b> 100 +0000\ncommitter A <a@b> 101 +0000\n\
\nSubject line\n\nBody paragraph.\n";
    let data = CommitData::decode(raw).expect("decode");
    assert_eq!(data.message, b"Subject line\n\nBody paragraph.\n");
  }
}
