//! # Reverse Line Reader
//!
//! Streams the lines of a file last-to-first without loading the whole file,
//! reading backwards in fixed-size chunks. Produces exactly the sequence a
//! forward, line-oriented reader would produce, reversed: `\r\n` and lone
//! `\r` endings are normalised to `\n`, a missing final newline is
//! preserved, and lines longer than a chunk or split across chunk
//! boundaries (including mid-CRLF and mid-UTF-8-sequence splits) are
//! reassembled before being decoded.
//!
//! The reflog readers rely on this to consume `logs/refs/...` newest-entry
//! first.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{GitError, Result};

const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Iterator over the lines of a file, in reverse order.
///
/// Holds a single seekable handle, closed when the iterator is dropped.
pub struct LinesReversed {
  file: Option<File>,
  path: PathBuf,
  pos: u64,
  chunk_size: usize,
  // Partial-line pieces accumulated across chunks, latest-read first.
  pending: Vec<Vec<u8>>,
  queue: VecDeque<Vec<u8>>,
  done: bool,
}

/// Opens `path` for reverse line iteration with the default chunk size.
pub fn lines_reversed(path: &Path) -> Result<LinesReversed> {
  lines_reversed_with_chunk_size(path, DEFAULT_CHUNK_SIZE)
}

/// Opens `path` for reverse line iteration, reading `chunk_size` bytes at a
/// time.
pub fn lines_reversed_with_chunk_size(path: &Path, chunk_size: usize) -> Result<LinesReversed> {
  debug_assert!(chunk_size > 0);
  let mut file = File::open(path)?;
  let pos = file.seek(SeekFrom::End(0))?;
  Ok(LinesReversed {
    file: Some(file),
    path: path.to_path_buf(),
    pos,
    chunk_size,
    pending: Vec::new(),
    queue: VecDeque::new(),
    done: false,
  })
}

/// Splits `data` into lines, keeping the `\n`, `\r\n` or `\r` terminators.
fn split_lines_keepends(data: &[u8]) -> Vec<Vec<u8>> {
  let mut lines = Vec::new();
  let mut start = 0;
  let mut i = 0;
  while i < data.len() {
    match data[i] {
      b'\n' => {
        lines.push(data[start..=i].to_vec());
        start = i + 1;
        i += 1;
      }
      b'\r' => {
        let end = if data.get(i + 1) == Some(&b'\n') { i + 1 } else { i };
        lines.push(data[start..=end].to_vec());
        start = end + 1;
        i = end + 1;
      }
      _ => i += 1,
    }
  }
  if start < data.len() {
    lines.push(data[start..].to_vec());
  }
  lines
}

/// Joins partial-line pieces (stored latest-read, i.e. earliest-in-file,
/// last) back into file order.
fn join_reversed(pieces: &[Vec<u8>]) -> Vec<u8> {
  let mut out = Vec::new();
  for piece in pieces.iter().rev() {
    out.extend_from_slice(piece);
  }
  out
}

impl LinesReversed {
  /// Normalises a raw line's ending and decodes it as UTF-8.
  fn decode_line(&self, mut line: Vec<u8>) -> Result<String> {
    if line.ends_with(b"\r\n") {
      line.truncate(line.len() - 2);
      line.push(b'\n');
    } else if line.ends_with(b"\r") || line.ends_with(b"\n") {
      line.truncate(line.len() - 1);
      line.push(b'\n');
    }
    String::from_utf8(line).map_err(|_| {
      GitError::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("invalid utf-8 in {}", self.path.display()),
      ))
    })
  }

  /// Reads and processes one more chunk, or flushes the trailing pieces once
  /// the start of the file is reached.
  fn advance(&mut self) -> Result<()> {
    if self.pos == 0 {
      if !self.pending.is_empty() {
        let line = join_reversed(&self.pending);
        self.pending.clear();
        self.queue.push_back(line);
      }
      self.done = true;
      self.file = None;
      return Ok(());
    }

    let read_len = (self.chunk_size as u64).min(self.pos);
    self.pos -= read_len;
    let mut chunk = vec![0u8; read_len as usize];
    let file = self
      .file
      .as_mut()
      .ok_or_else(|| GitError::Io(io::Error::other("reverse reader file closed")))?;
    file.seek(SeekFrom::Start(self.pos))?;
    file.read_exact(&mut chunk)?;
    if self.pos == 0 {
      self.file = None;
    }

    // A chunk ending in a newline completes whatever pieces are pending,
    // except when the newline is the `\n` of a CRLF split across the
    // boundary.
    let crlf_split = chunk.ends_with(b"\r") && self.pending.len() == 1 && self.pending[0] == b"\n";
    if !self.pending.is_empty() && (chunk.ends_with(b"\n") || (chunk.ends_with(b"\r") && !crlf_split)) {
      let line = join_reversed(&self.pending);
      self.pending.clear();
      self.queue.push_back(line);
    }

    let mut lines = split_lines_keepends(&chunk);
    while lines.len() > 1 {
      let mut line = lines.pop().unwrap_or_default();
      if !self.pending.is_empty() {
        line.extend(join_reversed(&self.pending));
        self.pending.clear();
      }
      self.queue.push_back(line);
    }
    if let Some(first) = lines.pop() {
      if !first.is_empty() {
        self.pending.push(first);
      }
    }
    Ok(())
  }
}

impl Iterator for LinesReversed {
  type Item = Result<String>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if let Some(raw) = self.queue.pop_front() {
        return Some(self.decode_line(raw));
      }
      if self.done {
        return None;
      }
      if let Err(e) = self.advance() {
        self.done = true;
        return Some(Err(e));
      }
    }
  }
}
