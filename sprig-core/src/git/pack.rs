//! # Pack Subsystem
//!
//! Readers for git's v2 pack index and pack data files, delta application,
//! and the pack-directory lookup that backs the object store when a hash has
//! no loose file.
//!
//! Index layout: 8-byte magic, 256-entry big-endian fanout, sorted 20-byte
//! hashes at `0x408`, a CRC table, then 4-byte offsets (top bit set means
//! the low 15 bits index an 8-byte large-offset table).

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::error::{GitError, Result};
use crate::git::decode::decompress;

const INDEX_MAGIC: [u8; 8] = [0xff, b't', b'O', b'c', 0x00, 0x00, 0x00, 0x02];
const PACK_MAGIC: [u8; 8] = [b'P', b'A', b'C', b'K', 0x00, 0x00, 0x00, 0x02];

/// The object kinds stored in a pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
  Commit,
  Tree,
  Blob,
  Tag,
}

impl ObjectKind {
  fn from_type_bits(bits: u8) -> Option<Self> {
    match bits {
      1 => Some(ObjectKind::Commit),
      2 => Some(ObjectKind::Tree),
      3 => Some(ObjectKind::Blob),
      4 => Some(ObjectKind::Tag),
      _ => None,
    }
  }
}

fn read_u32(file: &mut File) -> Result<u32> {
  let mut buf = [0u8; 4];
  file.read_exact(&mut buf)?;
  Ok(u32::from_be_bytes(buf))
}

fn read_u64(file: &mut File) -> Result<u64> {
  let mut buf = [0u8; 8];
  file.read_exact(&mut buf)?;
  Ok(u64::from_be_bytes(buf))
}

fn read_byte(file: &mut File) -> Result<u8> {
  let mut buf = [0u8; 1];
  file.read_exact(&mut buf)?;
  Ok(buf[0])
}

/// A v2 pack index file.
///
/// The file handle is opened on first use and reused for every lookup until
/// [`PackIndex::close`]. The 256-entry fanout is cached at init and both
/// hits and misses are cached per hash, so a repeated lookup — and any miss
/// whose fanout bracket is empty — never touches the file.
pub struct PackIndex {
  path: PathBuf,
  file: Option<File>,
  fanout: Option<Box<[u32; 256]>>,
  small_offsets_table: u64,
  large_offsets_table: u64,
  cache: HashMap<String, Option<u64>>,
}

impl PackIndex {
  /// Creates a handle without touching the file.
  pub fn open(path: PathBuf) -> Self {
    PackIndex {
      path,
      file: None,
      fanout: None,
      small_offsets_table: 0,
      large_offsets_table: 0,
      cache: HashMap::new(),
    }
  }

  /// Drops the open file handle, keeping the fanout and lookup caches.
  pub fn close(&mut self) {
    self.file = None;
  }

  fn init(&mut self) -> Result<()> {
    if self.fanout.is_some() {
      return Ok(());
    }
    let file = self.file()?;
    let mut header = [0u8; 8];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut header)?;
    if header != INDEX_MAGIC {
      return Err(GitError::UnsupportedIndex(self.path.clone()));
    }
    let mut raw_fanout = [0u8; 1024];
    file.read_exact(&mut raw_fanout)?;
    let mut fanout = Box::new([0u32; 256]);
    for (i, slot) in fanout.iter_mut().enumerate() {
      let bytes: [u8; 4] = raw_fanout[4 * i..4 * i + 4]
        .try_into()
        .map_err(|_| GitError::UnsupportedIndex(self.path.clone()))?;
      *slot = u32::from_be_bytes(bytes);
    }
    let size = u64::from(fanout[255]);
    self.small_offsets_table = 0x408 + 24 * size;
    self.large_offsets_table = 0x408 + 28 * size;
    self.fanout = Some(fanout);
    Ok(())
  }

  fn file(&mut self) -> Result<&mut File> {
    if self.file.is_none() {
      self.file = Some(File::open(&self.path)?);
    }
    self
      .file
      .as_mut()
      .ok_or_else(|| GitError::Io(std::io::Error::other("pack index handle closed")))
  }

  /// Fanout bracket for a first byte: positions `[start, end)` of the
  /// sorted hash table that can hold hashes starting with it.
  fn bracket(&self, first: u8) -> (u64, u64) {
    let fanout = match &self.fanout {
      Some(fanout) => fanout,
      None => return (0, 0),
    };
    let start = if first == 0 { 0 } else { u64::from(fanout[first as usize - 1]) };
    (start, u64::from(fanout[first as usize]))
  }

  /// Binary-searches the sorted hash table for `hash`, returning its
  /// position if present.
  fn find_index(&mut self, hash: &[u8; 20]) -> Result<Option<u64>> {
    let (mut start, mut end) = self.bracket(hash[0]);
    while start < end {
      let mid = (start + end) / 2;
      let file = self.file()?;
      file.seek(SeekFrom::Start(0x408 + 20 * mid))?;
      let mut hash_at_mid = [0u8; 20];
      file.read_exact(&mut hash_at_mid)?;
      match (*hash).cmp(&hash_at_mid) {
        std::cmp::Ordering::Equal => return Ok(Some(mid)),
        std::cmp::Ordering::Less => end = mid,
        std::cmp::Ordering::Greater => start = mid + 1,
      }
    }
    Ok(None)
  }

  /// Returns the pack-file offset of `hash`, or `None` if the index does
  /// not contain it.
  pub fn offset(&mut self, hash: &str) -> Result<Option<u64>> {
    if let Some(cached) = self.cache.get(hash) {
      return Ok(*cached);
    }
    self.init()?;
    let Ok(bytes) = hex::decode(hash) else {
      return Ok(None);
    };
    let Ok(raw) = <[u8; 20]>::try_from(bytes) else {
      return Ok(None);
    };

    let offset = match self.find_index(&raw)? {
      None => None,
      Some(idx) => {
        let small_offsets_table = self.small_offsets_table;
        let large_offsets_table = self.large_offsets_table;
        let file = self.file()?;
        file.seek(SeekFrom::Start(small_offsets_table + idx * 4))?;
        let short = read_u32(file)?;
        if short < 0x8000 {
          Some(u64::from(short))
        } else {
          file.seek(SeekFrom::Start(large_offsets_table + 8 * u64::from(short & 0x7FFF)))?;
          Some(read_u64(file)?)
        }
      }
    };
    self.cache.insert(hash.to_owned(), offset);
    Ok(offset)
  }

  /// Whether the index contains `hash`.
  pub fn contains(&mut self, hash: &str) -> Result<bool> {
    Ok(self.offset(hash)?.is_some())
  }
}

/// An object read from a pack at a given offset, before delta resolution.
#[derive(Debug)]
pub enum RawObject {
  /// A complete object.
  Data { kind: ObjectKind, data: Vec<u8> },
  /// A delta against the object at `base_offset` in the same pack.
  OfsDelta { base_offset: u64, delta: Vec<u8> },
  /// A delta against the object named by `base_hash`.
  RefDelta { base_hash: String, delta: Vec<u8> },
}

/// A v2 pack data file.
pub struct PackData {
  path: PathBuf,
  file: Option<File>,
  checked: bool,
}

impl PackData {
  /// Creates a handle without touching the file.
  pub fn open(path: PathBuf) -> Self {
    PackData { path, file: None, checked: false }
  }

  fn file(&mut self) -> Result<&mut File> {
    if self.file.is_none() {
      self.file = Some(File::open(&self.path)?);
    }
    let file = self
      .file
      .as_mut()
      .ok_or_else(|| GitError::Io(std::io::Error::other("pack data handle closed")))?;
    if !self.checked {
      let mut header = [0u8; 8];
      file.seek(SeekFrom::Start(0))?;
      file.read_exact(&mut header)?;
      if header != PACK_MAGIC {
        return Err(GitError::UnsupportedPack(self.path.clone()));
      }
      self.checked = true;
    }
    Ok(file)
  }

  /// Reads the object header and payload at `offset`.
  pub fn read_object(&mut self, offset: u64) -> Result<RawObject> {
    let path = self.path.clone();
    let file = self.file()?;
    file.seek(SeekFrom::Start(offset))?;

    // Variable-length size header: type in bits 4-6 of the first byte, the
    // size in the low 4 bits plus 7 bits per continuation byte.
    let mut byte = read_byte(file)?;
    let type_bits = (byte >> 4) & 0x7;
    let mut size = u64::from(byte & 0x0F);
    let mut shift = 4;
    while byte & 0x80 != 0 {
      byte = read_byte(file)?;
      size |= u64::from(byte & 0x7F) << shift;
      shift += 7;
    }

    match type_bits {
      1..=4 => {
        let kind = ObjectKind::from_type_bits(type_bits)
          .ok_or_else(|| GitError::CorruptObject(format!("bad object type in {}", path.display())))?;
        let data = decompress(&mut *file)?;
        if data.len() as u64 != size {
          return Err(GitError::CorruptObject(format!(
            "object at {offset:#x} in {} decompressed to {} bytes, expected {size}",
            path.display(),
            data.len(),
          )));
        }
        Ok(RawObject::Data { kind, data })
      }
      6 => {
        // Offset-encoded base pointer, big-endian with the +1-per-byte
        // quirk of the pack format.
        let mut byte = read_byte(file)?;
        let mut relative = u64::from(byte & 0x7F);
        while byte & 0x80 != 0 {
          byte = read_byte(file)?;
          relative = ((relative + 1) << 7) | u64::from(byte & 0x7F);
        }
        let base_offset = offset.checked_sub(relative).ok_or_else(|| {
          GitError::CorruptObject(format!("delta base before start of {}", path.display()))
        })?;
        let delta = decompress(&mut *file)?;
        if delta.len() as u64 != size {
          return Err(GitError::CorruptObject("truncated ofs-delta payload".into()));
        }
        Ok(RawObject::OfsDelta { base_offset, delta })
      }
      7 => {
        let mut base = [0u8; 20];
        file.read_exact(&mut base)?;
        let delta = decompress(&mut *file)?;
        if delta.len() as u64 != size {
          return Err(GitError::CorruptObject("truncated ref-delta payload".into()));
        }
        Ok(RawObject::RefDelta { base_hash: hex::encode(base), delta })
      }
      other => Err(GitError::CorruptObject(format!(
        "unsupported pack object type {other} at {offset:#x} in {}",
        path.display(),
      ))),
    }
  }
}

fn read_delta_size(delta: &[u8], pos: &mut usize) -> Result<u64> {
  let mut size = 0u64;
  let mut shift = 0;
  loop {
    let &byte = delta
      .get(*pos)
      .ok_or_else(|| GitError::CorruptObject("truncated delta size".into()))?;
    *pos += 1;
    size |= u64::from(byte & 0x7F) << shift;
    shift += 7;
    if byte & 0x80 == 0 {
      return Ok(size);
    }
  }
}

/// Reconstructs an object from its base and a delta instruction stream.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
  let mut pos = 0;
  let base_size = read_delta_size(delta, &mut pos)?;
  if base_size != base.len() as u64 {
    return Err(GitError::CorruptObject(format!(
      "delta base size {base_size} does not match base length {}",
      base.len(),
    )));
  }
  let output_size = read_delta_size(delta, &mut pos)?;

  let mut out = Vec::with_capacity(output_size as usize);
  while pos < delta.len() {
    let instruction = delta[pos];
    pos += 1;
    if instruction & 0x80 != 0 {
      // COPY: low bits select which offset/size bytes follow, assembled
      // little-endian. A size of zero means 0x10000.
      let mut offset = 0usize;
      for bit in 0..4 {
        if instruction & (1 << bit) != 0 {
          let &byte = delta
            .get(pos)
            .ok_or_else(|| GitError::CorruptObject("truncated copy offset".into()))?;
          pos += 1;
          offset |= (byte as usize) << (8 * bit);
        }
      }
      let mut size = 0usize;
      for bit in 0..3 {
        if instruction & (1 << (4 + bit)) != 0 {
          let &byte = delta
            .get(pos)
            .ok_or_else(|| GitError::CorruptObject("truncated copy size".into()))?;
          pos += 1;
          size |= (byte as usize) << (8 * bit);
        }
      }
      if size == 0 {
        size = 0x10000;
      }
      let end = offset
        .checked_add(size)
        .filter(|&end| end <= base.len())
        .ok_or_else(|| GitError::CorruptObject("delta copy out of bounds".into()))?;
      out.extend_from_slice(&base[offset..end]);
    } else if instruction == 0 {
      return Err(GitError::CorruptObject("reserved delta instruction".into()));
    } else {
      // INSERT: the instruction byte is the literal length.
      let len = instruction as usize;
      let literal = delta
        .get(pos..pos + len)
        .ok_or_else(|| GitError::CorruptObject("truncated delta literal".into()))?;
      pos += len;
      out.extend_from_slice(literal);
    }
  }

  if out.len() as u64 != output_size {
    return Err(GitError::CorruptObject(format!(
      "delta produced {} bytes, expected {output_size}",
      out.len(),
    )));
  }
  Ok(out)
}

struct PackEntry {
  index: PackIndex,
  data: PackData,
}

/// Reads a loose object, returning its kind and body. Used as the fallback
/// for REF-delta bases that no pack index knows.
fn loose_object(git_dir: &Path, hash: &str) -> Result<Option<(ObjectKind, Vec<u8>)>> {
  if hash.len() < 3 {
    return Ok(None);
  }
  let path = git_dir.join("objects").join(&hash[..2]).join(&hash[2..]);
  let file = match File::open(&path) {
    Ok(file) => file,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(e.into()),
  };
  let raw = decompress(file)?;

  // Loose objects carry a `<kind> <len>\0` header before the body.
  let nul = raw
    .iter()
    .position(|&b| b == 0)
    .ok_or_else(|| GitError::CorruptObject(format!("loose object without header: {hash}")))?;
  let name = raw[..nul].split(|&b| b == b' ').next().unwrap_or_default();
  let kind = if name == &b"commit"[..] {
    ObjectKind::Commit
  } else if name == &b"tree"[..] {
    ObjectKind::Tree
  } else if name == &b"blob"[..] {
    ObjectKind::Blob
  } else if name == &b"tag"[..] {
    ObjectKind::Tag
  } else {
    return Err(GitError::CorruptObject(format!("unknown loose object kind for {hash}")));
  };
  Ok(Some((kind, raw[nul + 1..].to_vec())))
}

/// The pack files of `objects/pack`, most recently written first.
pub struct PackDir {
  git_dir: PathBuf,
  packs: Vec<PackEntry>,
}

impl PackDir {
  /// Enumerates `<git_dir>/objects/pack/*.pack`, pairing each with its
  /// `.idx` and ordering by file mtime descending so the most recently
  /// written pack is searched first.
  pub fn open(git_dir: &Path) -> Result<Self> {
    let pack_dir = git_dir.join("objects").join("pack");
    let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();
    match fs::read_dir(&pack_dir) {
      Ok(entries) => {
        for entry in entries {
          let entry = entry?;
          let path = entry.path();
          if path.extension().and_then(|e| e.to_str()) != Some("pack") {
            continue;
          }
          if !path.with_extension("idx").is_file() {
            warn!("pack without index skipped: {}", path.display());
            continue;
          }
          let mtime = entry.metadata()?.modified().unwrap_or(SystemTime::UNIX_EPOCH);
          found.push((mtime, path));
        }
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => return Err(e.into()),
    }
    found.sort_by(|a, b| b.0.cmp(&a.0));
    debug!("found {} pack(s) in {}", found.len(), pack_dir.display());

    let packs = found
      .into_iter()
      .map(|(_, path)| PackEntry {
        index: PackIndex::open(path.with_extension("idx")),
        data: PackData::open(path),
      })
      .collect();
    Ok(PackDir { git_dir: git_dir.to_path_buf(), packs })
  }

  /// Whether any pack contains `hash`.
  pub fn contains(&mut self, hash: &str) -> Result<bool> {
    for pack in &mut self.packs {
      if pack.index.contains(hash)? {
        return Ok(true);
      }
    }
    Ok(false)
  }

  /// Looks `hash` up across all packs, resolving deltas.
  pub fn get(&mut self, hash: &str) -> Result<Option<(ObjectKind, Vec<u8>)>> {
    for i in 0..self.packs.len() {
      if let Some(offset) = self.packs[i].index.offset(hash)? {
        return self.resolve(i, offset).map(Some);
      }
    }
    Ok(None)
  }

  fn resolve(&mut self, pack: usize, offset: u64) -> Result<(ObjectKind, Vec<u8>)> {
    match self.packs[pack].data.read_object(offset)? {
      RawObject::Data { kind, data } => Ok((kind, data)),
      RawObject::OfsDelta { base_offset, delta } => {
        let (kind, base) = self.resolve(pack, base_offset)?;
        Ok((kind, apply_delta(&base, &delta)?))
      }
      RawObject::RefDelta { base_hash, delta } => {
        // The owning pack's index (and its siblings) first, then the
        // loose store.
        let base = match self.get(&base_hash)? {
          Some(base) => Some(base),
          None => loose_object(&self.git_dir, &base_hash)?,
        };
        let (kind, base) = base.ok_or_else(|| GitError::MissingObject(base_hash))?;
        Ok((kind, apply_delta(&base, &delta)?))
      }
    }
  }
}
