//! Pack and pack-index fixture builders.
//!
//! Writes v2 `.idx` and `.pack` bytes with caller-chosen hashes and offsets,
//! matching the layout `sprig-core`'s pack readers parse: 8-byte magics,
//! 256-entry fanout, sorted hash table, CRC table, small/large offset
//! tables, and zlib-compressed object payloads.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::ZlibEncoder;

const INDEX_MAGIC: [u8; 8] = [0xff, b't', b'O', b'c', 0x00, 0x00, 0x00, 0x02];
const PACK_MAGIC: [u8; 8] = [b'P', b'A', b'C', b'K', 0x00, 0x00, 0x00, 0x02];

/// Writes a v2 pack index mapping each hash to its pack offset.
///
/// Offsets below `0x8000` are stored directly; anything larger goes through
/// the large-offset table (top bit of the short slot set, low bits the
/// table position) — the encoding the reader's lookup formula expects.
pub fn write_pack_index(path: &Path, entries: &[(String, u64)]) -> io::Result<()> {
  let mut sorted: Vec<(Vec<u8>, u64)> = entries
    .iter()
    .map(|(hash, offset)| {
      let raw = hex::decode(hash).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
      Ok((raw, *offset))
    })
    .collect::<io::Result<_>>()?;
  sorted.sort();

  let mut fanout = [0u32; 256];
  for (raw, _) in &sorted {
    fanout[raw[0] as usize] += 1;
  }
  for i in 1..256 {
    fanout[i] += fanout[i - 1];
  }

  let mut small_offsets = Vec::with_capacity(sorted.len());
  let mut large_offsets: Vec<u64> = Vec::new();
  for (_, offset) in &sorted {
    if *offset < 0x8000 {
      small_offsets.push(*offset as u32);
    } else {
      small_offsets.push(0x8000 | large_offsets.len() as u32);
      large_offsets.push(*offset);
    }
  }

  let mut out = Vec::new();
  out.extend_from_slice(&INDEX_MAGIC);
  for count in fanout {
    out.extend_from_slice(&count.to_be_bytes());
  }
  for (raw, _) in &sorted {
    out.extend_from_slice(raw);
  }
  for _ in &sorted {
    out.extend_from_slice(&0u32.to_be_bytes()); // CRC32, unread by the lookup path
  }
  for short in small_offsets {
    out.extend_from_slice(&short.to_be_bytes());
  }
  for large in large_offsets {
    out.extend_from_slice(&large.to_be_bytes());
  }

  let mut file = File::create(path)?;
  file.write_all(&out)
}

/// A pack file written to disk, with the offsets of its objects.
pub struct PackFixture {
  pub pack_path: PathBuf,
  pub base_offset: u64,
  pub delta_offset: u64,
  /// The decompressed base object, for assertions.
  pub base: Vec<u8>,
}

/// Builds pack files with objects pinned to chosen offsets.
pub struct PackFixtureBuilder;

fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
  let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
  encoder.write_all(data)?;
  encoder.finish()
}

/// Encodes a pack object header: type in bits 4-6 of the first byte, size
/// in the low 4 bits plus 7 bits per continuation byte.
fn object_header(kind: u8, size: usize) -> Vec<u8> {
  let mut out = Vec::new();
  let mut remaining = size >> 4;
  let mut byte = (kind << 4) | (size & 0x0F) as u8;
  while remaining > 0 {
    out.push(byte | 0x80);
    byte = (remaining & 0x7F) as u8;
    remaining >>= 7;
  }
  out.push(byte);
  out
}

/// Encodes the backwards offset of an OFS delta (big-endian, MSB
/// continuation, with the +1-between-bytes quirk).
fn ofs_encoding(mut value: u64) -> Vec<u8> {
  let mut bytes = vec![(value & 0x7F) as u8];
  value >>= 7;
  while value > 0 {
    value -= 1;
    bytes.push((value & 0x7F) as u8 | 0x80);
    value >>= 7;
  }
  bytes.reverse();
  bytes
}

impl PackFixtureBuilder {
  /// The 251-byte base commit the documented delta applies to. Starts with
  /// `tree 4b825dc642`, carries a parent ending in `93`, message
  /// `Commit 0`.
  fn base_commit() -> Vec<u8> {
    let mut base = Vec::new();
    base.extend_from_slice(b"tree 4b825dc642000000000000000000000000000000\n");
    base.extend_from_slice(b"parent 3");
    base.extend_from_slice(&[b'0'; 37]);
    base.extend_from_slice(b"93\n");
    base.extend_from_slice(b"author A U Thor <author@example.com> 1669204800 +0000\n");
    base.extend_from_slice(b"committer A U Thor <author@example.com> 1669204800 +0000\n");
    base.push(b'\n');
    base.extend_from_slice(b"Initial commit with an empty tree.\n\n");
    base.extend_from_slice(b"Commit 0\n");
    assert_eq!(base.len(), 251, "base commit must be exactly 251 bytes");
    base
  }

  /// The documented delta: copy the first 54 bytes, splice in a new parent
  /// hash, copy through the shared tail, and turn `Commit 0` into
  /// `Commit 1`.
  fn delta() -> Vec<u8> {
    let mut delta = vec![0xfb, 0x01, 0xfb, 0x01, 0x90, 0x36, 0x25];
    delta.extend_from_slice(b"577e8d8a0037df052e118fbae6d6725ccd1ce");
    delta.extend_from_slice(&[0x91, 0x5b, 0x9e, 0x02]);
    delta.extend_from_slice(b"1\n");
    assert_eq!(delta.len(), 50, "delta instruction stream must be 50 bytes");
    delta
  }

  /// Writes `example.pack` into `dir` with the base commit at `0x00C` and
  /// an OFS delta against it at `0x0C3`.
  pub fn documented_fixture(dir: &Path) -> io::Result<PackFixture> {
    const BASE_OFFSET: usize = 0x00C;
    const DELTA_OFFSET: usize = 0x0C3;

    let base = Self::base_commit();
    let delta = Self::delta();

    let mut out = Vec::new();
    out.extend_from_slice(&PACK_MAGIC);
    out.extend_from_slice(&2u32.to_be_bytes());
    assert_eq!(out.len(), BASE_OFFSET);

    out.extend_from_slice(&object_header(1, base.len()));
    let compressed_base = compress(&base)?;
    out.extend_from_slice(&compressed_base);
    if out.len() > DELTA_OFFSET {
      return Err(io::Error::other(format!(
        "base object overruns the delta offset: ends at {:#x}",
        out.len(),
      )));
    }
    out.resize(DELTA_OFFSET, 0);

    out.extend_from_slice(&object_header(6, delta.len()));
    out.extend_from_slice(&ofs_encoding((DELTA_OFFSET - BASE_OFFSET) as u64));
    out.extend_from_slice(&compress(&delta)?);

    let pack_path = dir.join("example.pack");
    std::fs::write(&pack_path, &out)?;
    Ok(PackFixture {
      pack_path,
      base_offset: BASE_OFFSET as u64,
      delta_offset: DELTA_OFFSET as u64,
      base,
    })
  }

  /// Writes a pack holding one REF_DELTA object (plus its index) into
  /// `<git_dir>/objects/pack`. The base is named by hash only, so readers
  /// must resolve it through other packs or the loose store.
  pub fn ref_delta_pack(
    git_dir: &Path,
    delta_hash: &str,
    base_hash: &str,
    delta: &[u8],
  ) -> io::Result<()> {
    let pack_dir = git_dir.join("objects").join("pack");
    std::fs::create_dir_all(&pack_dir)?;

    let raw_base =
      hex::decode(base_hash).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut out = Vec::new();
    out.extend_from_slice(&PACK_MAGIC);
    out.extend_from_slice(&1u32.to_be_bytes());
    let offset = out.len() as u64;
    out.extend_from_slice(&object_header(7, delta.len()));
    out.extend_from_slice(&raw_base);
    out.extend_from_slice(&compress(delta)?);

    std::fs::write(pack_dir.join("refdelta.pack"), &out)?;
    write_pack_index(&pack_dir.join("refdelta.idx"), &[(delta_hash.to_owned(), offset)])
  }

  /// Writes a single-commit pack plus its index into `<git_dir>/objects/pack`,
  /// so object-store tests can exercise the loose-miss path.
  pub fn single_commit_pack(git_dir: &Path, hash: &str, commit_body: &[u8]) -> io::Result<()> {
    let pack_dir = git_dir.join("objects").join("pack");
    std::fs::create_dir_all(&pack_dir)?;

    let mut out = Vec::new();
    out.extend_from_slice(&PACK_MAGIC);
    out.extend_from_slice(&1u32.to_be_bytes());
    let offset = out.len() as u64;
    out.extend_from_slice(&object_header(1, commit_body.len()));
    out.extend_from_slice(&compress(commit_body)?);

    std::fs::write(pack_dir.join("fixture.pack"), &out)?;
    write_pack_index(&pack_dir.join("fixture.idx"), &[(hash.to_owned(), offset)])
  }
}
