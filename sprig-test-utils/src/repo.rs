//! Synthetic repository fixtures.
//!
//! `FixtureRepo` lays out a `.git` directory by hand: zlib-compressed loose
//! commit objects with fabricated hashes, refs, packed-refs, reflogs, HEAD,
//! and config. Commit timestamps and parent links are fully caller-chosen,
//! which the windowed-analytics tests rely on for clock-skew scenarios.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::ZlibEncoder;

/// A `.git` directory under construction.
pub struct FixtureRepo {
  root: PathBuf,
  git_dir: PathBuf,
  next_object: u64,
  config: String,
}

impl FixtureRepo {
  /// Creates `<root>/.git` with the standard skeleton and `HEAD` pointing
  /// at `main`.
  pub fn new(root: &Path) -> io::Result<Self> {
    let git_dir = root.join(".git");
    fs::create_dir_all(git_dir.join("objects"))?;
    fs::create_dir_all(git_dir.join("refs").join("heads"))?;
    fs::create_dir_all(git_dir.join("refs").join("remotes"))?;
    fs::create_dir_all(git_dir.join("logs").join("refs").join("heads"))?;
    fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n")?;
    fs::write(git_dir.join("config"), "")?;
    Ok(FixtureRepo {
      root: root.to_path_buf(),
      git_dir,
      next_object: 0,
      config: String::new(),
    })
  }

  /// The working-directory root (the parent of `.git`).
  pub fn root(&self) -> &Path {
    &self.root
  }

  /// The `.git` directory.
  pub fn git_dir(&self) -> &Path {
    &self.git_dir
  }

  fn next_hash(&mut self) -> String {
    self.next_object += 1;
    // Spread fabricated hashes across the hex space so fixtures also
    // exercise fanout brackets beyond 0x00.
    format!("{:02x}{:038x}", (self.next_object * 41) % 256, self.next_object)
  }

  /// A well-formed hash that no object in the fixture will ever have.
  pub fn missing_hash() -> String {
    "ffffffffffffffffffffffffffffffffffffffff".to_owned()
  }

  /// Writes a loose commit object and returns its fabricated hash.
  pub fn commit(
    &mut self,
    parents: &[&str],
    author_time: i64,
    commit_time: i64,
    message: &str,
  ) -> io::Result<String> {
    let mut body = String::from("tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
    for parent in parents {
      body.push_str(&format!("parent {parent}\n"));
    }
    body.push_str(&format!("author A U Thor <author@example.com> {author_time} +0000\n"));
    body.push_str(&format!("committer A U Thor <author@example.com> {commit_time} +0000\n"));
    body.push('\n');
    body.push_str(message);
    if !message.ends_with('\n') {
      body.push('\n');
    }

    let hash = self.next_hash();
    self.write_loose_object(&hash, body.as_bytes())?;
    Ok(hash)
  }

  /// Writes a loose commit whose author and committer timestamps coincide.
  pub fn commit_at(&mut self, parents: &[&str], time: i64, message: &str) -> io::Result<String> {
    self.commit(parents, time, time, message)
  }

  /// Writes raw bytes as a loose object under `hash`.
  pub fn write_loose_object(&self, hash: &str, body: &[u8]) -> io::Result<()> {
    let full = [format!("commit {}\0", body.len()).into_bytes(), body.to_vec()].concat();
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&full)?;
    let compressed = encoder.finish()?;

    let dir = self.git_dir.join("objects").join(&hash[..2]);
    fs::create_dir_all(&dir)?;
    fs::write(dir.join(&hash[2..]), compressed)
  }

  /// Creates or updates a local branch ref.
  pub fn branch(&self, name: &str, hash: &str) -> io::Result<()> {
    let path = self.git_dir.join("refs").join("heads").join(name);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{hash}\n"))
  }

  /// Creates or updates a remote-tracking branch ref.
  pub fn remote_branch(&self, remote: &str, name: &str, hash: &str) -> io::Result<()> {
    let path = self.git_dir.join("refs").join("remotes").join(remote).join(name);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{hash}\n"))
  }

  /// Writes a `packed-refs` file. Keys are full ref names
  /// (`refs/heads/main`, `refs/remotes/origin/main`, ...).
  pub fn packed_refs(&self, entries: &[(&str, &str)]) -> io::Result<()> {
    let mut contents = String::from("# pack-refs with: peeled fully-peeled sorted\n");
    for (refname, hash) in entries {
      contents.push_str(&format!("{hash} {refname}\n"));
    }
    fs::write(self.git_dir.join("packed-refs"), contents)
  }

  /// Points HEAD at a branch.
  pub fn head(&self, name: &str) -> io::Result<()> {
    fs::write(self.git_dir.join("HEAD"), format!("ref: refs/heads/{name}\n"))
  }

  /// Appends a section to the repository config file.
  pub fn append_config(&mut self, section: &str) -> io::Result<()> {
    self.config.push_str(section);
    if !section.ends_with('\n') {
      self.config.push('\n');
    }
    fs::write(self.git_dir.join("config"), &self.config)
  }

  /// Configures `branch.<name>` with a local upstream.
  pub fn set_upstream(&mut self, branch: &str, upstream: &str) -> io::Result<()> {
    self.append_config(&format!(
      "[branch \"{branch}\"]\n  remote = .\n  merge = refs/heads/{upstream}\n",
    ))
  }

  /// Configures `branch.<name>` with a remote upstream.
  pub fn set_remote_upstream(&mut self, branch: &str, remote: &str, upstream: &str) -> io::Result<()> {
    self.append_config(&format!(
      "[branch \"{branch}\"]\n  remote = {remote}\n  merge = refs/heads/{upstream}\n",
    ))
  }

  /// Writes a branch reflog. Entries are `(new_hash, timestamp)` pairs in
  /// file order, i.e. oldest first.
  pub fn reflog(&self, branch: &str, entries: &[(&str, i64)]) -> io::Result<()> {
    let path = self.git_dir.join("logs").join("refs").join("heads").join(branch);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    let mut contents = String::new();
    let mut old = "0".repeat(40);
    for (new, timestamp) in entries {
      contents.push_str(&format!(
        "{old} {new} A U Thor <author@example.com> {timestamp} +0000\tcommit: fixture\n",
      ));
      old = (*new).to_owned();
    }
    fs::write(path, contents)
  }
}
