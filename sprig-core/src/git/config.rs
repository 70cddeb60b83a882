//! # Config Reader
//!
//! Layered git configuration: the system, user, and repository config files
//! are parsed into one map, later files overriding earlier ones. The line
//! grammar mirrors git's `#`-commented INI dialect, including backslash
//! escapes in quoted subsection names and values.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{GitError, Result};

/// A section address: `[core]` is `("core", None)`, `[branch "main"]` is
/// `("branch", Some("main"))`.
pub type ConfigKey = (String, Option<String>);

/// The merged configuration map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
  sections: HashMap<ConfigKey, HashMap<String, String>>,
}

impl Config {
  /// Looks up `key` in an unsubsectioned section.
  pub fn get(&self, section: &str, key: &str) -> Option<&str> {
    self
      .sections
      .get(&(section.to_owned(), None))
      .and_then(|m| m.get(key))
      .map(String::as_str)
  }

  /// Looks up `key` in a subsectioned section such as `branch."main"`.
  pub fn get_sub(&self, section: &str, subsection: &str, key: &str) -> Option<&str> {
    self
      .sections
      .get(&(section.to_owned(), Some(subsection.to_owned())))
      .and_then(|m| m.get(key))
      .map(String::as_str)
  }

  /// All keys of one section, if present.
  pub fn section(&self, key: &ConfigKey) -> Option<&HashMap<String, String>> {
    self.sections.get(key)
  }
}

static SINGLE_STRING_KEY: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#"^\[(\S+)\](\s*#.*)?$"#).expect("static regex"));
static DOUBLE_STRING_KEY: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#"^\[(\S+)\s+"([^\\"]*(?:\\.[^\\"]*)*)"\](\s*#.*)?$"#).expect("static regex"));
static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r##"^([-\w]+)\s*=\s*([^"#\s](?:[^#]*[^#\s])?)(\s*#.*)?$"##).expect("static regex")
});
static KEY_QUOTED_VALUE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r##"^(\w+)\s*=\s*"([^\\"]*(?:\\.[^\\"]*)*)"(\s*#.*)?$"##).expect("static regex")
});
static BLANK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^(#.*)?$"#).expect("static regex"));

/// Decodes the backslash escapes git allows in quoted strings, including
/// `\xNN` and `\uXXXX` numeric forms. Unrecognised escapes — and numeric
/// escapes with malformed hex digits — keep their backslash literally.
fn unescape(input: &str) -> String {
  let chars: Vec<char> = input.chars().collect();
  let mut out = String::with_capacity(input.len());
  let mut i = 0;
  while i < chars.len() {
    let c = chars[i];
    i += 1;
    if c != '\\' {
      out.push(c);
      continue;
    }
    let Some(&escape) = chars.get(i) else {
      out.push('\\');
      break;
    };
    i += 1;
    match escape {
      'n' => out.push('\n'),
      't' => out.push('\t'),
      'r' => out.push('\r'),
      '\\' => out.push('\\'),
      '"' => out.push('"'),
      '\'' => out.push('\''),
      'a' => out.push('\u{7}'),
      'b' => out.push('\u{8}'),
      'f' => out.push('\u{c}'),
      'v' => out.push('\u{b}'),
      '0' => out.push('\0'),
      'x' => match decode_hex_escape(&chars, i, 2) {
        Some(decoded) => {
          out.push(decoded);
          i += 2;
        }
        None => out.push_str("\\x"),
      },
      'u' => match decode_hex_escape(&chars, i, 4) {
        Some(decoded) => {
          out.push(decoded);
          i += 4;
        }
        None => out.push_str("\\u"),
      },
      other => {
        out.push('\\');
        out.push(other);
      }
    }
  }
  out
}

/// Reads `len` hex digits starting at `start` and turns them into a char.
fn decode_hex_escape(chars: &[char], start: usize, len: usize) -> Option<char> {
  let digits = chars.get(start..start + len)?;
  let mut value = 0u32;
  for &digit in digits {
    value = value * 16 + digit.to_digit(16)?;
  }
  char::from_u32(value)
}

/// Parses one config file into `out`, overwriting duplicate keys.
///
/// Missing files are skipped silently; any unrecognised line is fatal.
pub fn parse_config(path: &Path, out: &mut Config) -> Result<()> {
  let contents = match fs::read_to_string(path) {
    Ok(contents) => contents,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
    Err(e) => return Err(e.into()),
  };
  parse_config_str(&contents, path, out)
}

fn parse_config_str(contents: &str, path: &Path, out: &mut Config) -> Result<()> {
  let mut current: Option<ConfigKey> = None;
  for (idx, raw_line) in contents.lines().enumerate() {
    let line = raw_line.trim();
    if let Some(m) = SINGLE_STRING_KEY.captures(line) {
      let key = (m[1].to_owned(), None);
      out.sections.entry(key.clone()).or_default();
      current = Some(key);
    } else if let Some(m) = DOUBLE_STRING_KEY.captures(line) {
      let key = (m[1].to_owned(), Some(unescape(&m[2])));
      out.sections.entry(key.clone()).or_default();
      current = Some(key);
    } else if BLANK.is_match(line) {
      // comment or empty line
    } else if let Some(section) = &current {
      let captures = KEY_VALUE.captures(line).or_else(|| KEY_QUOTED_VALUE.captures(line));
      match captures {
        Some(m) => {
          out
            .sections
            .entry(section.clone())
            .or_default()
            .insert(m[1].to_owned(), unescape(&m[2]));
        }
        None => {
          return Err(GitError::ConfigParse {
            path: path.to_path_buf(),
            line: idx + 1,
            content: line.to_owned(),
          });
        }
      }
    } else {
      return Err(GitError::ConfigParse {
        path: path.to_path_buf(),
        line: idx + 1,
        content: line.to_owned(),
      });
    }
  }
  Ok(())
}

/// Interprets a git-style boolean environment variable.
///
/// Unset means `false`; `yes/on/true/1` and `no/off/false/0` (any case) are
/// accepted; anything else is a [`GitError::BadEnvValue`].
pub fn env_flag(var: &'static str) -> Result<bool> {
  let Some(value) = env::var_os(var) else {
    return Ok(false);
  };
  let value = value.to_string_lossy().into_owned();
  match value.to_ascii_lowercase().as_str() {
    "yes" | "on" | "true" | "1" => Ok(true),
    "no" | "off" | "false" | "0" => Ok(false),
    _ => Err(GitError::BadEnvValue { var, value }),
  }
}

fn env_path(var: &str) -> Option<PathBuf> {
  env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// Yields the config file paths in precedence order: system, then user, then
/// the repository's own config. Files that do not exist are harmless.
pub fn config_paths(git_dir: &Path) -> Result<Vec<PathBuf>> {
  let mut paths = Vec::new();
  if !env_flag("GIT_CONFIG_NOSYSTEM")? {
    match env_path("GIT_CONFIG_GLOBAL") {
      Some(path) => paths.push(path),
      None => paths.push(PathBuf::from("/etc/gitconfig")),
    }
  }
  match env_path("GIT_CONFIG_SYSTEM") {
    Some(path) => paths.push(path),
    None => {
      if let Some(xdg) = env_path("XDG_CONFIG_HOME") {
        paths.push(xdg.join("git").join("config"));
      }
      if let Some(home) = env_path("HOME") {
        paths.push(home.join(".gitconfig"));
      }
    }
  }
  paths.push(git_dir.join("config"));
  Ok(paths)
}

/// Reads and merges every config file relevant to `git_dir`.
pub fn read_config(git_dir: &Path) -> Result<Config> {
  let mut config = Config::default();
  for path in config_paths(git_dir)? {
    parse_config(&path, &mut config)?;
  }
  Ok(config)
}
