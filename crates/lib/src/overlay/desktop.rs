//! Minimal desktop-entry reader and writer.
//!
//! Only what launcher rewriting needs: groups of `key=value` lines, with
//! comments and blank lines kept as they were.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::consts::DESKTOP_TAG_KEY;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
  Entry { key: String, value: String },
  Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Group {
  name: String,
  lines: Vec<Line>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesktopEntry {
  /// Lines before the first group header.
  preamble: Vec<String>,
  groups: Vec<Group>,
}

impl DesktopEntry {
  pub fn parse(text: &str) -> Self {
    let mut entry = Self::default();
    for raw in text.lines() {
      let trimmed = raw.trim();
      if trimmed.starts_with('[') && trimmed.ends_with(']') {
        entry.groups.push(Group {
          name: trimmed[1..trimmed.len() - 1].to_string(),
          lines: Vec::new(),
        });
        continue;
      }
      let Some(group) = entry.groups.last_mut() else {
        entry.preamble.push(raw.to_string());
        continue;
      };
      match raw.split_once('=') {
        Some((key, value)) if !trimmed.starts_with('#') => group.lines.push(Line::Entry {
          key: key.trim().to_string(),
          value: value.trim_start().to_string(),
        }),
        _ => group.lines.push(Line::Other(raw.to_string())),
      }
    }
    entry
  }

  pub fn groups(&self) -> impl Iterator<Item = &str> {
    self.groups.iter().map(|g| g.name.as_str())
  }

  pub fn get(&self, group: &str, key: &str) -> Option<&str> {
    self
      .groups
      .iter()
      .find(|g| g.name == group)?
      .lines
      .iter()
      .find_map(|line| match line {
        Line::Entry { key: k, value } if k == key => Some(value.as_str()),
        _ => None,
      })
  }

  /// Sets `key` in `group`, appending it when absent. Unknown groups are
  /// ignored.
  pub fn set(&mut self, group: &str, key: &str, value: impl Into<String>) {
    let Some(group) = self.groups.iter_mut().find(|g| g.name == group) else {
      return;
    };
    let value = value.into();
    for line in &mut group.lines {
      if let Line::Entry { key: k, value: v } = line {
        if k == key {
          *v = value;
          return;
        }
      }
    }
    // Keep trailing blank lines after the new key.
    let at = group
      .lines
      .iter()
      .rposition(|l| !matches!(l, Line::Other(s) if s.trim().is_empty()))
      .map_or(0, |i| i + 1);
    group.lines.insert(
      at,
      Line::Entry {
        key: key.to_string(),
        value,
      },
    );
  }

  /// Routes every launch command through `wrapper` and tags every section
  /// with the owning package.
  pub fn rewrite_for_package(&mut self, package_id: &str, wrapper: &str) {
    let names: Vec<String> = self.groups().map(str::to_string).collect();
    for name in names {
      if let Some(exec) = self.get(&name, "Exec").map(str::to_string) {
        self.set(&name, "Exec", format!("{wrapper} run {package_id} --exec {exec}"));
      }
      if self.get(&name, "TryExec").is_some_and(|v| !v.is_empty()) {
        self.set(&name, "TryExec", "");
      }
      self.set(&name, DESKTOP_TAG_KEY, package_id);
    }
  }
}

impl fmt::Display for DesktopEntry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for line in &self.preamble {
      writeln!(f, "{line}")?;
    }
    for group in &self.groups {
      writeln!(f, "[{}]", group.name)?;
      for line in &group.lines {
        match line {
          Line::Entry { key, value } => writeln!(f, "{key}={value}")?,
          Line::Other(raw) => writeln!(f, "{raw}")?,
        }
      }
    }
    Ok(())
  }
}

/// Rewrites every `*.<extension>` file directly inside `src` into `dst`.
///
/// `src` and `dst` may be the same directory. A missing `src` is not an
/// error. Returns the number of files written.
pub fn rewrite_dir(src: &Path, dst: &Path, extension: &str, package_id: &str, wrapper: &str) -> io::Result<usize> {
  if !src.is_dir() {
    return Ok(0);
  }
  let mut files: Vec<_> = fs::read_dir(src)?
    .filter_map(|e| e.ok())
    .map(|e| e.path())
    .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == extension))
    .collect();
  files.sort();

  fs::create_dir_all(dst)?;
  for path in &files {
    let mut entry = DesktopEntry::parse(&fs::read_to_string(path)?);
    entry.rewrite_for_package(package_id, wrapper);
    let Some(name) = path.file_name() else {
      continue;
    };
    let target = dst.join(name);
    // The source may be a symlink into a read-only layer.
    if target.is_symlink() {
      fs::remove_file(&target)?;
    }
    fs::write(&target, entry.to_string())?;
    debug!(path = ?target, "rewrote launcher entry");
  }
  Ok(files.len())
}
