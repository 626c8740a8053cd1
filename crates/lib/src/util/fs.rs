//! Filesystem helpers for staging and committing build trees.

use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

/// Removes `path` (file, symlink or directory) if it exists.
pub fn remove_path(path: &Path) -> io::Result<()> {
  let meta = match fs::symlink_metadata(path) {
    Ok(meta) => meta,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
    Err(e) => return Err(e),
  };
  if meta.is_dir() {
    fs::remove_dir_all(path)
  } else {
    fs::remove_file(path)
  }
}

/// Removes `path` if present and recreates it as an empty directory.
pub fn reset_dir(path: &Path) -> io::Result<()> {
  remove_path(path)?;
  fs::create_dir_all(path)
}

/// Total size in bytes of the regular files below `path`.
///
/// Symlinks are not followed; unreadable entries are skipped.
pub fn dir_size(path: &Path) -> u64 {
  WalkDir::new(path)
    .follow_links(false)
    .into_iter()
    .filter_map(|e| e.ok())
    .filter(|e| e.file_type().is_file())
    .filter_map(|e| e.metadata().ok())
    .map(|m| m.len())
    .sum()
}

/// Recursively copies `src` into `dst`, merging into existing directories.
///
/// Symlinks are recreated rather than followed. Existing files are overwritten.
pub fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
  for entry in WalkDir::new(src).follow_links(false) {
    let entry = entry.map_err(io::Error::from)?;
    let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
    let target = dst.join(rel);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&target)?;
    } else if file_type.is_symlink() {
      let link = fs::read_link(entry.path())?;
      remove_path(&target)?;
      symlink(link, &target)?;
    } else {
      if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
      }
      fs::copy(entry.path(), &target)?;
    }
  }
  Ok(())
}

/// Moves `src` to `dst`, copying when the two live on different filesystems.
pub fn move_path(src: &Path, dst: &Path) -> io::Result<()> {
  if let Some(parent) = dst.parent() {
    fs::create_dir_all(parent)?;
  }
  match fs::rename(src, dst) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
      if fs::symlink_metadata(src)?.is_dir() {
        copy_dir_all(src, dst)?;
      } else {
        fs::copy(src, dst)?;
      }
      remove_path(src)
    }
    Err(e) => Err(e),
  }
}

/// Path of `to` as seen from the directory `from_dir`.
///
/// Both paths are expected to share a root, e.g. both absolute.
pub fn relative_path(from_dir: &Path, to: &Path) -> PathBuf {
  let from: Vec<Component> = from_dir.components().collect();
  let to_parts: Vec<Component> = to.components().collect();
  let common = from.iter().zip(&to_parts).take_while(|(a, b)| a == b).count();

  let mut rel = PathBuf::new();
  for _ in common..from.len() {
    rel.push("..");
  }
  for part in &to_parts[common..] {
    rel.push(part.as_os_str());
  }
  rel
}

/// Mirrors every file below `src` into `dst` as a relative symlink pointing
/// back at it.
///
/// Directories are created as needed. Paths that already exist in `dst` are
/// left alone. Returns the number of links created.
pub fn link_tree(src: &Path, dst: &Path) -> io::Result<usize> {
  let mut created = 0;
  for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
    let entry = entry.map_err(io::Error::from)?;
    let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
    let target = dst.join(rel);

    if entry.file_type().is_dir() {
      fs::create_dir_all(&target)?;
      continue;
    }
    if fs::symlink_metadata(&target).is_ok() {
      continue;
    }
    let parent = target.parent().unwrap_or(dst);
    fs::create_dir_all(parent)?;
    symlink(relative_path(parent, entry.path()), &target)?;
    created += 1;
  }
  Ok(created)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn reset_dir_empties_existing_tree() {
    let temp = tempdir().unwrap();
    let dir = temp.path().join("cache");
    fs::create_dir_all(dir.join("nested")).unwrap();
    fs::write(dir.join("nested/file"), "x").unwrap();

    reset_dir(&dir).unwrap();

    assert!(dir.is_dir());
    assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
  }

  #[test]
  fn remove_path_ignores_missing() {
    let temp = tempdir().unwrap();
    remove_path(&temp.path().join("absent")).unwrap();
  }

  #[test]
  fn dir_size_counts_regular_files() {
    let temp = tempdir().unwrap();
    fs::create_dir(temp.path().join("sub")).unwrap();
    fs::write(temp.path().join("a"), "12345").unwrap();
    fs::write(temp.path().join("sub/b"), "123").unwrap();
    assert_eq!(dir_size(temp.path()), 8);
  }

  #[test]
  fn copy_dir_all_merges_and_overwrites() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("src");
    let dst = temp.path().join("dst");
    fs::create_dir_all(src.join("bin")).unwrap();
    fs::write(src.join("bin/tool"), "new").unwrap();
    symlink("tool", src.join("bin/alias")).unwrap();
    fs::create_dir_all(dst.join("bin")).unwrap();
    fs::write(dst.join("bin/tool"), "old").unwrap();
    fs::write(dst.join("bin/keep"), "keep").unwrap();

    copy_dir_all(&src, &dst).unwrap();

    assert_eq!(fs::read_to_string(dst.join("bin/tool")).unwrap(), "new");
    assert_eq!(fs::read_to_string(dst.join("bin/keep")).unwrap(), "keep");
    assert_eq!(fs::read_link(dst.join("bin/alias")).unwrap(), Path::new("tool"));
  }

  #[test]
  fn move_path_creates_parents() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("include");
    fs::create_dir(&src).unwrap();
    fs::write(src.join("a.h"), "int a;").unwrap();
    let dst = temp.path().join("devel/files/include");

    move_path(&src, &dst).unwrap();

    assert!(!src.exists());
    assert_eq!(fs::read_to_string(dst.join("a.h")).unwrap(), "int a;");
  }

  #[test]
  fn link_tree_skips_existing_targets() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("share");
    let dst = temp.path().join("entries");
    fs::create_dir_all(src.join("icons/hicolor")).unwrap();
    fs::create_dir_all(src.join("applications")).unwrap();
    fs::write(src.join("icons/hicolor/app.png"), "png").unwrap();
    fs::write(src.join("applications/app.desktop"), "original").unwrap();
    fs::create_dir_all(dst.join("applications")).unwrap();
    fs::write(dst.join("applications/app.desktop"), "rewritten").unwrap();

    let created = link_tree(&src, &dst).unwrap();

    assert_eq!(created, 1);
    let link = dst.join("icons/hicolor/app.png");
    assert!(fs::read_link(&link).unwrap().is_relative());
    assert_eq!(fs::read_to_string(&link).unwrap(), "png");
    assert_eq!(fs::read_to_string(dst.join("applications/app.desktop")).unwrap(), "rewritten");
  }

  #[test]
  fn relative_path_climbs_to_common_ancestor() {
    assert_eq!(
      relative_path(Path::new("/out/entries/icons"), Path::new("/out/files/share/icons/a.png")),
      PathBuf::from("../../files/share/icons/a.png")
    );
    assert_eq!(relative_path(Path::new("/a/b"), Path::new("/a/b/c")), PathBuf::from("c"));
  }
}
