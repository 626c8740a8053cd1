//! Archive format detection and staged extraction.

use std::fs;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use super::FetchError;
use crate::error::IoContext;
use crate::util::fs::{move_path, remove_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
  /// Any tarball; `tar` detects the compression itself.
  Tar,
  Zip,
}

impl ArchiveFormat {
  /// Picks the format from the file name.
  pub fn detect(path: &Path) -> Option<Self> {
    let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
    const TAR_SUFFIXES: [&str; 5] = [".tar.xz", ".tar.gz", ".tar.bz2", ".tgz", ".tar"];
    if TAR_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
      Some(Self::Tar)
    } else if name.ends_with(".zip") {
      Some(Self::Zip)
    } else {
      None
    }
  }
}

/// Extracts `archive` into `dest`.
///
/// Extraction happens in a staging directory beside `dest` and the top-level
/// entries are moved in only once the extractor succeeded, so a failure
/// leaves `dest` as it was. Entries already present in `dest` are replaced.
pub async fn extract(archive: &Path, dest: &Path) -> Result<(), FetchError> {
  let format = ArchiveFormat::detect(archive).ok_or_else(|| FetchError::UnsupportedArchive(archive.to_path_buf()))?;
  let parent = dest.parent().unwrap_or(dest);
  fs::create_dir_all(parent).io_context(|| format!("creating {}", parent.display()))?;

  let staging = tempfile::Builder::new()
    .prefix(".extract-")
    .tempdir_in(parent)
    .io_context(|| format!("creating staging directory in {}", parent.display()))?;

  let mut command = match format {
    ArchiveFormat::Tar => {
      let mut command = Command::new("tar");
      command.arg("-C").arg(staging.path()).arg("-xf").arg(archive);
      command
    }
    ArchiveFormat::Zip => {
      let mut command = Command::new("unzip");
      command.arg("-q").arg(archive).arg("-d").arg(staging.path());
      command
    }
  };

  debug!(archive = ?archive, format = ?format, "extracting");
  let output = command
    .output()
    .await
    .io_context(|| format!("running extractor for {}", archive.display()))?;
  if !output.status.success() {
    debug!(stderr = %String::from_utf8_lossy(&output.stderr), "extractor stderr");
    return Err(FetchError::Extract {
      archive: archive.to_path_buf(),
      status: output.status.to_string(),
    });
  }

  fs::create_dir_all(dest).io_context(|| format!("creating {}", dest.display()))?;
  let entries = fs::read_dir(staging.path()).io_context(|| "reading staging directory".to_string())?;
  for entry in entries {
    let entry = entry.io_context(|| "reading staging directory".to_string())?;
    let target = dest.join(entry.file_name());
    remove_path(&target).io_context(|| format!("replacing {}", target.display()))?;
    move_path(&entry.path(), &target).io_context(|| format!("moving into {}", target.display()))?;
  }

  info!(archive = ?archive, dest = ?dest, "extracted");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::process::Command as StdCommand;
  use tempfile::tempdir;

  #[test]
  fn detects_formats_by_suffix() {
    for name in ["a.tar.xz", "a.tar.gz", "a.tar.bz2", "a.tgz", "a.tar", "A.TAR.GZ"] {
      assert_eq!(ArchiveFormat::detect(Path::new(name)), Some(ArchiveFormat::Tar), "{name}");
    }
    assert_eq!(ArchiveFormat::detect(Path::new("a.zip")), Some(ArchiveFormat::Zip));
    assert_eq!(ArchiveFormat::detect(Path::new("a.rar")), None);
    assert_eq!(ArchiveFormat::detect(Path::new("tar")), None);
  }

  #[tokio::test]
  async fn unsupported_archive_is_rejected_before_touching_dest() {
    let temp = tempdir().unwrap();
    let archive = temp.path().join("pkg.7z");
    fs::write(&archive, "x").unwrap();
    let dest = temp.path().join("sources");

    let err = extract(&archive, &dest).await.unwrap_err();

    assert!(matches!(err, FetchError::UnsupportedArchive(_)));
    assert!(!dest.exists());
  }

  #[tokio::test]
  async fn extracts_gzip_tarball() {
    let temp = tempdir().unwrap();
    let tree = temp.path().join("tree");
    fs::create_dir_all(tree.join("pkg-1.0")).unwrap();
    fs::write(tree.join("pkg-1.0/Makefile"), "all:\n").unwrap();
    let archive = temp.path().join("pkg-1.0.tar.gz");
    let status = StdCommand::new("tar")
      .arg("-C")
      .arg(&tree)
      .arg("-czf")
      .arg(&archive)
      .arg("pkg-1.0")
      .status()
      .unwrap();
    assert!(status.success());
    let dest = temp.path().join("sources");

    extract(&archive, &dest).await.unwrap();

    assert_eq!(fs::read_to_string(dest.join("pkg-1.0/Makefile")).unwrap(), "all:\n");
  }

  #[tokio::test]
  async fn corrupt_archive_leaves_dest_unchanged() {
    let temp = tempdir().unwrap();
    let archive = temp.path().join("broken.tar.gz");
    fs::write(&archive, "definitely not gzip").unwrap();
    let dest = temp.path().join("sources");
    fs::create_dir_all(&dest).unwrap();
    fs::write(dest.join("previous"), "kept").unwrap();

    let err = extract(&archive, &dest).await.unwrap_err();

    assert!(matches!(err, FetchError::Extract { .. }));
    let names: Vec<_> = fs::read_dir(&dest).unwrap().map(|e| e.unwrap().file_name()).collect();
    assert_eq!(names, vec![std::ffi::OsString::from("previous")]);
    let leftovers = fs::read_dir(temp.path())
      .unwrap()
      .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().starts_with(".extract-"))
      .count();
    assert_eq!(leftovers, 0);
  }
}
