//! Test utilities for llbuild-lib.
//!
//! Helpers for tests that stand in external programs with small shell scripts.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Writes an executable `#!/bin/bash` script named `name` into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
  let path = dir.join(name);
  fs::write(&path, format!("#!/bin/bash\n{body}\n")).unwrap();
  fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
  path
}

/// Returns true while a process with `pid` exists and has not been reaped.
pub fn process_exists(pid: u32) -> bool {
  Path::new("/proc").join(pid.to_string()).exists()
}
