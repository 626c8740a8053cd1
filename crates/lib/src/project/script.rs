//! Generation of the bash script the sandbox runs as `/entry.sh`.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use super::Project;

/// Quotes `value` for a double-quoted shell word.
///
/// `$` is left alone so variables may refer to each other and to `PREFIX`.
fn shell_quote(value: &str) -> String {
  let mut quoted = String::with_capacity(value.len() + 2);
  quoted.push('"');
  for c in value.chars() {
    if matches!(c, '"' | '\\' | '`') {
      quoted.push('\\');
    }
    quoted.push(c);
  }
  quoted.push('"');
  quoted
}

/// Renders the build script: shebang, exported variables in declaration
/// order, then the build procedure.
pub fn render_build_script(project: &Project) -> String {
  let mut script = String::from("#!/bin/bash\nset -e\n\n");

  if !project.variables.is_empty() {
    for (name, value) in &project.variables {
      script.push_str(&format!("export {name}={}\n", shell_quote(value)));
    }
    script.push('\n');
  }

  if let Some(build) = &project.build {
    script.push_str(build);
    if !build.ends_with('\n') {
      script.push('\n');
    }
  }
  script
}

/// Writes the build script to `path` and marks it executable.
pub fn generate_build_script(project: &Project, path: &Path) -> io::Result<()> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  fs::write(path, render_build_script(project))?;
  fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}
