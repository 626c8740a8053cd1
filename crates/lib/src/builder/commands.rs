//! Project commands other than `build`.

use std::fs;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info};

use super::Builder;
use crate::consts::{MODULE_DEVEL, MODULE_RUNTIME, PROJECT_FILE};
use crate::error::{BuilderError, IoContext};
use crate::overlay::OverlayMounter;
use crate::package::PackageRef;
use crate::project::{Project, SourceKind};
use crate::repo::Repository;

const TEMPLATE: &str = r#"package:
  id: @ID@
  name: @ID@
  version: 1.0.0
  kind: app
  description: |
    describe @ID@ here

runtime:
  id: org.deepin.Runtime
  version: 23.0.0

source:
  kind: git
  url: https://example.org/@ID@.git
  commit: HEAD

build: |
  mkdir -p ${PREFIX}/bin
  install -m 0755 @ID@ ${PREFIX}/bin/
"#;

/// Creates `<parent>/<name>` holding a template descriptor.
pub fn create_project(parent: &Path, name: &str) -> Result<PathBuf, BuilderError> {
  if name.is_empty() || name.contains('/') {
    return Err(BuilderError::Invalid(format!("invalid project name {name:?}")));
  }
  let dir = parent.join(name);
  if dir.exists() {
    return Err(BuilderError::Invalid(format!("{} already exists", dir.display())));
  }
  fs::create_dir_all(&dir).io_context(|| format!("creating {}", dir.display()))?;
  let descriptor = dir.join(PROJECT_FILE);
  fs::write(&descriptor, TEMPLATE.replace("@ID@", name)).io_context(|| format!("writing {}", descriptor.display()))?;
  info!(path = ?dir, "project created");
  Ok(dir)
}

/// Asks `git` for the commit `git_ref` currently points at on `url`.
pub async fn ls_remote(git: &str, url: &str, git_ref: &str) -> Result<String, BuilderError> {
  let output = Command::new(git)
    .args(["ls-remote", url, git_ref])
    .output()
    .await
    .io_context(|| format!("running {git} ls-remote"))?;
  if !output.status.success() {
    return Err(BuilderError::Invalid(format!(
      "git ls-remote {url} {git_ref} failed ({}): {}",
      output.status,
      String::from_utf8_lossy(&output.stderr).trim()
    )));
  }
  let stdout = String::from_utf8_lossy(&output.stdout);
  stdout
    .split_whitespace()
    .next()
    .map(str::to_string)
    .ok_or_else(|| BuilderError::Invalid(format!("{url} has no ref {git_ref}")))
}

/// Replaces `source.commit` in the descriptor at `path`, keeping the rest of
/// the document.
pub fn rewrite_commit(path: &Path, commit: &str) -> Result<(), BuilderError> {
  let text = fs::read_to_string(path).io_context(|| format!("reading {}", path.display()))?;
  let mut doc: serde_yaml::Value = serde_yaml::from_str(&text).map_err(crate::project::ProjectError::from)?;
  let source = doc
    .get_mut("source")
    .and_then(serde_yaml::Value::as_mapping_mut)
    .ok_or_else(|| BuilderError::Invalid(format!("{} has no source section", path.display())))?;
  source.insert("commit".into(), commit.into());
  let rendered = serde_yaml::to_string(&doc).map_err(crate::project::ProjectError::from)?;
  fs::write(path, rendered).io_context(|| format!("writing {}", path.display()))?;
  Ok(())
}

impl<R: Repository, M: OverlayMounter> Builder<'_, R, M> {
  fn module_ref(&self, project: &Project, module: &str) -> PackageRef {
    project.package_ref(&self.config.target_arch, &self.config.channel, module)
  }

  /// Moves a git source to the newest commit of its tracked ref.
  ///
  /// Returns the new commit, or `None` when nothing changed or the source is
  /// not tracked from git.
  pub async fn track(&self) -> Result<Option<String>, BuilderError> {
    let project = self.load_project()?;
    let Some(source) = project.source.as_ref().filter(|s| s.kind == SourceKind::Git) else {
      info!("project source is not a git repository, nothing to track");
      return Ok(None);
    };
    let url = source
      .url
      .as_deref()
      .ok_or_else(|| BuilderError::Invalid("git source without url".to_string()))?;
    let git_ref = source.version.as_deref().unwrap_or("HEAD");

    let latest = ls_remote("git", url, git_ref).await?;
    debug!(url = %url, git_ref = %git_ref, commit = %latest, "remote ref resolved");
    if source.commit.as_deref() == Some(latest.as_str()) {
      info!(commit = %latest, "already at the latest commit");
      return Ok(None);
    }
    rewrite_commit(&self.project_file(), &latest)?;
    info!(commit = %latest, "source commit updated");
    Ok(Some(latest))
  }

  /// Pushes the project's runtime module, and its devel module when asked.
  pub async fn push(&self, with_devel: bool) -> Result<Vec<PackageRef>, BuilderError> {
    let project = self.load_project()?;
    let mut modules = vec![MODULE_RUNTIME];
    if with_devel {
      modules.push(MODULE_DEVEL);
    }

    let mut pushed = Vec::with_capacity(modules.len());
    for module in modules {
      let reference = self.module_ref(&project, module);
      self
        .repo
        .push(&reference)
        .await
        .map_err(|e| BuilderError::repo(format!("pushing {reference}"), e))?;
      info!(reference = %reference, "pushed");
      pushed.push(reference);
    }
    Ok(pushed)
  }

  /// Checks the committed modules out into `<project root>/<id>`, the devel
  /// module below `devel/`.
  pub async fn export(&self) -> Result<PathBuf, BuilderError> {
    let project = self.load_project()?;
    let dir = self.config.project_root.join(&project.package.id);
    fs::create_dir_all(&dir).io_context(|| format!("creating {}", dir.display()))?;

    for (module, target) in [(MODULE_RUNTIME, dir.clone()), (MODULE_DEVEL, dir.join("devel"))] {
      let reference = self.module_ref(&project, module);
      self
        .repo
        .checkout(&reference, "", &target)
        .await
        .map_err(|e| BuilderError::repo(format!("checking out {reference}, build first"), e))?;
    }
    info!(path = ?dir, "exported");
    Ok(dir)
  }

  /// Commits the project root as-is as the runtime module.
  pub async fn import(&self) -> Result<PackageRef, BuilderError> {
    self.init_repo().await?;
    let project = self.load_project()?;
    let reference = self.module_ref(&project, MODULE_RUNTIME);
    self
      .repo
      .import_directory(&reference, &self.config.project_root)
      .await
      .map_err(|e| BuilderError::repo(format!("importing {reference}"), e))?;
    info!(reference = %reference, "imported");
    Ok(reference)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::write_script;
  use tempfile::tempdir;

  #[test]
  fn template_is_a_valid_project() {
    let temp = tempdir().unwrap();
    let dir = create_project(temp.path(), "demo").unwrap();

    let project = Project::load(&dir.join(PROJECT_FILE)).unwrap();
    assert_eq!(project.package.id, "demo");
    assert_eq!(project.source.unwrap().kind, SourceKind::Git);
  }

  #[test]
  fn create_refuses_existing_directory() {
    let temp = tempdir().unwrap();
    fs::create_dir(temp.path().join("demo")).unwrap();
    assert!(matches!(
      create_project(temp.path(), "demo"),
      Err(BuilderError::Invalid(_))
    ));
    assert!(create_project(temp.path(), "a/b").is_err());
  }

  #[tokio::test]
  async fn ls_remote_takes_first_hash() {
    let temp = tempdir().unwrap();
    let git = write_script(
      temp.path(),
      "git",
      "printf 'a1b2c3d4\\trefs/heads/main\\n'",
    );

    let commit = ls_remote(git.to_str().unwrap(), "https://example.org/x.git", "main")
      .await
      .unwrap();

    assert_eq!(commit, "a1b2c3d4");
  }

  #[tokio::test]
  async fn ls_remote_failure_and_empty_output() {
    let temp = tempdir().unwrap();
    let failing = write_script(temp.path(), "git-fail", "echo 'fatal: repository not found' >&2\nexit 128");
    let err = ls_remote(failing.to_str().unwrap(), "u", "HEAD").await.unwrap_err();
    assert!(err.to_string().contains("repository not found"));

    let silent = write_script(temp.path(), "git-empty", "exit 0");
    assert!(ls_remote(silent.to_str().unwrap(), "u", "v9").await.is_err());
  }

  #[test]
  fn rewrite_commit_keeps_other_fields() {
    let temp = tempdir().unwrap();
    let path = temp.path().join(PROJECT_FILE);
    fs::write(
      &path,
      "package:\n  id: demo\n  version: 1.0.0\n  kind: app\nsource:\n  kind: git\n  url: https://example.org/demo.git\n  commit: old\nbuild: make\n",
    )
    .unwrap();

    rewrite_commit(&path, "new").unwrap();

    let project = Project::load(&path).unwrap();
    let source = project.source.unwrap();
    assert_eq!(source.commit.as_deref(), Some("new"));
    assert_eq!(source.url.as_deref(), Some("https://example.org/demo.git"));
    assert_eq!(project.build.as_deref(), Some("make"));
  }

  #[test]
  fn rewrite_commit_requires_source() {
    let temp = tempdir().unwrap();
    let path = temp.path().join(PROJECT_FILE);
    fs::write(&path, "package: {id: demo}\n").unwrap();
    assert!(matches!(rewrite_commit(&path, "x"), Err(BuilderError::Invalid(_))));
  }
}
