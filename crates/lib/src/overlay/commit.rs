//! Turns a finished build's change-set into the runtime and devel modules.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use super::desktop::rewrite_dir;
use super::{CommitError, OverlayLayout, OverlayMounter};
use crate::config::BuilderConfig;
use crate::consts::{DEVEL_SUBDIRS, INFO_FILE, MODULE_DEVEL, MODULE_RUNTIME, PROJECT_FILE};
use crate::error::IoContext;
use crate::layout::ProjectPaths;
use crate::package::{PackageInfo, PackageRef};
use crate::project::{PackageKind, Project};
use crate::repo::Repository;
use crate::util::fs::{dir_size, link_tree, move_path};

/// Layers the project was built against, recorded in `info.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildLayers<'r> {
  pub runtime: Option<&'r PackageRef>,
  pub base: Option<&'r PackageRef>,
}

pub struct OverlayCommitter<'a, R, M> {
  config: &'a BuilderConfig,
  repo: &'a R,
  mounter: &'a M,
}

impl<'a, R: Repository, M: OverlayMounter> OverlayCommitter<'a, R, M> {
  pub fn new(config: &'a BuilderConfig, repo: &'a R, mounter: &'a M) -> Self {
    Self { config, repo, mounter }
  }

  fn layout(project: &Project, paths: &ProjectPaths) -> OverlayLayout {
    // A runtime is composed over the files it was built against.
    let lower = match project.package.kind {
      PackageKind::Runtime => paths.runtime_files(),
      PackageKind::App | PackageKind::Lib => paths.overlay_lower(),
    };
    OverlayLayout {
      upper: paths.upper_prefix(&project.install_prefix()),
      workdir: paths.overlay_workdir(),
      lower,
      target: paths.install_files(),
    }
  }

  /// Commits the build output of `project` and returns the imported refs,
  /// runtime module first.
  ///
  /// The two imports are not transactional: a failed devel import leaves the
  /// runtime module committed.
  pub async fn commit(
    &self,
    project: &Project,
    paths: &ProjectPaths,
    layers: BuildLayers<'_>,
  ) -> Result<Vec<PackageRef>, CommitError> {
    let layout = Self::layout(project, paths);
    info!(id = %project.package.id, lower = ?layout.lower, "committing build output");
    for dir in [&layout.upper, &layout.workdir, &layout.lower, &layout.target] {
      fs::create_dir_all(dir).io_context(|| format!("creating {}", dir.display()))?;
    }

    let mount = self.mounter.mount(&layout).await?;
    let result = self.compose(project, paths, layers).await;
    mount.release().await;
    result
  }

  async fn compose(
    &self,
    project: &Project,
    paths: &ProjectPaths,
    layers: BuildLayers<'_>,
  ) -> Result<Vec<PackageRef>, CommitError> {
    let id = &project.package.id;
    let files = paths.install_files();
    let entries = paths.entries();

    let applications = files.join("share/applications");
    let rewritten = rewrite_dir(
      &applications,
      &entries.join("applications"),
      "desktop",
      id,
      &self.config.run_wrapper,
    )
    .io_context(|| format!("rewriting desktop entries in {}", applications.display()))?;
    let menus = applications.join("context-menus");
    rewrite_dir(&menus, &menus, "conf", id, &self.config.run_wrapper)
      .io_context(|| format!("rewriting context menus in {}", menus.display()))?;
    debug!(count = rewritten, "desktop entries rewritten");

    link_if_present(&files.join("share"), &entries)?;
    link_if_present(&files.join("lib/systemd/user"), &entries.join("systemd/user"))?;

    let devel_files = paths.devel_files();
    fs::create_dir_all(&devel_files).io_context(|| format!("creating {}", devel_files.display()))?;
    for name in DEVEL_SUBDIRS {
      let src = files.join(name);
      if src.is_dir() {
        move_path(&src, &devel_files.join(name)).io_context(|| format!("moving {} to devel", src.display()))?;
      }
    }

    let mut record = self.package_info(project, layers);
    record.module = MODULE_RUNTIME.to_string();
    record.size = dir_size(&files);
    write_info(&record, &paths.install())?;
    record.module = MODULE_DEVEL.to_string();
    record.size = dir_size(&devel_files);
    write_info(&record, &paths.devel())?;
    self.copy_descriptor(project, &paths.install())?;

    let arch = &self.config.target_arch;
    let channel = &self.config.channel;
    let mut imported = Vec::with_capacity(2);
    for (module, dir) in [(MODULE_RUNTIME, paths.install()), (MODULE_DEVEL, paths.devel())] {
      let reference = project.package_ref(arch, channel, module);
      self
        .repo
        .import_directory(&reference, &dir)
        .await
        .map_err(|source| CommitError::Import {
          module: module.to_string(),
          source,
        })?;
      info!(reference = %reference, "module committed");
      imported.push(reference);
    }
    Ok(imported)
  }

  fn package_info(&self, project: &Project, layers: BuildLayers<'_>) -> PackageInfo {
    PackageInfo {
      appid: project.package.id.clone(),
      name: project.package.name.clone(),
      version: project.package.version.clone(),
      arch: vec![self.config.target_arch.clone()],
      kind: project.package.kind.to_string(),
      module: String::new(),
      runtime: layers.runtime.map(PackageRef::local_ref).unwrap_or_default(),
      base: layers.base.map(PackageRef::local_ref).unwrap_or_default(),
      description: project.package.description.clone(),
      size: 0,
    }
  }

  fn copy_descriptor(&self, project: &Project, dir: &Path) -> Result<(), CommitError> {
    let target = dir.join(PROJECT_FILE);
    let copied = match &project.config_file_path {
      Some(path) => fs::copy(path, &target).map(|_| ()),
      None => {
        let yaml = project.to_yaml().map_err(CommitError::Descriptor)?;
        fs::write(&target, yaml)
      }
    };
    copied.map_err(|source| CommitError::Metadata { path: target, source })
  }
}

fn link_if_present(src: &Path, dst: &Path) -> Result<(), CommitError> {
  if src.is_dir() {
    let count = link_tree(src, dst).io_context(|| format!("linking {} into {}", src.display(), dst.display()))?;
    debug!(src = ?src, count, "linked shared files");
  }
  Ok(())
}

fn write_info(record: &PackageInfo, dir: &Path) -> Result<(), CommitError> {
  let path = dir.join(INFO_FILE);
  record
    .write(&path)
    .map_err(|source| CommitError::Metadata { path, source })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::overlay::testing::CopyMounter;
  use crate::repo::memory::MemoryRepo;
  use crate::util::testutil::process_exists;
  use tempfile::{TempDir, tempdir};

  struct Fixture {
    temp: TempDir,
    config: BuilderConfig,
    paths: ProjectPaths,
    repo: MemoryRepo,
    mounter: CopyMounter,
  }

  fn fixture(project: &Project) -> Fixture {
    let temp = tempdir().unwrap();
    let config = BuilderConfig {
      project_root: temp.path().to_path_buf(),
      target_arch: "x86_64".to_string(),
      ..BuilderConfig::default()
    };
    let paths = ProjectPaths::new(temp.path(), &project.package.id);
    paths.reset(&project.install_prefix()).unwrap();
    Fixture {
      temp,
      config,
      paths,
      repo: MemoryRepo::new(),
      mounter: CopyMounter::default(),
    }
  }

  fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
  }

  fn viewer() -> Project {
    Project::parse(
      "package: {id: org.example.viewer, name: Viewer, version: 2.1.0, kind: app, description: Image viewer}\nbuild: make install\n",
    )
    .unwrap()
  }

  #[tokio::test]
  async fn app_output_is_split_and_imported() {
    let project = viewer();
    let f = fixture(&project);
    let upper = f.paths.upper_prefix(&project.install_prefix());
    write(&upper.join("bin/viewer"), "elf");
    write(
      &upper.join("share/applications/viewer.desktop"),
      "[Desktop Entry]\nExec=viewer %F\nTryExec=viewer\n",
    );
    write(&upper.join("share/icons/viewer.png"), "png");
    write(&upper.join("lib/systemd/user/viewer.service"), "[Service]\n");
    write(&upper.join("include/viewer.h"), "#pragma once\n");

    let runtime = PackageRef::new("org.deepin.runtime", "23.0.0", "x86_64");
    let base = PackageRef::new("org.deepin.base", "23.0.0", "x86_64");
    let committer = OverlayCommitter::new(&f.config, &f.repo, &f.mounter);
    let imported = committer
      .commit(
        &project,
        &f.paths,
        BuildLayers {
          runtime: Some(&runtime),
          base: Some(&base),
        },
      )
      .await
      .unwrap();

    let modules: Vec<&str> = imported.iter().map(|r| r.module.as_str()).collect();
    assert_eq!(modules, ["runtime", "devel"]);
    f.repo.with_calls(|calls| assert_eq!(calls.imports, imported));

    let install = f.paths.install();
    let desktop = fs::read_to_string(install.join("entries/applications/viewer.desktop")).unwrap();
    assert!(desktop.contains("Exec=ll-cli run org.example.viewer --exec viewer %F"));
    assert!(desktop.contains("TryExec=\n"));
    assert!(!install.join("entries/applications/viewer.desktop").is_symlink());
    assert_eq!(
      fs::read_to_string(install.join("entries/icons/viewer.png")).unwrap(),
      "png"
    );
    assert!(install.join("entries/systemd/user/viewer.service").is_symlink());
    assert!(!install.join("files/include").exists());
    assert!(f.paths.devel_files().join("include/viewer.h").is_file());

    let info = PackageInfo::read(&install.join("info.json")).unwrap();
    assert_eq!(info.module, "runtime");
    assert_eq!(info.kind, "app");
    assert_eq!(info.runtime, "org.deepin.runtime/23.0.0/x86_64");
    assert_eq!(info.base, "org.deepin.base/23.0.0/x86_64");
    assert_eq!(info.arch, ["x86_64"]);
    assert!(info.size > 0);
    let devel = PackageInfo::read(&f.paths.devel().join("info.json")).unwrap();
    assert_eq!(devel.module, "devel");
    assert_eq!(devel.size, "#pragma once\n".len() as u64);

    assert!(install.join("linglong.yaml").is_file());
    assert!(!process_exists(f.mounter.last_pid().unwrap()));
  }

  #[tokio::test]
  async fn runtime_kind_uses_runtime_files_as_lower() {
    let project =
      Project::parse("package: {id: org.deepin.runtime, version: 23.0.0, kind: runtime}\nbuild: make\n").unwrap();
    let f = fixture(&project);
    write(&f.paths.runtime_files().join("lib/libc.so"), "libc");

    OverlayCommitter::new(&f.config, &f.repo, &f.mounter)
      .commit(&project, &f.paths, BuildLayers::default())
      .await
      .unwrap();

    let layouts = f.mounter.layouts.lock().unwrap();
    assert_eq!(layouts[0].lower, f.paths.runtime_files());
    assert_eq!(layouts[0].upper, f.paths.overlay_upper().join("runtime"));
    assert!(f.paths.install_files().join("lib/libc.so").is_file());
  }

  #[tokio::test]
  async fn metadata_failure_releases_mount_process() {
    let project = viewer();
    let f = fixture(&project);
    // A directory where info.json should go makes the write fail.
    fs::create_dir_all(f.paths.install().join("info.json")).unwrap();

    let err = OverlayCommitter::new(&f.config, &f.repo, &f.mounter)
      .commit(&project, &f.paths, BuildLayers::default())
      .await
      .unwrap_err();

    assert!(matches!(err, CommitError::Metadata { .. }));
    assert!(!process_exists(f.mounter.last_pid().unwrap()));
    f.repo.with_calls(|calls| assert!(calls.imports.is_empty()));
  }

  #[tokio::test]
  async fn descriptor_file_is_copied_verbatim() {
    let mut project = viewer();
    let f = fixture(&project);
    let descriptor = f.temp.path().join("linglong.yaml");
    fs::write(&descriptor, "# original\npackage: {id: org.example.viewer}\n").unwrap();
    project.set_config_file_path(descriptor);

    OverlayCommitter::new(&f.config, &f.repo, &f.mounter)
      .commit(&project, &f.paths, BuildLayers::default())
      .await
      .unwrap();

    assert_eq!(
      fs::read_to_string(f.paths.install().join("linglong.yaml")).unwrap(),
      "# original\npackage: {id: org.example.viewer}\n"
    );
  }
}
