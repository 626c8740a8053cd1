//! Assembly of the sandbox execution document for one build.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::container::Container;
use super::spec::{
  Annotations, Hook, Hooks, IdMapping, Linux, Mount, Namespace, OCI_VERSION, OverlayAnnotation, Process, Root, Runtime,
};
use crate::consts::{RUNTIME_MOUNT, SANDBOX_PATH, SCRIPT_MOUNT, SOURCE_MOUNT};
use crate::layout::ProjectPaths;
use crate::platform::{current_ids, library_triplet};
use crate::project::Project;

/// Host directories of the base layer exposed read-only in the sandbox.
const BASE_DIRS: [&str; 3] = ["usr", "etc", "var"];

pub struct RuntimeSpecBuilder<'a> {
  project: &'a Project,
  paths: &'a ProjectPaths,
  container: &'a Container,
  arch: String,
  source_root: PathBuf,
  base_files: Option<PathBuf>,
  uid: u32,
  gid: u32,
}

fn path_str(path: &Path) -> String {
  path.display().to_string()
}

impl<'a> RuntimeSpecBuilder<'a> {
  pub fn new(project: &'a Project, paths: &'a ProjectPaths, container: &'a Container, arch: impl Into<String>) -> Self {
    let (uid, gid) = current_ids();
    Self {
      project,
      paths,
      container,
      arch: arch.into(),
      source_root: paths.sources(),
      base_files: None,
      uid,
      gid,
    }
  }

  /// Host directory mounted at `/source`.
  pub fn source_root(mut self, path: impl Into<PathBuf>) -> Self {
    self.source_root = path.into();
    self
  }

  /// `files/` directory of the staged base layer, if one was resolved.
  pub fn base_files(mut self, path: Option<PathBuf>) -> Self {
    self.base_files = path;
    self
  }

  pub fn ids(mut self, uid: u32, gid: u32) -> Self {
    self.uid = uid;
    self.gid = gid;
    self
  }

  fn default_mounts() -> Vec<Mount> {
    vec![
      Mount::new("proc", "proc", "/proc", &["nosuid", "noexec", "nodev"]),
      Mount::new("tmpfs", "tmpfs", "/dev", &["nosuid", "strictatime", "mode=755", "size=65536k"]),
      Mount::new(
        "devpts",
        "devpts",
        "/dev/pts",
        &["nosuid", "noexec", "newinstance", "ptmxmode=0666", "mode=0620"],
      ),
      Mount::new("tmpfs", "shm", "/dev/shm", &["nosuid", "noexec", "nodev", "mode=1777", "size=65536k"]),
      Mount::new("mqueue", "mqueue", "/dev/mqueue", &["nosuid", "noexec", "nodev"]),
      Mount::new("sysfs", "sysfs", "/sys", &["nosuid", "noexec", "nodev", "ro"]),
    ]
  }

  fn environment(&self) -> Vec<String> {
    let mut env = vec![
      format!("PATH={SANDBOX_PATH}"),
      format!("PREFIX={}", self.project.install_prefix()),
    ];
    if let Some(triplet) = library_triplet(&self.arch) {
      env.push(format!("PKG_CONFIG_PATH=/runtime/lib/{triplet}/pkgconfig"));
      env.push(format!("LIBRARY_PATH=/runtime/lib:/runtime/lib/{triplet}"));
      env.push(format!("LD_LIBRARY_PATH=/runtime/lib:/runtime/lib/{triplet}"));
    }
    env
  }

  fn overlay_mounts(&self) -> Vec<Mount> {
    let mut mounts = Vec::new();
    if let Some(base) = &self.base_files {
      for dir in BASE_DIRS {
        mounts.push(Mount::bind(path_str(&base.join(dir)), format!("/{dir}"), &["ro", "rbind"]));
      }
    }
    if self.project.runtime.is_some() || !self.project.depends.is_empty() {
      mounts.push(Mount::bind(
        path_str(&self.paths.runtime_files()),
        RUNTIME_MOUNT,
        &["ro", "rbind"],
      ));
    }
    mounts
  }

  pub fn build(self) -> Runtime {
    let script = self
      .project
      .build_script_path
      .clone()
      .unwrap_or_else(|| self.paths.build_script());

    let mut mounts = Self::default_mounts();
    mounts.push(Mount::new("tmpfs", "tmpfs", "/tmp", &["nosuid", "strictatime", "mode=777"]));
    mounts.push(Mount::bind(path_str(&self.source_root), SOURCE_MOUNT, &["rbind"]));
    mounts.push(Mount::bind(path_str(&script), SCRIPT_MOUNT, &["ro", "rbind"]));

    let runtime = Runtime {
      oci_version: OCI_VERSION.to_string(),
      hostname: "linglong".to_string(),
      root: Root {
        path: path_str(&self.container.root_path()),
        readonly: false,
      },
      process: Process {
        terminal: false,
        args: vec!["/bin/bash".to_string(), "-e".to_string(), SCRIPT_MOUNT.to_string()],
        env: self.environment(),
        cwd: SOURCE_MOUNT.to_string(),
      },
      mounts,
      linux: Linux {
        namespaces: ["pid", "mount", "uts", "ipc", "user"]
          .into_iter()
          .map(|kind| Namespace { kind: kind.to_string() })
          .collect(),
        uid_mappings: vec![IdMapping {
          host_id: self.uid,
          container_id: 0,
          size: 1,
        }],
        gid_mappings: vec![IdMapping {
          host_id: self.gid,
          container_id: 0,
          size: 1,
        }],
      },
      hooks: Hooks {
        prestart: vec![Hook {
          path: "/usr/sbin/ldconfig".to_string(),
          args: Vec::new(),
        }],
      },
      annotations: Annotations {
        container_root_path: path_str(&self.container.working_dir),
        overlayfs: OverlayAnnotation {
          lower_parent: path_str(&self.paths.overlay_lower_parent()),
          workdir: path_str(&self.paths.overlay_workdir()),
          upper: path_str(&self.paths.overlay_upper()),
          mounts: self.overlay_mounts(),
        },
      },
    };
    debug!(
      mounts = runtime.mounts.len(),
      overlay_mounts = runtime.annotations.overlayfs.mounts.len(),
      "runtime spec assembled"
    );
    runtime
  }
}
