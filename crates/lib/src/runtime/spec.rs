//! The OCI-like document handed to the sandbox-init program.

use serde::{Deserialize, Serialize};

pub const OCI_VERSION: &str = "1.0.1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runtime {
  pub oci_version: String,
  pub hostname: String,
  pub root: Root,
  pub process: Process,
  /// Mounts applied on top of the root, in order.
  pub mounts: Vec<Mount>,
  pub linux: Linux,
  pub hooks: Hooks,
  pub annotations: Annotations,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
  pub path: String,
  pub readonly: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
  pub terminal: bool,
  pub args: Vec<String>,
  pub env: Vec<String>,
  pub cwd: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
  pub destination: String,
  #[serde(rename = "type")]
  pub kind: String,
  pub source: String,
  /// Order matters to the mounter, e.g. `ro` before `rbind`.
  pub options: Vec<String>,
}

impl Mount {
  pub fn new(kind: &str, source: impl Into<String>, destination: impl Into<String>, options: &[&str]) -> Self {
    Self {
      destination: destination.into(),
      kind: kind.to_string(),
      source: source.into(),
      options: options.iter().map(|o| o.to_string()).collect(),
    }
  }

  pub fn bind(source: impl Into<String>, destination: impl Into<String>, options: &[&str]) -> Self {
    Self::new("bind", source, destination, options)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Linux {
  pub namespaces: Vec<Namespace>,
  pub uid_mappings: Vec<IdMapping>,
  pub gid_mappings: Vec<IdMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
  #[serde(rename = "type")]
  pub kind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMapping {
  #[serde(rename = "hostID")]
  pub host_id: u32,
  #[serde(rename = "containerID")]
  pub container_id: u32,
  pub size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hooks {
  pub prestart: Vec<Hook>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hook {
  pub path: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotations {
  pub container_root_path: String,
  pub overlayfs: OverlayAnnotation,
}

/// Overlay the sandbox-init stacks over the base before applying `mounts`.
///
/// `lower_parent`, `workdir` and `upper` are distinct directories that exist
/// before launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayAnnotation {
  pub lower_parent: String,
  pub workdir: String,
  pub upper: String,
  pub mounts: Vec<Mount>,
}
