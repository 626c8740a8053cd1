//! The build descriptor (`linglong.yaml`) and its typed model.
//!
//! `Project::parse` maps the YAML schema onto typed structs and validates it,
//! naming the first offending field on failure. Sub-projects for buildable
//! dependencies come from [`synthesize_dependency`].

mod parse;
pub mod script;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::consts::RUNTIME_PREFIX;
use crate::package::PackageRef;

pub use script::{generate_build_script, render_build_script};

#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("project descriptor not found: {0}")]
  NotFound(PathBuf),

  #[error("failed to read project descriptor {path}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed project descriptor")]
  Syntax(#[from] serde_yaml::Error),

  #[error("missing required field '{0}'")]
  MissingField(String),

  #[error("invalid value for '{field}': {reason}")]
  InvalidField { field: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageKind {
  App,
  Lib,
  Runtime,
}

impl PackageKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::App => "app",
      Self::Lib => "lib",
      Self::Runtime => "runtime",
    }
  }
}

impl fmt::Display for PackageKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for PackageKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "app" => Ok(Self::App),
      "lib" => Ok(Self::Lib),
      "runtime" => Ok(Self::Runtime),
      other => Err(format!("unknown package kind '{other}', expected app, lib or runtime")),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
  pub id: String,
  pub name: String,
  pub version: String,
  pub kind: PackageKind,
  pub description: String,
}

/// A reference whose version and architecture may be left open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzyRef {
  pub id: String,
  pub version: Option<String>,
  pub arch: Option<String>,
}

impl FuzzyRef {
  pub fn new(id: impl Into<String>, version: Option<String>) -> Self {
    Self {
      id: id.into(),
      version,
      arch: None,
    }
  }

  /// Fills the architecture with `host_arch` when absent.
  ///
  /// An open version stays empty and is settled by the repository lookup.
  pub fn resolve(&self, host_arch: &str, channel: &str) -> PackageRef {
    PackageRef::new(
      self.id.clone(),
      self.version.clone().unwrap_or_default(),
      self.arch.clone().unwrap_or_else(|| host_arch.to_string()),
    )
    .with_channel(channel)
  }
}

impl fmt::Display for FuzzyRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.id)?;
    if let Some(version) = &self.version {
      write!(f, "/{version}")?;
    }
    if let Some(arch) = &self.arch {
      write!(f, "/{arch}")?;
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
  Git,
  Dsc,
  Archive,
  File,
}

impl SourceKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Git => "git",
      Self::Dsc => "dsc",
      Self::Archive => "archive",
      Self::File => "file",
    }
  }
}

impl FromStr for SourceKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "git" => Ok(Self::Git),
      "dsc" => Ok(Self::Dsc),
      "archive" => Ok(Self::Archive),
      "file" => Ok(Self::File),
      other => Err(format!("unknown source kind '{other}'")),
    }
  }
}

/// Where the project's source comes from.
///
/// Archive and file sources always carry a url and a digest, git and dsc
/// sources always carry a url. Parsing rejects anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
  pub kind: SourceKind,
  pub url: Option<String>,
  pub commit: Option<String>,
  pub version: Option<String>,
  pub digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDepend {
  pub id: String,
  pub version: Option<String>,
  pub kind: Option<String>,
  pub source: Option<SourceDescriptor>,
  pub build: Option<String>,
  pub variables: Vec<(String, String)>,
}

impl BuildDepend {
  /// Dependencies that carry their own source and build procedure are built
  /// as independent targets before the project that needs them.
  pub fn is_buildable(&self) -> bool {
    self.source.is_some() && self.build.is_some()
  }

  pub fn fuzzy_ref(&self) -> FuzzyRef {
    FuzzyRef::new(self.id.clone(), self.version.clone())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
  pub package: Package,
  pub runtime: Option<FuzzyRef>,
  pub base: Option<FuzzyRef>,
  pub depends: Vec<BuildDepend>,
  pub source: Option<SourceDescriptor>,
  /// Build variables in declaration order.
  pub variables: Vec<(String, String)>,
  pub build: Option<String>,
  pub config_file_path: Option<PathBuf>,
  pub build_script_path: Option<PathBuf>,
}

impl Project {
  pub fn parse(text: &str) -> Result<Self, ProjectError> {
    parse::parse_project(text)
  }

  /// Reads and parses a descriptor, remembering where it came from.
  pub fn load(path: &Path) -> Result<Self, ProjectError> {
    if !path.is_file() {
      return Err(ProjectError::NotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|source| ProjectError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let mut project = Self::parse(&text)?;
    project.set_config_file_path(path.to_path_buf());
    Ok(project)
  }

  /// Renders the project back into descriptor YAML.
  pub fn to_yaml(&self) -> Result<String, ProjectError> {
    parse::render_project(self)
  }

  pub fn set_config_file_path(&mut self, path: PathBuf) {
    self.config_file_path = Some(path);
  }

  pub fn set_build_script_path(&mut self, path: PathBuf) {
    self.build_script_path = Some(path);
  }

  /// Absolute prefix the build installs into, inside the sandbox.
  pub fn install_prefix(&self) -> String {
    match self.package.kind {
      PackageKind::App => format!("/opt/apps/{}/files", self.package.id),
      PackageKind::Lib | PackageKind::Runtime => RUNTIME_PREFIX.to_string(),
    }
  }

  /// Ref of this project's output for `module`.
  pub fn package_ref(&self, arch: &str, channel: &str, module: &str) -> PackageRef {
    PackageRef::new(self.package.id.clone(), self.package.version.clone(), arch)
      .with_channel(channel)
      .with_module(module)
  }
}

/// Builds the standalone project for a dependency that carries its own source
/// and build procedure.
///
/// The result is a `lib` package with the dependency's id and version that
/// inherits the parent's runtime and base and copies the dependency's
/// variables, source and build verbatim.
pub fn synthesize_dependency(parent: &Project, depend: &BuildDepend) -> Project {
  Project {
    package: Package {
      id: depend.id.clone(),
      name: depend.id.clone(),
      version: depend.version.clone().unwrap_or_default(),
      kind: PackageKind::Lib,
      description: String::new(),
    },
    runtime: parent.runtime.clone(),
    base: parent.base.clone(),
    depends: Vec::new(),
    source: depend.source.clone(),
    variables: depend.variables.clone(),
    build: depend.build.clone(),
    config_file_path: None,
    build_script_path: None,
  }
}
