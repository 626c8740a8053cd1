//! Implementation of the `ll-builder info` command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use llbuild_lib::consts::PROJECT_FILE;
use llbuild_lib::layout::ProjectPaths;
use llbuild_lib::project::Project;
use llbuild_lib::util::fs::dir_size;

use super::load_config;
use crate::output::{OutputFormat, format_size, print_info, print_json, print_stat};

#[derive(Debug, Serialize)]
struct ProjectSummary {
  id: String,
  version: String,
  kind: String,
  install_prefix: String,
  cache_dir: PathBuf,
  cache_bytes: u64,
}

#[derive(Debug, Serialize)]
struct InfoReport {
  version: &'static str,
  arch: String,
  channel: String,
  repo_path: PathBuf,
  layers_dir: PathBuf,
  remote: String,
  sandbox_init: String,
  project: Option<ProjectSummary>,
}

pub fn cmd_info(config: Option<&Path>, output: OutputFormat) -> Result<()> {
  let config = load_config(config)?;

  let descriptor = config.project_root.join(PROJECT_FILE);
  let project = if descriptor.is_file() {
    let project = Project::load(&descriptor)?;
    let paths = ProjectPaths::new(&config.project_root, &project.package.id);
    Some(ProjectSummary {
      id: project.package.id.clone(),
      version: project.package.version.clone(),
      kind: project.package.kind.to_string(),
      install_prefix: project.install_prefix(),
      cache_dir: paths.root().to_path_buf(),
      cache_bytes: dir_size(paths.root()),
    })
  } else {
    None
  };

  let report = InfoReport {
    version: env!("CARGO_PKG_VERSION"),
    arch: config.target_arch.clone(),
    channel: config.channel.clone(),
    repo_path: config.repo_path.clone(),
    layers_dir: config.layers_dir.clone(),
    remote: config.remote_url(),
    sandbox_init: config.sandbox_init.clone(),
    project,
  };

  if output.is_json() {
    return print_json(&report);
  }

  print_info(&format!("ll-builder v{}", report.version));
  print_stat("Arch", &report.arch);
  print_stat("Channel", &report.channel);
  print_stat("Repo", &report.repo_path.display().to_string());
  print_stat("Layers", &report.layers_dir.display().to_string());
  print_stat("Remote", &report.remote);
  print_stat("Sandbox", &report.sandbox_init);
  match &report.project {
    Some(project) => {
      println!();
      print_info(&format!("Project {} {}", project.id, project.version));
      print_stat("Kind", &project.kind);
      print_stat("Prefix", &project.install_prefix);
      print_stat("Cache", &format!("{} ({})", project.cache_dir.display(), format_size(project.cache_bytes)));
    }
    None => {
      println!();
      print_info(&format!("No {PROJECT_FILE} in {}", config.project_root.display()));
    }
  }
  Ok(())
}
