//! Implementation of the `ll-builder build` command.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;

use llbuild_lib::Builder;
use llbuild_lib::overlay::FuseOverlayfs;
use llbuild_lib::repo::OstreeRepo;

use super::{load_config, runtime};
use crate::output::{format_elapsed, print_refs, print_stat};

/// Builds the project in the configured project root.
///
/// Dependencies that carry their own source are built first. Every committed
/// module ref is printed.
pub fn cmd_build(config: Option<&Path>) -> Result<()> {
  let start = Instant::now();
  let config = load_config(config)?;
  info!(root = ?config.project_root, "building");

  let repo = OstreeRepo::from_config(&config);
  let mounter = FuseOverlayfs::from_config(&config);
  let builder = Builder::new(&config, &repo, &mounter);

  let report = runtime()?.block_on(builder.build()).context("Build failed")?;

  print_refs("Build complete!", &report.built);
  print_stat("Duration", &format_elapsed(start.elapsed()));
  Ok(())
}
