use std::path::Path;

use anyhow::{Context, Result};

use llbuild_lib::Builder;
use llbuild_lib::overlay::FuseOverlayfs;
use llbuild_lib::repo::OstreeRepo;

use super::{load_config, runtime};
use crate::output::print_success;

pub fn cmd_import(config: Option<&Path>) -> Result<()> {
  let config = load_config(config)?;
  let repo = OstreeRepo::from_config(&config);
  let mounter = FuseOverlayfs::from_config(&config);
  let builder = Builder::new(&config, &repo, &mounter);

  let reference = runtime()?.block_on(builder.import()).context("Import failed")?;

  print_success(&format!("Imported {}", reference.local_ref()));
  Ok(())
}
