use std::path::Path;

use anyhow::{Context, Result};

use llbuild_lib::Builder;
use llbuild_lib::overlay::FuseOverlayfs;
use llbuild_lib::repo::OstreeRepo;

use super::{load_config, runtime};
use crate::output::{print_info, print_success};

pub fn cmd_track(config: Option<&Path>) -> Result<()> {
  let config = load_config(config)?;
  let repo = OstreeRepo::from_config(&config);
  let mounter = FuseOverlayfs::from_config(&config);
  let builder = Builder::new(&config, &repo, &mounter);

  match runtime()?.block_on(builder.track()).context("Track failed")? {
    Some(commit) => print_success(&format!("Source commit updated to {commit}")),
    None => print_info("Source is up to date"),
  }
  Ok(())
}
