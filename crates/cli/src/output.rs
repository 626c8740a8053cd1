//! Terminal output of `ll-builder`.
//!
//! Status lines go to stdout, errors to stderr. Committed and pushed refs are
//! listed as a module-aligned table.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use llbuild_lib::package::PackageRef;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

const DONE: &str = "✓";
const FAILED: &str = "✗";
const NOTE: &str = "•";
const MODULE_WIDTH: usize = 7;

/// Size of a cache or module tree, in binary units.
pub fn format_size(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
  if bytes < 1024 {
    return format!("{bytes} B");
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit + 1 < UNITS.len() {
    value /= 1024.0;
    unit += 1;
  }
  format!("{value:.1} {}", UNITS[unit])
}

/// Wall time of a build, to tenths of a second.
pub fn format_elapsed(elapsed: Duration) -> String {
  let secs = elapsed.as_secs();
  if secs >= 60 {
    format!("{}m{:02}s", secs / 60, secs % 60)
  } else {
    format!("{:.1}s", elapsed.as_secs_f64())
  }
}

/// `<module>  <id>/<version>/<arch>`, module padded so lists line up.
pub fn format_ref(reference: &PackageRef) -> String {
  format!("{:<MODULE_WIDTH$} {}", reference.module, reference.local_ref())
}

pub fn print_success(message: &str) {
  println!("{} {}", DONE.if_supports_color(Stream::Stdout, |s| s.green()), message);
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    FAILED.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_info(message: &str) {
  println!("{} {}", NOTE.if_supports_color(Stream::Stdout, |s| s.blue()), message);
}

/// Prints `heading` followed by one line per ref, in the given order.
pub fn print_refs(heading: &str, refs: &[PackageRef]) {
  print_success(heading);
  for reference in refs {
    println!("  {}", format_ref(reference).if_supports_color(Stream::Stdout, |s| s.cyan()));
  }
}

pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{json}");
  Ok(())
}
