mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{cmd_build, cmd_create, cmd_export, cmd_import, cmd_info, cmd_push, cmd_track};
use output::{OutputFormat, print_error};

/// ll-builder - build Linglong packages in a sandbox
#[derive(Parser)]
#[command(name = "ll-builder")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Builder configuration file (default: $XDG_CONFIG_HOME/llbuild/builder.yaml)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the project in the current directory
  Build,

  /// Create a new project from the template
  Create {
    /// Project name, also used as the package id
    name: String,
  },

  /// Update a git source to the newest commit of its ref
  Track,

  /// Push the built package to the remote repository
  Push {
    /// Push the devel module as well
    #[arg(long)]
    with_devel: bool,
  },

  /// Check the built modules out into <project>/<id>
  Export,

  /// Import the project directory as the runtime module
  Import,

  /// Show configuration and project details
  Info {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let config = cli.config.as_deref();
  let result = match cli.command {
    Commands::Build => cmd_build(config),
    Commands::Create { name } => cmd_create(&name),
    Commands::Track => cmd_track(config),
    Commands::Push { with_devel } => cmd_push(config, with_devel),
    Commands::Export => cmd_export(config),
    Commands::Import => cmd_import(config),
    Commands::Info { output } => cmd_info(config, output),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{e:#}"));
      ExitCode::FAILURE
    }
  }
}
