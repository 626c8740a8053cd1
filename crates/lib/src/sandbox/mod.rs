//! Launch and supervision of the external sandbox-init program.

pub mod launcher;
pub mod protocol;

use thiserror::Error;

pub use launcher::{LaunchOutcome, LaunchState, SandboxLauncher};
pub use protocol::{ProtocolError, SandboxResult};

#[derive(Debug, Error)]
pub enum SandboxError {
  #[error("failed to serialize runtime spec")]
  Encode(#[source] serde_json::Error),

  #[error("invalid sandbox-init program {0:?}")]
  InvalidProgram(String),

  #[error("socketpair failed")]
  SocketPair(#[source] nix::errno::Errno),

  #[error("fork failed")]
  Fork(#[source] nix::errno::Errno),

  #[error("waiting for sandbox-init failed")]
  Wait(#[source] nix::errno::Errno),

  #[error("failed to send spec to sandbox-init (sandbox-init {init_status})")]
  SendSpec {
    init_status: String,
    #[source]
    source: std::io::Error,
  },

  #[error("no usable result from sandbox-init (sandbox-init {init_status})")]
  Protocol {
    init_status: String,
    #[source]
    source: ProtocolError,
  },

  #[error("sandbox launcher task failed: {0}")]
  Join(String),
}
