//! Host platform detection and XDG directory lookup.

pub mod arch;
pub mod paths;

pub use arch::{host_arch, library_triplet};

/// Numeric ids of the invoking user, mapped to root inside the sandbox.
pub fn current_ids() -> (u32, u32) {
  (nix::unistd::getuid().as_raw(), nix::unistd::getgid().as_raw())
}
