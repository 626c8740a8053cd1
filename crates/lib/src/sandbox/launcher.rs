//! Fork/exec supervision of the sandbox-init program.
//!
//! The launcher creates a Unix socket pair, forks, and execs
//! `<sandbox-init> <fd>` in the child with the child's end of the pair left
//! open. The parent sends the spec, waits for the child to exit without a
//! timeout, then reads a bounded result document.

use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::prctl;
use nix::sys::signal::{SigHandler, Signal, signal};
use nix::sys::socket::{AddressFamily, SockFlag, SockType, socketpair};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};
use tracing::{debug, info, warn};

use super::SandboxError;
use super::protocol::{self, SandboxResult};
use crate::config::BuilderConfig;
use crate::runtime::Runtime;

/// Progress of one launch, traced on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
  Init,
  SpecSerialized,
  Forked,
  ChildRunning,
  Waited,
  ResultParsed,
  Done,
  Failed,
}

struct Tracker {
  state: LaunchState,
}

impl Tracker {
  fn advance(&mut self, next: LaunchState) {
    debug!(from = ?self.state, to = ?next, "sandbox launch");
    self.state = next;
  }

  fn fail(&mut self, error: SandboxError) -> SandboxError {
    warn!(state = ?self.state, error = %error, "sandbox launch failed");
    self.advance(LaunchState::Failed);
    error
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
  pub pid: i32,
  /// How the sandbox-init process itself ended.
  pub init_status: String,
  pub result: SandboxResult,
}

#[derive(Debug, Clone)]
pub struct SandboxLauncher {
  program: String,
  result_timeout: Duration,
}

fn describe(status: WaitStatus) -> String {
  match status {
    WaitStatus::Exited(_, code) => format!("exited with {code}"),
    WaitStatus::Signaled(_, signal, _) => format!("killed by {signal}"),
    other => format!("{other:?}"),
  }
}

/// Waits for `pid` to terminate, retrying on EINTR.
fn wait_for(pid: Pid) -> Result<WaitStatus, Errno> {
  loop {
    match waitpid(pid, None) {
      Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => return Ok(status),
      Ok(_) => continue,
      Err(Errno::EINTR) => continue,
      Err(e) => return Err(e),
    }
  }
}

impl SandboxLauncher {
  pub fn new(program: impl Into<String>, result_timeout: Duration) -> Self {
    Self {
      program: program.into(),
      result_timeout,
    }
  }

  pub fn from_config(config: &BuilderConfig) -> Self {
    Self::new(&config.sandbox_init, config.result_timeout())
  }

  /// Runs [`Self::launch`] on the blocking thread pool.
  pub async fn run(self, spec: Runtime) -> Result<LaunchOutcome, SandboxError> {
    tokio::task::spawn_blocking(move || self.launch(&spec))
      .await
      .map_err(|e| SandboxError::Join(e.to_string()))?
  }

  /// Launches the sandbox-init for `spec` and blocks until it has exited.
  pub fn launch(&self, spec: &Runtime) -> Result<LaunchOutcome, SandboxError> {
    let mut tracker = Tracker {
      state: LaunchState::Init,
    };

    let payload = protocol::encode_spec(spec).map_err(|e| tracker.fail(SandboxError::Encode(e)))?;
    tracker.advance(LaunchState::SpecSerialized);

    let program =
      CString::new(self.program.as_bytes()).map_err(|_| tracker.fail(SandboxError::InvalidProgram(self.program.clone())))?;
    let (parent_end, child_end) = socketpair(AddressFamily::Unix, SockType::Stream, None, SockFlag::empty())
      .map_err(|e| tracker.fail(SandboxError::SocketPair(e)))?;
    let fd_arg = CString::new(child_end.as_raw_fd().to_string())
      .map_err(|_| tracker.fail(SandboxError::InvalidProgram(self.program.clone())))?;
    // The child must not allocate between fork and exec, so argv is built here.
    let argv = [program.as_ptr(), fd_arg.as_ptr(), std::ptr::null()];

    // SAFETY: the child only closes a descriptor, calls prctl, sigaction and
    // execvp, and exits with _exit, none of which allocate or take locks.
    match unsafe { fork() }.map_err(|e| tracker.fail(SandboxError::Fork(e)))? {
      ForkResult::Child => {
        drop(parent_end);
        // Armed in the child so it is the sandbox-init that dies with us.
        let _ = prctl::set_pdeathsig(Signal::SIGKILL);
        // The Rust runtime ignores SIGPIPE and exec keeps ignored dispositions.
        // SAFETY: installs the default disposition, no handler runs.
        let _ = unsafe { signal(Signal::SIGPIPE, SigHandler::SigDfl) };
        // SAFETY: program and argv outlive the call and argv is NULL-terminated.
        unsafe {
          nix::libc::execvp(program.as_ptr(), argv.as_ptr());
          nix::libc::_exit(127)
        }
      }
      ForkResult::Parent { child } => {
        drop(child_end);
        tracker.advance(LaunchState::Forked);
        self.supervise(child, parent_end, &payload, tracker)
      }
    }
  }

  fn supervise(
    &self,
    child: Pid,
    parent_end: OwnedFd,
    payload: &[u8],
    mut tracker: Tracker,
  ) -> Result<LaunchOutcome, SandboxError> {
    info!(pid = child.as_raw(), program = %self.program, "sandbox-init started");
    let mut stream = UnixStream::from(parent_end);

    let sent = protocol::send_spec(&mut stream, payload);
    if sent.is_ok() {
      tracker.advance(LaunchState::ChildRunning);
    }

    let status = wait_for(child).map_err(|e| tracker.fail(SandboxError::Wait(e)))?;
    tracker.advance(LaunchState::Waited);
    let init_status = describe(status);
    info!(pid = child.as_raw(), status = %init_status, "sandbox-init exited");

    if let Err(source) = sent {
      return Err(tracker.fail(SandboxError::SendSpec { init_status, source }));
    }

    let timeout = self.result_timeout.max(Duration::from_millis(1));
    if let Err(source) = stream.set_read_timeout(Some(timeout)) {
      return Err(tracker.fail(SandboxError::Protocol {
        init_status,
        source: protocol::ProtocolError::Io(source),
      }));
    }
    let result = match protocol::read_result(&mut stream) {
      Ok(result) => result,
      Err(source) => return Err(tracker.fail(SandboxError::Protocol { init_status, source })),
    };
    tracker.advance(LaunchState::ResultParsed);
    tracker.advance(if result.success() {
      LaunchState::Done
    } else {
      LaunchState::Failed
    });

    Ok(LaunchOutcome {
      pid: child.as_raw(),
      init_status,
      result,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sandbox::protocol::ProtocolError;
  use crate::util::testutil::write_script;
  use std::path::Path;
  use tempfile::tempdir;
  use tracing_test::traced_test;

  fn sample_spec() -> Runtime {
    serde_json::from_value(serde_json::json!({
      "ociVersion": "1.0.1",
      "hostname": "linglong",
      "root": {"path": "/c/root", "readonly": false},
      "process": {"terminal": false, "args": ["/bin/bash", "-e", "/entry.sh"], "env": ["PREFIX=/runtime"], "cwd": "/source"},
      "mounts": [],
      "linux": {"namespaces": [], "uidMappings": [], "gidMappings": []},
      "hooks": {"prestart": []},
      "annotations": {"containerRootPath": "/c", "overlayfs": {"lowerParent": "/l", "workdir": "/w", "upper": "/u", "mounts": []}}
    }))
    .unwrap()
  }

  fn launcher(dir: &Path, body: &str) -> SandboxLauncher {
    let script = write_script(dir, "ll-box", body);
    SandboxLauncher::new(script.display().to_string(), Duration::from_millis(500))
  }

  #[test]
  fn sends_spec_and_reads_success() {
    let temp = tempdir().unwrap();
    let captured = temp.path().join("spec.json");
    let launcher = launcher(
      temp.path(),
      &format!(
        "IFS= read -r -d '' spec <&\"$1\"\nprintf '%s' \"$spec\" > {}\nprintf '{{\"wstatus\":0}}' >&\"$1\"",
        captured.display()
      ),
    );

    let outcome = launcher.launch(&sample_spec()).unwrap();

    assert!(outcome.result.success());
    assert_eq!(outcome.init_status, "exited with 0");
    let received: Runtime = serde_json::from_str(&std::fs::read_to_string(&captured).unwrap()).unwrap();
    assert_eq!(received, sample_spec());
  }

  #[test]
  fn build_failure_status_is_passed_through() {
    let temp = tempdir().unwrap();
    let launcher = launcher(temp.path(), "printf '{\"wstatus\":256}\\0' >&\"$1\"");

    let outcome = launcher.launch(&sample_spec()).unwrap();

    assert_eq!(outcome.result.wstatus, 256);
    assert!(!outcome.result.success());
  }

  #[test]
  fn silent_exit_is_protocol_error() {
    let temp = tempdir().unwrap();
    let launcher = launcher(temp.path(), "IFS= read -r -d '' spec <&\"$1\"\nexit 3");

    let err = launcher.launch(&sample_spec()).unwrap_err();

    assert!(matches!(
      err,
      SandboxError::Protocol {
        source: ProtocolError::Empty,
        ref init_status,
      } if init_status == "exited with 3"
    ));
  }

  #[test]
  fn child_starts_with_default_sigpipe() {
    let temp = tempdir().unwrap();
    let ignored = temp.path().join("sigign");
    let launcher = launcher(
      temp.path(),
      &format!(
        "awk '/^SigIgn/ {{print $2}}' /proc/$$/status > {}\nIFS= read -r -d '' spec <&\"$1\"\nprintf '{{\"wstatus\":0}}' >&\"$1\"",
        ignored.display()
      ),
    );

    launcher.launch(&sample_spec()).unwrap();

    let mask = u64::from_str_radix(std::fs::read_to_string(&ignored).unwrap().trim(), 16).unwrap();
    assert_eq!(mask & (1 << (Signal::SIGPIPE as i32 - 1)), 0);
  }

  #[test]
  fn oversized_result_is_protocol_error() {
    let temp = tempdir().unwrap();
    let launcher = launcher(temp.path(), "head -c 4096 /dev/zero | tr '\\0' x >&\"$1\"");

    let err = launcher.launch(&sample_spec()).unwrap_err();

    assert!(matches!(
      err,
      SandboxError::Protocol {
        source: ProtocolError::Truncated { .. },
        ..
      }
    ));
  }

  #[test]
  fn garbage_result_is_protocol_error() {
    let temp = tempdir().unwrap();
    let launcher = launcher(temp.path(), "printf 'not json' >&\"$1\"");

    let err = launcher.launch(&sample_spec()).unwrap_err();

    assert!(matches!(
      err,
      SandboxError::Protocol {
        source: ProtocolError::Malformed(_),
        ..
      }
    ));
  }

  #[test]
  fn lingering_writer_times_out() {
    let temp = tempdir().unwrap();
    let launcher = launcher(temp.path(), "sleep 2 &\nexit 0");

    let err = launcher.launch(&sample_spec()).unwrap_err();

    assert!(matches!(
      err,
      SandboxError::Protocol {
        source: ProtocolError::Timeout,
        ..
      }
    ));
  }

  #[test]
  fn missing_program_never_reports_success() {
    let temp = tempdir().unwrap();
    let launcher = SandboxLauncher::new(
      temp.path().join("no-such-box").display().to_string(),
      Duration::from_millis(200),
    );

    let err = launcher.launch(&sample_spec()).unwrap_err();

    match err {
      SandboxError::SendSpec { init_status, .. } | SandboxError::Protocol { init_status, .. } => {
        assert_eq!(init_status, "exited with 127")
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[test]
  fn program_name_with_nul_is_rejected() {
    let launcher = SandboxLauncher::new("ll\0box", Duration::from_secs(1));
    assert!(matches!(
      launcher.launch(&sample_spec()),
      Err(SandboxError::InvalidProgram(_))
    ));
  }

  #[test]
  #[traced_test]
  fn transitions_are_traced() {
    let temp = tempdir().unwrap();
    let launcher = launcher(temp.path(), "printf '{\"wstatus\":0}' >&\"$1\"");

    launcher.launch(&sample_spec()).unwrap();

    assert!(logs_contain("SpecSerialized"));
    assert!(logs_contain("ResultParsed"));
    assert!(logs_contain("sandbox-init exited"));
  }

  #[tokio::test]
  async fn run_uses_blocking_pool() {
    let temp = tempdir().unwrap();
    let launcher = launcher(temp.path(), "printf '{\"wstatus\":0}' >&\"$1\"");

    let outcome = launcher.run(sample_spec()).await.unwrap();

    assert!(outcome.pid > 0);
  }
}
