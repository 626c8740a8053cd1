//! Wire format between the builder and the sandbox-init program.
//!
//! The builder writes the JSON spec followed by a single NUL byte. The
//! sandbox-init answers with a small JSON document `{"wstatus": <int>}`,
//! terminated by NUL or by closing its end of the socket.

use std::io::{self, Read, Write};

use serde::Deserialize;
use thiserror::Error;

use crate::consts::RESULT_BUFFER_SIZE;
use crate::runtime::Runtime;

#[derive(Debug, Error)]
pub enum ProtocolError {
  #[error("sandbox-init closed the channel without a result")]
  Empty,

  #[error("result exceeds {limit} bytes without a terminator")]
  Truncated { limit: usize },

  #[error("timed out waiting for the result")]
  Timeout,

  #[error("malformed result document")]
  Malformed(#[source] serde_json::Error),

  #[error("failed to read the result")]
  Io(#[source] io::Error),
}

/// What the sandbox-init reports about the build process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SandboxResult {
  /// Wait status of the build script, 0 on success.
  pub wstatus: i32,
}

impl SandboxResult {
  pub fn success(&self) -> bool {
    self.wstatus == 0
  }
}

/// Serializes `spec` as the NUL-terminated message.
pub fn encode_spec(spec: &Runtime) -> Result<Vec<u8>, serde_json::Error> {
  let mut payload = serde_json::to_vec(spec)?;
  payload.push(0);
  Ok(payload)
}

pub fn send_spec<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
  writer.write_all(payload)?;
  writer.flush()
}

/// Reads one result document of at most [`RESULT_BUFFER_SIZE`] bytes.
pub fn read_result<R: Read>(reader: &mut R) -> Result<SandboxResult, ProtocolError> {
  let mut buf = vec![0u8; RESULT_BUFFER_SIZE];
  let mut filled = 0;

  loop {
    if buf[..filled].contains(&0) {
      break;
    }
    if filled == buf.len() {
      return Err(ProtocolError::Truncated {
        limit: RESULT_BUFFER_SIZE,
      });
    }
    match reader.read(&mut buf[filled..]) {
      Ok(0) => break,
      Ok(n) => filled += n,
      Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
      Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
        return Err(ProtocolError::Timeout);
      }
      Err(e) => return Err(ProtocolError::Io(e)),
    }
  }

  let end = buf[..filled].iter().position(|b| *b == 0).unwrap_or(filled);
  let document = buf[..end].trim_ascii();
  if document.is_empty() {
    return Err(ProtocolError::Empty);
  }
  serde_json::from_slice(document).map_err(ProtocolError::Malformed)
}
