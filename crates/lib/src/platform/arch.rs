use std::fmt;
use std::str::FromStr;

/// CPU architectures known to the package format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86_64,
  Arm64,
  Loongarch64,
}

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::X86_64),
      "aarch64" => Some(Self::Arm64),
      "loongarch64" => Some(Self::Loongarch64),
      _ => None,
    }
  }

  /// Name used in package refs and `info.json`.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::Arm64 => "arm64",
      Self::Loongarch64 => "loongarch64",
    }
  }

  /// Debian multiarch triplet used for library search paths.
  ///
  /// Only architectures with a known library layout return a value.
  pub fn library_triplet(&self) -> Option<&'static str> {
    match self {
      Self::X86_64 => Some("x86_64-linux-gnu"),
      Self::Arm64 => Some("aarch64-linux-gnu"),
      Self::Loongarch64 => None,
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Arch {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "x86_64" | "amd64" => Ok(Self::X86_64),
      "arm64" | "aarch64" => Ok(Self::Arm64),
      "loongarch64" => Ok(Self::Loongarch64),
      other => Err(format!("unknown architecture: {other}")),
    }
  }
}

/// Returns the package-format name of the host architecture.
///
/// Hosts outside the known set fall back to the compiler's architecture name.
pub fn host_arch() -> String {
  Arch::current()
    .map(|a| a.as_str().to_string())
    .unwrap_or_else(|| std::env::consts::ARCH.to_string())
}

/// Library triplet for an architecture name, if the name is known.
pub fn library_triplet(arch: &str) -> Option<&'static str> {
  arch.parse::<Arch>().ok().and_then(|a| a.library_triplet())
}
