//! Download of archive and file sources into the local cache.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::FetchError;
use crate::consts::FETCH_USER_AGENT;
use crate::error::IoContext;
use crate::util::fs::remove_path;
use crate::util::hash::{ContentHash, file_matches_digest};

/// Downloads `url` into `cache_dir`, verifying it against `digest`.
///
/// A cached copy is reused only when a digest is declared and the file hashes
/// to it; any other cached file is discarded first. A download that does not
/// match is removed and reported, never retried.
pub async fn download(url: &str, digest: Option<&str>, cache_dir: &Path) -> Result<PathBuf, FetchError> {
  fs::create_dir_all(cache_dir)
    .await
    .io_context(|| format!("creating download cache {}", cache_dir.display()))?;

  let filename = url_to_filename(url);
  let dest_path = cache_dir.join(&filename);

  if file_matches_digest(&dest_path, digest) {
    info!(path = ?dest_path, "using cached file");
    return Ok(dest_path);
  }
  if dest_path.exists() {
    debug!(path = ?dest_path, "discarding stale cached file");
    remove_path(&dest_path).io_context(|| format!("removing {}", dest_path.display()))?;
  }

  info!(url = %url, "fetching URL");
  let staging = cache_dir.join(format!(".{filename}.part"));
  let actual = fetch_to(url, &staging).await;
  let actual = match actual {
    Ok(actual) => actual,
    Err(e) => {
      let _ = fs::remove_file(&staging).await;
      return Err(e);
    }
  };

  if let Some(expected) = digest.filter(|d| !d.trim().is_empty()) {
    if !actual.matches(expected) {
      warn!(url = %url, expected = %expected, actual = %actual, "digest mismatch");
      let _ = fs::remove_file(&staging).await;
      return Err(FetchError::DigestMismatch {
        url: url.to_string(),
        expected: expected.to_string(),
        actual: actual.0,
      });
    }
  }

  fs::rename(&staging, &dest_path)
    .await
    .io_context(|| format!("moving download into {}", dest_path.display()))?;

  info!(path = ?dest_path, "download complete");
  Ok(dest_path)
}

/// Streams the response body into `path`, hashing it on the way.
async fn fetch_to(url: &str, path: &Path) -> Result<ContentHash, FetchError> {
  let request_error = |source| FetchError::Request {
    url: url.to_string(),
    source,
  };
  let client = reqwest::Client::builder()
    .user_agent(FETCH_USER_AGENT)
    .build()
    .map_err(request_error)?;
  let mut response = client.get(url).send().await.map_err(request_error)?;

  if !response.status().is_success() {
    return Err(FetchError::Status {
      url: url.to_string(),
      status: response.status().as_u16(),
    });
  }

  let mut file = fs::File::create(path)
    .await
    .io_context(|| format!("creating {}", path.display()))?;
  let mut hasher = Sha256::new();
  let mut size = 0usize;
  while let Some(chunk) = response.chunk().await.map_err(request_error)? {
    hasher.update(&chunk);
    size += chunk.len();
    file
      .write_all(&chunk)
      .await
      .io_context(|| format!("writing {}", path.display()))?;
  }
  file.flush().await.io_context(|| format!("writing {}", path.display()))?;

  debug!(url = %url, size, "body received");
  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Convert a URL to a safe filename.
///
/// Takes the last path component and sanitizes it. Falls back to hash of URL
/// if no suitable filename can be extracted.
pub fn url_to_filename(url: &str) -> String {
  if let Some(filename) = url.rsplit('/').next() {
    // Remove query string
    let filename = filename.split('?').next().unwrap_or(filename);

    let sanitized: String = filename
      .chars()
      .map(|c| {
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
          c
        } else {
          '_'
        }
      })
      .collect();

    if !sanitized.is_empty() && sanitized != "." && sanitized != ".." {
      return sanitized;
    }
  }

  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  format!("download_{}", &hex::encode(hasher.finalize())[..16])
}
