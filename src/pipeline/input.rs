//! Input loading: read a user-supplied path or URL into PDF bytes.
//!
//! Both raster engines work from an in-memory buffer, so a downloaded PDF
//! never touches disk here. The `%PDF` magic bytes are checked before
//! returning so callers get a meaningful error rather than a renderer crash.

use crate::error::ExamError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load PDF bytes from a local path or an HTTP(S) URL.
pub async fn load_pdf(input: &str, timeout_secs: u64) -> Result<Vec<u8>, ExamError> {
    if is_url(input) {
        download(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

/// Reject buffers that do not start with `%PDF`.
pub fn check_magic(bytes: &[u8], source_name: &str) -> Result<(), ExamError> {
    if bytes.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(ExamError::NotAPdf {
        source_name: source_name.to_string(),
        magic,
    })
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, ExamError> {
    let path = PathBuf::from(path_str);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ExamError::FileNotFound { path });
        }
        Err(source) => return Err(ExamError::ReadFailed { path, source }),
    };
    check_magic(&bytes, path_str)?;
    debug!("Loaded local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

async fn download(url: &str, timeout_secs: u64) -> Result<Vec<u8>, ExamError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| ExamError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    check_magic(&bytes, url)?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}
