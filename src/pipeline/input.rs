//! Input resolution: turn a path, URL or byte buffer into a local PDF file.
//!
//! The engines all open documents by path, so URLs and in-memory uploads
//! are staged into a `TempDir` that lives as long as the [`ResolvedInput`].
//! Only a missing or unreadable file is rejected here. Content that is not
//! a PDF is logged and handed on; the extractors find nothing in it and the
//! run ends as empty.

use crate::error::InputError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// The resolved input: a local path, or a file staged in a temp directory.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was downloaded or supplied as bytes. The `TempDir` is removed
    /// when this value is dropped.
    Staged { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Staged { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or URL to a local PDF file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, InputError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Write an uploaded `bytes` buffer to a temp file named `filename`.
///
/// An empty upload is rejected; any other content is staged as given.
pub fn stage_bytes(bytes: &[u8], filename: &str) -> Result<ResolvedInput, InputError> {
    if bytes.is_empty() {
        return Err(InputError::Empty {
            path: PathBuf::from(safe_filename(filename)),
        });
    }
    stage(bytes, filename)
}

fn stage(bytes: &[u8], filename: &str) -> Result<ResolvedInput, InputError> {
    let temp_dir = TempDir::new().map_err(InputError::Staging)?;
    let path = temp_dir.path().join(safe_filename(filename));
    std::fs::write(&path, bytes).map_err(InputError::Staging)?;
    warn_unless_pdf(bytes, &path);
    debug!("Staged {} bytes at {}", bytes.len(), path.display());
    Ok(ResolvedInput::Staged {
        path,
        _temp_dir: temp_dir,
    })
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, InputError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(InputError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 5];
            let read = f.read(&mut magic).unwrap_or(0);
            warn_unless_pdf(&magic[..read], &path);
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(InputError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(InputError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Whether `bytes` start with the `%PDF-` header.
pub fn has_pdf_header(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

fn warn_unless_pdf(head: &[u8], path: &Path) {
    if head.is_empty() {
        warn!("{} is empty", path.display());
    } else if !has_pdf_header(head) {
        warn!(
            "{} has no %PDF- header (starts with {:?})",
            path.display(),
            String::from_utf8_lossy(&head[..head.len().min(5)])
        );
    }
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, InputError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| InputError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            InputError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            InputError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(InputError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);
    let bytes = response
        .bytes()
        .await
        .map_err(|e| InputError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let resolved = stage(&bytes, &filename)?;
    info!("Downloaded to: {}", resolved.path().display());
    Ok(resolved)
}

/// Last path segment of the URL if it looks like a file name.
pub fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

fn safe_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .trim();
    if base.is_empty() {
        "upload.pdf".to_string()
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(filename_from_url("https://x.test/a/bill.pdf?x=1"), "bill.pdf");
        assert_eq!(filename_from_url("https://x.test/download"), "downloaded.pdf");
        assert_eq!(filename_from_url("not a url"), "downloaded.pdf");
    }

    #[test]
    fn stage_bytes_keeps_file_until_drop() {
        let resolved = stage_bytes(b"%PDF-1.7\n", "../../etc/receipt.pdf").unwrap();
        let path = resolved.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.file_name().unwrap(), "receipt.pdf");
        drop(resolved);
        assert!(!path.exists());
    }

    #[test]
    fn stage_bytes_rejects_only_empty_uploads() {
        assert!(matches!(stage_bytes(b"", "a.pdf"), Err(InputError::Empty { .. })));

        let resolved = stage_bytes(b"PK\x03\x04zip", "a.pdf").unwrap();
        assert_eq!(std::fs::read(resolved.path()).unwrap(), b"PK\x03\x04zip");
    }

    #[test]
    fn pdf_header() {
        assert!(has_pdf_header(b"%PDF-1.7\n"));
        assert!(!has_pdf_header(b"%PDF"));
        assert!(!has_pdf_header(b"hello"));
        assert!(!has_pdf_header(b""));
    }

    #[tokio::test]
    async fn local_file_checks() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.pdf");
        let err = resolve_input(missing.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, InputError::FileNotFound { .. }));

        let text = dir.path().join("notes.pdf");
        std::fs::File::create(&text)
            .unwrap()
            .write_all(b"hello")
            .unwrap();
        let resolved = resolve_input(text.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(resolved.path(), text.as_path());

        let empty = dir.path().join("empty.pdf");
        std::fs::File::create(&empty).unwrap();
        let resolved = resolve_input(empty.to_str().unwrap(), 5).await.unwrap();
        assert!(matches!(resolved, ResolvedInput::Local(_)));

        let pdf = dir.path().join("ok.pdf");
        std::fs::write(&pdf, b"%PDF-1.4\n%%EOF").unwrap();
        let resolved = resolve_input(pdf.to_str().unwrap(), 5).await.unwrap();
        assert!(matches!(resolved, ResolvedInput::Local(_)));
        assert_eq!(resolved.path(), pdf.as_path());
    }
}
