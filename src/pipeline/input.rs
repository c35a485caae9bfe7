//! Upload resolution: turn a user-supplied path or URL into validated PDF bytes.
//!
//! Checks happen in the order a user would want to hear about them: name,
//! size, then content. The `%PDF` magic check runs before anything is stored
//! so a mislabelled upload never reaches pdfium.

use crate::error::RevealError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A validated upload held in memory.
#[derive(Debug, Clone)]
pub struct Upload {
    /// File name as presented by the user (last path or URL segment).
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read and validate a local file or URL.
pub async fn resolve_upload(
    input: &str,
    max_bytes: u64,
    timeout_secs: u64,
) -> Result<Upload, RevealError> {
    let upload = if is_url(input) {
        download_url(input, max_bytes, timeout_secs).await?
    } else {
        read_local(input, max_bytes).await?
    };
    validate_magic(&upload)?;
    Ok(upload)
}

fn check_name(name: &str) -> Result<(), RevealError> {
    if name.to_ascii_lowercase().ends_with(".pdf") {
        Ok(())
    } else {
        Err(RevealError::NotPdfName {
            name: name.to_string(),
        })
    }
}

fn check_size(name: &str, size: u64, limit: u64) -> Result<(), RevealError> {
    if size > limit {
        return Err(RevealError::FileTooLarge {
            name: name.to_string(),
            size,
            limit,
        });
    }
    Ok(())
}

fn validate_magic(upload: &Upload) -> Result<(), RevealError> {
    if upload.bytes.len() < 4 || &upload.bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = upload.bytes.len().min(4);
        magic[..n].copy_from_slice(&upload.bytes[..n]);
        return Err(RevealError::NotAPdf {
            name: upload.name.clone(),
            magic,
        });
    }
    Ok(())
}

async fn read_local(path_str: &str, max_bytes: u64) -> Result<Upload, RevealError> {
    let path = PathBuf::from(path_str);
    let name = file_name_of(&path);
    check_name(&name)?;

    let meta = tokio::fs::metadata(&path).await.map_err(|e| io_to_input_err(e, &path))?;
    check_size(&name, meta.len(), max_bytes)?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| io_to_input_err(e, &path))?;
    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(Upload { name, bytes })
}

fn io_to_input_err(e: std::io::Error, path: &Path) -> RevealError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => RevealError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => RevealError::FileNotFound {
            path: path.to_path_buf(),
        },
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Download a URL into memory, enforcing the size limit.
async fn download_url(url: &str, max_bytes: u64, timeout_secs: u64) -> Result<Upload, RevealError> {
    info!("Downloading PDF from: {}", url);
    let name = extract_filename(url);
    check_name(&name)?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RevealError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            RevealError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            RevealError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(RevealError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }
    if let Some(len) = response.content_length() {
        check_size(&name, len, max_bytes)?;
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| RevealError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    check_size(&name, bytes.len() as u64, max_bytes)?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(Upload {
        name,
        bytes: bytes.to_vec(),
    })
}

/// Last non-empty URL path segment, or `downloaded.pdf`.
fn extract_filename(url: &str) -> String {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_extract_filename() {
        assert_eq!(extract_filename("https://x.org/a/b/lease.pdf"), "lease.pdf");
        assert_eq!(extract_filename("https://x.org/a/b/"), "downloaded.pdf");
        assert_eq!(extract_filename("https://x.org/view"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn rejects_non_pdf_name() {
        let err = resolve_upload("/tmp/notes.txt", 1024, 5).await.unwrap_err();
        assert!(matches!(err, RevealError::NotPdfName { .. }));
    }

    #[tokio::test]
    async fn rejects_missing_file() {
        let err = resolve_upload("/definitely/not/here.pdf", 1024, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, RevealError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn rejects_oversized_and_bad_magic() {
        let tmp = tempfile::tempdir().unwrap();

        let big = tmp.path().join("big.pdf");
        std::fs::write(&big, vec![b'%'; 64]).unwrap();
        let err = resolve_upload(big.to_str().unwrap(), 32, 5).await.unwrap_err();
        assert!(matches!(err, RevealError::FileTooLarge { size: 64, limit: 32, .. }));

        let fake = tmp.path().join("fake.pdf");
        std::fs::write(&fake, b"PK\x03\x04zip").unwrap();
        let err = resolve_upload(fake.to_str().unwrap(), 1024, 5).await.unwrap_err();
        assert!(matches!(err, RevealError::NotAPdf { magic, .. } if &magic == b"PK\x03\x04"));
    }

    #[tokio::test]
    async fn accepts_pdf() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("Report.PDF");
        std::fs::write(&path, b"%PDF-1.7\n%%EOF").unwrap();
        let upload = resolve_upload(path.to_str().unwrap(), 1024, 5).await.unwrap();
        assert_eq!(upload.name, "Report.PDF");
        assert!(upload.bytes.starts_with(b"%PDF"));
    }
}
