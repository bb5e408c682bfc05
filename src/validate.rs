//! Admission checks for candidate files.
//!
//! A file is admissible when it exists, carries a supported extension
//! (compared case-insensitively), and fits under the per-file size limit.
//! Batches additionally enforce a total-size ceiling and a document-count
//! ceiling; either violation rejects the whole batch before anything is
//! copied.
//!
//! Media-type sniffing is advisory: a file whose bytes do not look like its
//! extension is logged and admitted anyway.

use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::models::bytes_to_mb;

/// Extensions accepted for ingestion, lowercase with the leading dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[".pdf", ".txt", ".md"];

const SNIFF_BYTES: usize = 8 * 1024;

/// Per-file outcome of batch validation, kept for diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub valid: Vec<ValidFile>,
    pub invalid: Vec<RejectedFile>,
    /// Sum over `valid` only.
    pub total_size_mb: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidFile {
    pub path: PathBuf,
    pub name: String,
    pub size_mb: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedFile {
    pub path: PathBuf,
    pub name: String,
    pub kind: &'static str,
    pub reason: String,
}

impl ValidationReport {
    pub fn summary(&self) -> String {
        format!(
            "Validated {} valid files, {} invalid files",
            self.valid.len(),
            self.invalid.len()
        )
    }
}

#[derive(Debug, Clone)]
pub struct FileValidator {
    upload_limit_mb: f64,
    max_documents: usize,
}

impl FileValidator {
    pub fn new(app: &AppConfig) -> Self {
        Self {
            upload_limit_mb: app.upload_limit_mb,
            max_documents: app.max_documents,
        }
    }

    pub fn upload_limit_mb(&self) -> f64 {
        self.upload_limit_mb
    }

    pub fn max_documents(&self) -> usize {
        self.max_documents
    }

    /// Check one file. Returns its size in bytes when admissible.
    pub fn validate_file(&self, path: &Path) -> Result<u64> {
        let meta = match std::fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            _ => return Err(Error::NotFound(path.to_path_buf())),
        };

        let extension = normalized_extension(path);
        if !is_supported_extension(&extension) {
            return Err(Error::UnsupportedType {
                path: path.to_path_buf(),
                extension,
                supported: SUPPORTED_EXTENSIONS.join(", "),
            });
        }

        let size_mb = bytes_to_mb(meta.len());
        if size_mb > self.upload_limit_mb {
            return Err(Error::TooLarge {
                path: path.to_path_buf(),
                size_mb,
                limit_mb: self.upload_limit_mb,
            });
        }

        check_media_type(path);

        Ok(meta.len())
    }

    /// Validate a batch against per-file rules and the batch ceilings.
    ///
    /// `existing_count` is the number of documents already in managed storage.
    /// When only one file was requested and it is rejected, its own error is
    /// returned rather than [`Error::NothingAdmitted`].
    pub fn validate_batch(&self, paths: &[PathBuf], existing_count: usize) -> Result<ValidationReport> {
        if paths.is_empty() {
            return Err(Error::EmptyBatch);
        }

        let mut report = ValidationReport::default();
        let mut last_error = None;

        for path in paths {
            match self.validate_file(path) {
                Ok(size) => {
                    let size_mb = bytes_to_mb(size);
                    report.total_size_mb += size_mb;
                    report.valid.push(ValidFile {
                        path: path.clone(),
                        name: file_name(path),
                        size_mb,
                    });
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), reason = %e, "file rejected");
                    report.invalid.push(RejectedFile {
                        path: path.clone(),
                        name: file_name(path),
                        kind: e.kind(),
                        reason: e.to_string(),
                    });
                    last_error = Some(e);
                }
            }
        }

        if report.total_size_mb > self.upload_limit_mb {
            return Err(Error::QuotaExceeded {
                reason: format!(
                    "Total upload size ({:.1}MB) exceeds limit ({}MB)",
                    report.total_size_mb, self.upload_limit_mb
                ),
                report: Box::new(report),
            });
        }

        if existing_count + report.valid.len() > self.max_documents {
            return Err(Error::QuotaExceeded {
                reason: format!(
                    "Would exceed document limit ({}). Current: {}, Adding: {}",
                    self.max_documents,
                    existing_count,
                    report.valid.len()
                ),
                report: Box::new(report),
            });
        }

        if report.valid.is_empty() {
            return match last_error {
                Some(e) if paths.len() == 1 => Err(e),
                _ => Err(Error::NothingAdmitted {
                    report: Box::new(report),
                }),
            };
        }

        Ok(report)
    }
}

/// Lowercased extension with a leading dot, or `""` when there is none.
pub fn normalized_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub fn is_supported_extension(extension: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension)
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Guess a media type from the file's leading bytes.
pub fn detect_media_type(path: &Path) -> std::io::Result<&'static str> {
    let mut head = Vec::with_capacity(SNIFF_BYTES);
    File::open(path)?
        .take(SNIFF_BYTES as u64)
        .read_to_end(&mut head)?;
    Ok(sniff(&head))
}

fn sniff(head: &[u8]) -> &'static str {
    if head.starts_with(b"%PDF-") {
        return "application/pdf";
    }
    match std::str::from_utf8(head) {
        Ok(_) => "text/plain",
        // A multi-byte character cut off by the sniff window is still text.
        Err(e) if e.error_len().is_none() => "text/plain",
        Err(_) => "application/octet-stream",
    }
}

/// Warn when the sniffed type family differs from the extension's.
fn check_media_type(path: &Path) {
    let Some(expected) = mime_guess::from_path(path).first() else {
        return;
    };
    match detect_media_type(path) {
        Ok(detected) => {
            let family = detected.split('/').next().unwrap_or_default();
            if expected.type_().as_str() != family {
                tracing::warn!(
                    path = %path.display(),
                    expected = %expected,
                    detected,
                    "media type mismatch"
                );
            }
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not check media type");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn validator(limit_mb: f64, max_documents: usize) -> FileValidator {
        FileValidator::new(&AppConfig {
            name: "test".to_string(),
            upload_limit_mb: limit_mb,
            max_documents,
        })
    }

    fn write(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = validator(50.0, 10)
            .validate_file(&tmp.path().join("gone.txt"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn directory_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("notes.md");
        std::fs::create_dir(&dir).unwrap();
        let err = validator(50.0, 10).validate_file(&dir).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        let tmp = TempDir::new().unwrap();
        let v = validator(50.0, 10);
        let upper = write(tmp.path(), "NOTES.TXT", b"hello");
        assert_eq!(v.validate_file(&upper).unwrap(), 5);

        let docx = write(tmp.path(), "report.docx", b"PK");
        match v.validate_file(&docx).unwrap_err() {
            Error::UnsupportedType { extension, .. } => assert_eq!(extension, ".docx"),
            other => panic!("unexpected error: {other}"),
        }

        let bare = write(tmp.path(), "README", b"hi");
        assert!(matches!(
            v.validate_file(&bare).unwrap_err(),
            Error::UnsupportedType { .. }
        ));
    }

    #[test]
    fn oversized_file_rejected() {
        let tmp = TempDir::new().unwrap();
        // 0.001 MB is about 1048 bytes
        let v = validator(0.001, 10);
        let big = write(tmp.path(), "big.txt", &vec![b'a'; 4096]);
        assert!(matches!(
            v.validate_file(&big).unwrap_err(),
            Error::TooLarge { .. }
        ));
    }

    #[test]
    fn media_mismatch_is_advisory() {
        let tmp = TempDir::new().unwrap();
        let fake_pdf = write(tmp.path(), "fake.pdf", b"just some text");
        assert!(validator(50.0, 10).validate_file(&fake_pdf).is_ok());
        assert_eq!(detect_media_type(&fake_pdf).unwrap(), "text/plain");
    }

    #[test]
    fn sniffing() {
        assert_eq!(sniff(b"%PDF-1.4\n..."), "application/pdf");
        assert_eq!(sniff("héllo".as_bytes()), "text/plain");
        // "é" is two bytes; keep only the first
        assert_eq!(sniff(&"hé".as_bytes()[..2]), "text/plain");
        assert_eq!(sniff(&[0xff, 0xfe, 0x00, 0x41, 0x42]), "application/octet-stream");
    }

    #[test]
    fn batch_collects_breakdown() {
        let tmp = TempDir::new().unwrap();
        let a = write(tmp.path(), "a.txt", b"alpha");
        let b = write(tmp.path(), "b.csv", b"x,y");
        let c = tmp.path().join("c.md");
        let report = validator(50.0, 10)
            .validate_batch(&[a.clone(), b, c], 0)
            .unwrap();
        assert_eq!(report.valid.len(), 1);
        assert_eq!(report.valid[0].path, a);
        assert_eq!(report.invalid.len(), 2);
        assert_eq!(report.invalid[0].kind, "unsupported_type");
        assert_eq!(report.invalid[1].kind, "not_found");
    }

    #[test]
    fn batch_total_size_ceiling() {
        let tmp = TempDir::new().unwrap();
        // each file ~0.0006 MB, limit 0.001 MB: each passes, total does not
        let a = write(tmp.path(), "a.txt", &vec![b'a'; 600]);
        let b = write(tmp.path(), "b.txt", &vec![b'b'; 600]);
        let err = validator(0.001, 10).validate_batch(&[a, b], 0).unwrap_err();
        match err {
            Error::QuotaExceeded { reason, report } => {
                assert!(reason.contains("Total upload size"));
                assert_eq!(report.valid.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn batch_document_count_ceiling() {
        let tmp = TempDir::new().unwrap();
        let a = write(tmp.path(), "a.txt", b"a");
        let b = write(tmp.path(), "b.txt", b"b");
        let v = validator(50.0, 3);
        assert!(v.validate_batch(&[a.clone(), b.clone()], 1).is_ok());
        let err = v.validate_batch(&[a, b], 2).unwrap_err();
        assert_eq!(err.kind(), "quota_exceeded");
        assert!(err.to_string().contains("Current: 2, Adding: 2"));
    }

    #[test]
    fn empty_and_all_rejected_batches() {
        let tmp = TempDir::new().unwrap();
        let v = validator(50.0, 10);
        assert!(matches!(v.validate_batch(&[], 0), Err(Error::EmptyBatch)));

        let missing = tmp.path().join("x.txt");
        assert!(matches!(
            v.validate_batch(&[missing.clone()], 0),
            Err(Error::NotFound(_))
        ));

        let other = write(tmp.path(), "y.exe", b"MZ");
        match v.validate_batch(&[missing, other], 0).unwrap_err() {
            Error::NothingAdmitted { report } => assert_eq!(report.invalid.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
