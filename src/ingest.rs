//! Managed document storage.
//!
//! [`IngestionService`] owns `storage.data_path`. Admitted files are copied
//! into it under their original name (with a `_N` suffix on name
//! collisions), and a registry maps every managed path to its content
//! fingerprint so byte-identical uploads resolve to the copy already held.
//!
//! The registry is rebuilt by scanning managed storage when the service is
//! constructed. One mutex guards the registry together with every mutation
//! of the storage directory.
//!
//! # Batch semantics
//!
//! ```text
//! paths ──▶ FileValidator (per file + batch ceilings) ──▶ dedupe / copy each
//!              │ ceiling violated                           │ copy failed
//!              ▼                                            ▼
//!        whole batch rejected                    file logged and excluded
//! ```

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use walkdir::WalkDir;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::fingerprint::{fingerprint_file, matches};
use crate::models::{bytes_to_mb, Document};
use crate::validate::{
    file_name, normalized_extension, is_supported_extension, FileValidator, RejectedFile,
    ValidationReport, SUPPORTED_EXTENSIONS,
};

/// Directories never descended into during directory discovery.
const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    /// Copied into managed storage.
    Copied,
    /// Same bytes already managed; no copy made.
    Duplicate,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdmittedFile {
    pub source: PathBuf,
    pub managed_path: PathBuf,
    pub admission: Admission,
}

/// Outcome of a successful ingestion call.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub message: String,
    pub admitted: Vec<AdmittedFile>,
    /// Files that passed validation but could not be copied.
    pub copy_failures: Vec<RejectedFile>,
    pub validation: ValidationReport,
}

impl IngestReport {
    /// Managed paths for every admitted file, first occurrence only.
    pub fn admitted_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = Vec::new();
        for file in &self.admitted {
            if !paths.contains(&file.managed_path) {
                paths.push(file.managed_path.clone());
            }
        }
        paths
    }

    /// Managed paths of the fresh copies made by this call.
    pub fn new_paths(&self) -> Vec<PathBuf> {
        self.admitted
            .iter()
            .filter(|f| f.admission == Admission::Copied)
            .map(|f| f.managed_path.clone())
            .collect()
    }

    /// Files rejected by validation.
    pub fn rejected(&self) -> &[RejectedFile] {
        &self.validation.invalid
    }

    pub fn total_size_mb(&self) -> f64 {
        self.validation.total_size_mb
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestStats {
    pub total_files: usize,
    pub total_size_mb: f64,
    pub type_breakdown: BTreeMap<String, usize>,
    pub data_path: PathBuf,
    pub max_files: usize,
    pub max_size_mb: f64,
}

pub struct IngestionService {
    data_path: PathBuf,
    validator: FileValidator,
    include: GlobSet,
    exclude: GlobSet,
    registry: Mutex<BTreeMap<PathBuf, String>>,
}

impl IngestionService {
    /// Create managed storage if needed and fingerprint what it already holds.
    pub fn new(data_path: &Path, app: &AppConfig) -> Result<Self> {
        std::fs::create_dir_all(data_path).map_err(|e| Error::io(data_path, e))?;
        let data_path = data_path
            .canonicalize()
            .map_err(|e| Error::io(data_path, e))?;

        let include_patterns: Vec<String> = SUPPORTED_EXTENSIONS
            .iter()
            .map(|ext| format!("**/*{}", ext))
            .collect();
        let exclude_patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect();

        let registry = scan_registry(&data_path);
        tracing::info!(
            data_path = %data_path.display(),
            files = registry.len(),
            "managed storage scanned"
        );

        Ok(Self {
            validator: FileValidator::new(app),
            include: build_globset(&include_patterns)?,
            exclude: build_globset(&exclude_patterns)?,
            registry: Mutex::new(registry),
            data_path,
        })
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Number of files tracked in the registry.
    pub fn registry_len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, String>> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Validate a batch and copy every admitted file into managed storage.
    ///
    /// Batch ceilings are checked before anything is copied. A file whose
    /// bytes are already managed resolves to the existing path. A failed copy
    /// excludes only that file, unless no file could be admitted at all.
    pub fn validate_and_ingest(&self, paths: &[PathBuf]) -> Result<IngestReport> {
        let mut registry = self.lock();

        let validation = self.validator.validate_batch(paths, registry.len())?;
        tracing::info!("{}", validation.summary());

        let mut admitted = Vec::new();
        let mut copy_failures = Vec::new();
        let mut last_error = None;

        for file in &validation.valid {
            match self.admit(&mut registry, &file.path) {
                Ok(entry) => admitted.push(entry),
                Err(e) => {
                    tracing::error!(file = %file.path.display(), error = %e, "error copying file");
                    copy_failures.push(RejectedFile {
                        path: file.path.clone(),
                        name: file.name.clone(),
                        kind: e.kind(),
                        reason: e.to_string(),
                    });
                    last_error = Some(e);
                }
            }
        }

        if admitted.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        Ok(IngestReport {
            message: format!("Successfully ingested {} files", admitted.len()),
            admitted,
            copy_failures,
            validation,
        })
    }

    /// Dedupe-or-copy one validated file. Leaves no partial copy behind.
    fn admit(&self, registry: &mut BTreeMap<PathBuf, String>, source: &Path) -> Result<AdmittedFile> {
        let fingerprint = fingerprint_file(source);

        if let Some(existing) = registry
            .iter()
            .find(|(_, hash)| matches(&fingerprint, hash))
            .map(|(path, _)| path.clone())
        {
            tracing::warn!(
                file = %file_name(source),
                existing = %file_name(&existing),
                "duplicate file detected"
            );
            return Ok(AdmittedFile {
                source: source.to_path_buf(),
                managed_path: existing,
                admission: Admission::Duplicate,
            });
        }

        let destination = self.free_destination(source);
        if let Err(e) = std::fs::copy(source, &destination) {
            let _ = std::fs::remove_file(&destination);
            return Err(Error::io(source, e));
        }

        tracing::info!(
            file = %file_name(source),
            managed = %file_name(&destination),
            "copied into managed storage"
        );
        registry.insert(destination.clone(), fingerprint);

        Ok(AdmittedFile {
            source: source.to_path_buf(),
            managed_path: destination,
            admission: Admission::Copied,
        })
    }

    /// `name.ext`, then `name_1.ext`, `name_2.ext`, ... until unused.
    fn free_destination(&self, source: &Path) -> PathBuf {
        let candidate = self.data_path.join(file_name(source));
        if !candidate.exists() {
            return candidate;
        }

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let suffix = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        (1..)
            .map(|n| self.data_path.join(format!("{}_{}{}", stem, n, suffix)))
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }

    /// Ingest every supported file found under `dir`.
    pub fn ingest_from_directory(&self, dir: &Path) -> Result<IngestReport> {
        if !dir.is_dir() {
            return Err(Error::InvalidDirectory(dir.to_path_buf()));
        }

        let files = self.discover(dir);
        if files.is_empty() {
            return Err(Error::NoSupportedFiles(dir.to_path_buf()));
        }
        tracing::info!(dir = %dir.display(), found = files.len(), "discovered files");

        let mut report = self.validate_and_ingest(&files)?;
        report.message = format!(
            "Successfully ingested {} files from folder",
            report.admitted.len()
        );
        Ok(report)
    }

    /// Supported files under `dir`, sorted, skipping excluded directories.
    fn discover(&self, dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(dir).unwrap_or(path);
            if self.exclude.is_match(relative) || !self.include.is_match(relative) {
                continue;
            }
            files.push(path.to_path_buf());
        }
        files.sort();
        files
    }

    /// Managed files, most recently modified first.
    pub fn list_managed_files(&self) -> Vec<Document> {
        let registry = self.lock();
        let mut documents: Vec<Document> = registry
            .iter()
            .filter_map(|(path, fingerprint)| match std::fs::metadata(path) {
                Ok(meta) => Some(Document {
                    path: path.clone(),
                    name: file_name(path),
                    extension: normalized_extension(path),
                    size_bytes: meta.len(),
                    fingerprint: fingerprint.clone(),
                    modified: meta
                        .modified()
                        .map(chrono::DateTime::from)
                        .unwrap_or_default(),
                }),
                Err(e) => {
                    tracing::error!(file = %path.display(), error = %e, "error reading file info");
                    None
                }
            })
            .collect();

        documents.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        documents
    }

    /// Delete one managed file.
    ///
    /// Returns `false` (and deletes nothing) when `path` does not resolve to
    /// a file inside managed storage or the delete fails.
    pub fn remove_file(&self, path: &Path) -> bool {
        let mut registry = self.lock();

        let resolved = match path.canonicalize() {
            Ok(p) if p.is_file() && p.starts_with(&self.data_path) => p,
            _ => {
                tracing::error!(file = %path.display(), "file not found or not in managed storage");
                return false;
            }
        };

        match std::fs::remove_file(&resolved) {
            Ok(()) => {
                registry.remove(&resolved);
                tracing::info!(file = %file_name(&resolved), "removed file");
                true
            }
            Err(e) => {
                tracing::error!(file = %resolved.display(), error = %e, "error removing file");
                false
            }
        }
    }

    /// Delete everything in managed storage and start over empty.
    pub fn clear_all(&self) -> Result<()> {
        let mut registry = self.lock();
        if self.data_path.exists() {
            std::fs::remove_dir_all(&self.data_path).map_err(|e| Error::io(&self.data_path, e))?;
        }
        std::fs::create_dir_all(&self.data_path).map_err(|e| Error::io(&self.data_path, e))?;
        registry.clear();
        tracing::info!("cleared all managed files");
        Ok(())
    }

    pub fn stats(&self) -> IngestStats {
        let files = self.list_managed_files();
        let mut type_breakdown = BTreeMap::new();
        for doc in &files {
            *type_breakdown.entry(doc.extension.clone()).or_insert(0) += 1;
        }

        IngestStats {
            total_files: files.len(),
            total_size_mb: bytes_to_mb(files.iter().map(|d| d.size_bytes).sum()),
            type_breakdown,
            data_path: self.data_path.clone(),
            max_files: self.validator.max_documents(),
            max_size_mb: self.validator.upload_limit_mb(),
        }
    }
}

/// Fingerprint every supported file under managed storage.
fn scan_registry(root: &Path) -> BTreeMap<PathBuf, String> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| is_supported_extension(&normalized_extension(entry.path())))
        .map(|entry| {
            let path = entry.into_path();
            let fingerprint = fingerprint_file(&path);
            (path, fingerprint)
        })
        .collect()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let invalid = |pattern: &str, e: globset::Error| {
        Error::io(
            pattern,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
        )
    };

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| invalid(pattern, e))?;
        builder.add(glob);
    }
    builder.build().map_err(|e| invalid("globset", e))
}
