//! On-disk storage for uploads and produced PDFs.
//!
//! Two roots, one for uploads and one for outputs. Callers refer to files by
//! *logical name* only; [`FileStore::resolve`] is the single place where a
//! caller-supplied name becomes a path, and it refuses anything that could
//! leave its root before the filesystem is consulted.

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use strum::{AsRefStr, Display};
use tempfile::TempDir;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::converter::DocumentFormat;
use crate::error::ConversionError;

/// Longest logical name accepted (common filesystem limit).
const MAX_NAME_LEN: usize = 255;

/// Which of the two storage roots a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Root {
    Upload,
    Output,
}

/// A file that exists under one of the roots.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: PathBuf,
    pub logical_name: String,
    pub mtime: SystemTime,
    pub size: u64,
}

/// An accepted upload written under the upload root.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Unique storage name, `<stem>_<uuid>.<ext>`.
    pub storage_name: String,
    pub path: PathBuf,
    /// Name the client sent.
    pub original_name: String,
    pub format: DocumentFormat,
    pub size: u64,
}

/// File count and size of one root.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirStats {
    pub exists: bool,
    pub file_count: u64,
    pub total_size: u64,
    pub total_size_mb: f64,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    upload_root: PathBuf,
    output_root: PathBuf,
}

impl FileStore {
    pub fn new(upload_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            upload_root: upload_root.into(),
            output_root: output_root.into(),
        }
    }

    /// Create both roots if missing.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_root).await?;
        tokio::fs::create_dir_all(&self.output_root).await?;
        Ok(())
    }

    pub fn root(&self, root: Root) -> &Path {
        match root {
            Root::Upload => &self.upload_root,
            Root::Output => &self.output_root,
        }
    }

    /// Look up `logical_name` under `root`.
    ///
    /// Returns `InvalidName` for anything that is not a plain file name and
    /// `FileNotFound` when nothing (or something other than a regular file)
    /// lives there.
    pub async fn resolve(&self, logical_name: &str, root: Root) -> Result<StoredFile, ConversionError> {
        let path = resolve_in(self.root(root), logical_name)?;
        let not_found = || ConversionError::FileNotFound {
            name: logical_name.to_owned(),
        };
        let meta = match tokio::fs::symlink_metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(not_found()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        Ok(StoredFile {
            path,
            logical_name: logical_name.to_owned(),
            mtime: meta.modified()?,
            size: meta.len(),
        })
    }

    /// Validate and write an upload under a fresh unique storage name.
    pub async fn store_upload(
        &self,
        original_name: &str,
        content: &[u8],
    ) -> Result<StoredUpload, ConversionError> {
        let format = validate_upload(original_name, content)?;
        let storage_name = unique_storage_name(original_name, format);
        let path = self.upload_root.join(&storage_name);
        tokio::fs::write(&path, content).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "failed to write upload");
            ConversionError::Io(e)
        })?;
        info!(
            original_name,
            storage_name = %storage_name,
            size_bytes = content.len(),
            "saved upload"
        );
        Ok(StoredUpload {
            storage_name,
            path,
            original_name: original_name.to_owned(),
            format,
            size: content.len() as u64,
        })
    }

    /// A private directory under the output root for one engine run.
    ///
    /// Dot-prefixed, so it can never be addressed through [`Self::resolve`];
    /// removed when the returned guard drops.
    pub fn staging_dir(&self) -> Result<TempDir, ConversionError> {
        Ok(tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.output_root)?)
    }

    /// Move an engine product into the output root; returns its logical name.
    pub async fn promote_output(&self, produced: &Path) -> Result<String, ConversionError> {
        let name = produced
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ConversionError::failed("engine produced an unnamed file"))?
            .to_owned();
        validate_name(&name)?;
        let target = self.output_root.join(&name);
        tokio::fs::rename(produced, &target).await?;
        debug!(output = %target.display(), "output stored");
        Ok(name)
    }

    /// Number and total size of regular files directly under `root`.
    pub async fn dir_stats(&self, root: Root) -> DirStats {
        let dir = self.root(root);
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return DirStats::default(),
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "failed to read directory stats");
                return DirStats {
                    exists: true,
                    ..DirStats::default()
                };
            }
        };

        let mut stats = DirStats {
            exists: true,
            ..DirStats::default()
        };
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => match entry.metadata().await {
                    Ok(meta) if meta.is_file() => {
                        stats.file_count += 1;
                        stats.total_size += meta.len();
                    }
                    Ok(_) => {}
                    Err(e) => debug!(path = %entry.path().display(), error = %e, "skipping entry"),
                },
                Ok(None) => break,
                Err(e) => {
                    error!(dir = %dir.display(), error = %e, "failed to read directory stats");
                    break;
                }
            }
        }
        stats.total_size_mb = (stats.total_size as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;
        stats
    }
}

/// Reject unsupported extensions and empty bodies before anything touches
/// disk or the engine.
pub fn validate_upload(original_name: &str, content: &[u8]) -> Result<DocumentFormat, ConversionError> {
    let format = DocumentFormat::from_path(original_name)?;
    if content.is_empty() {
        return Err(ConversionError::EmptyFile);
    }
    Ok(format)
}

/// Check that `name` is a single plain path component.
pub fn validate_name(name: &str) -> Result<(), ConversionError> {
    let invalid = |reason| ConversionError::InvalidName {
        name: name.to_owned(),
        reason,
    };
    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name is too long"));
    }
    if name.contains('\0') {
        return Err(invalid("name contains a null byte"));
    }
    if name.contains(['/', '\\', ':']) {
        return Err(invalid("name contains a path separator"));
    }
    if name.starts_with('.') {
        return Err(invalid("name starts with a dot"));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid("name is not a plain file name")),
    }
}

/// Join a validated `logical_name` onto `root`.
///
/// The result is always a direct child of `root`; nothing on disk is read.
pub fn resolve_in(root: &Path, logical_name: &str) -> Result<PathBuf, ConversionError> {
    validate_name(logical_name)?;
    Ok(root.join(logical_name))
}

/// `<sanitised stem>_<uuid>.<ext>` for an upload named `original_name`.
pub fn unique_storage_name(original_name: &str, format: DocumentFormat) -> String {
    let stem = Path::new(original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize_stem)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "upload".to_owned());
    format!("{stem}_{}.{format}", Uuid::new_v4())
}

fn sanitize_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' { c } else { '_' })
        .collect();
    // Keep room for "_<uuid>.<ext>" under MAX_NAME_LEN.
    cleaned.trim_start_matches('.').chars().take(180).collect()
}
