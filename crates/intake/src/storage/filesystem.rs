use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::StorageError;

/// Moves `src` to `dst`, replacing `dst` if it exists.
///
/// Tries `rename` first (atomic on one filesystem). Across devices it falls
/// back to copy + remove; if the remove fails the copy is deleted again so
/// the file never ends up in both places.
pub fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    let move_err = |e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    };

    std::fs::copy(src, dst).map_err(move_err)?;
    if let Err(e) = std::fs::remove_file(src) {
        if let Err(cleanup) = std::fs::remove_file(dst) {
            warn!(
                "Could not remove partial copy {}: {}",
                dst.display(),
                cleanup
            );
        }
        return Err(move_err(e));
    }
    Ok(())
}

/// Where the three artifacts of a successful job go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub output: PathBuf,
    pub report: PathBuf,
    pub archived: PathBuf,
}

/// A file written under a temporary name and renamed into place on commit.
///
/// Dropping it without committing removes the temporary file.
pub struct StagedFile {
    tmp: PathBuf,
    dest: PathBuf,
    writer: BufWriter<File>,
    committed: bool,
}

impl StagedFile {
    fn create(dest: &Path) -> Result<Self, StorageError> {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".to_string());
        let tmp = dest.with_file_name(format!(".{}.tmp", name));
        let file = File::create(&tmp).map_err(|e| StorageError::WriteFile {
            path: tmp.clone(),
            source: e,
        })?;
        Ok(Self {
            tmp,
            dest: dest.to_path_buf(),
            writer: BufWriter::new(file),
            committed: false,
        })
    }

    pub fn writer(&mut self) -> &mut BufWriter<File> {
        &mut self.writer
    }

    /// Flushes, syncs and renames the file over its destination.
    pub fn commit(mut self) -> Result<PathBuf, StorageError> {
        let tmp_err = |e| StorageError::WriteFile {
            path: self.tmp.clone(),
            source: e,
        };
        self.writer.flush().map_err(tmp_err)?;
        self.writer.get_ref().sync_all().map_err(tmp_err)?;

        std::fs::rename(&self.tmp, &self.dest).map_err(|e| StorageError::WriteFile {
            path: self.dest.clone(),
            source: e,
        })?;
        self.committed = true;
        Ok(self.dest.clone())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.tmp) {
                debug!("Could not remove {}: {}", self.tmp.display(), e);
            }
        }
    }
}

/// Owns the outbox and failed areas.
#[derive(Debug, Clone)]
pub struct FileStorage {
    outbox: PathBuf,
    failed: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(outbox: P, failed: Q) -> Self {
        Self {
            outbox: outbox.as_ref().to_path_buf(),
            failed: failed.as_ref().to_path_buf(),
        }
    }

    pub fn outbox(&self) -> &Path {
        &self.outbox
    }

    pub fn failed(&self) -> &Path {
        &self.failed
    }

    /// Artifact names for `filename`.
    ///
    /// Each name is derived from the whole filename, so `a.csv` and `a.tsv`
    /// never share an artifact:
    ///
    /// - output: `<stem>.cleaned.<ext>`, spelled with the source's own
    ///   extension when it matches `output_extension` ignoring case, else
    ///   `<stem>.<ext>.cleaned.<output_extension>`
    /// - report: `<filename>.report.json`
    /// - archived source: `<stem>.original[.<ext>]`
    pub fn artifact_paths(&self, filename: &str, output_extension: &str) -> ArtifactPaths {
        let path = Path::new(filename);
        let extension = path.extension().and_then(|e| e.to_str());
        let stem = match extension {
            Some(_) => path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| filename.to_string()),
            None => filename.to_string(),
        };

        let output_name = match extension {
            Some(ext) if ext.eq_ignore_ascii_case(output_extension) => {
                format!("{}.cleaned.{}", stem, ext)
            }
            Some(ext) => format!("{}.{}.cleaned.{}", stem, ext, output_extension),
            None => format!("{}.cleaned.{}", stem, output_extension),
        };
        let archived_name = match extension {
            Some(ext) => format!("{}.original.{}", stem, ext),
            None => format!("{}.original", stem),
        };

        ArtifactPaths {
            output: self.outbox.join(output_name),
            report: self.outbox.join(format!("{}.report.json", filename)),
            archived: self.outbox.join(archived_name),
        }
    }

    /// Opens a staged file that becomes `dest` on commit.
    pub fn stage(&self, dest: &Path) -> Result<StagedFile, StorageError> {
        if let Some(parent) = dest.parent() {
            self.ensure_directory(parent)?;
        }
        StagedFile::create(dest)
    }

    /// Writes `content` to `dest` through a staged file.
    pub fn write_atomic(&self, dest: &Path, content: &[u8]) -> Result<PathBuf, StorageError> {
        let mut staged = self.stage(dest)?;
        staged
            .writer()
            .write_all(content)
            .map_err(|e| StorageError::WriteFile {
                path: dest.to_path_buf(),
                source: e,
            })?;
        staged.commit()
    }

    /// Moves a processed source into the outbox.
    pub fn archive_success(&self, source: &Path, archived: &Path) -> Result<PathBuf, StorageError> {
        self.ensure_directory(&self.outbox)?;
        move_file(source, archived)?;
        Ok(archived.to_path_buf())
    }

    /// Moves a source that failed processing into the failed area, unmodified.
    pub fn archive_failure(&self, source: &Path, filename: &str) -> Result<PathBuf, StorageError> {
        self.ensure_directory(&self.failed)?;
        let dest = self.failed.join(filename);
        move_file(source, &dest)?;
        Ok(dest)
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}
