//! Mirrors source paths into the destination tree

use std::path::{Path, PathBuf};

use crate::domain::model::MatchedFile;
use crate::error::{BfpuError, BfpuResult};
use crate::utils::path::PathUtils;

/// Maps a file under the source root to its counterpart under the destination
/// root, with an optional extension override.
#[derive(Debug, Clone)]
pub struct TargetMapper {
    source_root: PathBuf,
    destination_root: PathBuf,
    extension: Option<String>,
}

impl TargetMapper {
    pub fn new(source_root: impl Into<PathBuf>, destination_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            destination_root: destination_root.into(),
            extension: None,
        }
    }

    /// Replace target extensions with `extension`; blank means keep
    pub fn with_extension(mut self, extension: Option<&str>) -> Self {
        self.extension = extension
            .map(|e| e.trim().trim_start_matches('.').to_string())
            .filter(|e| !e.is_empty());
        self
    }

    /// Compute the matched record for a source file without touching disk
    pub fn map(&self, source: &Path) -> BfpuResult<MatchedFile> {
        let relative = source
            .strip_prefix(&self.source_root)
            .map_err(|_| BfpuError::Path {
                path: source.to_path_buf(),
                message: format!("is not under {}", self.source_root.display()),
            })?
            .to_path_buf();

        let mut target = self.destination_root.join(&relative);
        if let Some(extension) = &self.extension {
            target = PathUtils::with_extension(&target, extension);
        }

        Ok(MatchedFile {
            source: source.to_path_buf(),
            relative,
            target,
        })
    }

    /// Create the target's parent directories. Safe to call repeatedly and
    /// from several threads for the same directory.
    pub fn prepare(&self, matched: &MatchedFile) -> BfpuResult<()> {
        if let Some(parent) = matched.target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BfpuError::TargetDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}
