//! Path utilities

use std::path::{Path, PathBuf};

/// Path helpers shared by the engine and actions
pub struct PathUtils;

impl PathUtils {
    /// Whether `path` already ends with `extension`, ignoring case
    pub fn has_extension(path: &Path, extension: &str) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
            .unwrap_or(false)
    }

    /// Replace the extension unless it already matches, ignoring case
    pub fn with_extension(path: &Path, extension: &str) -> PathBuf {
        if Self::has_extension(path, extension) {
            path.to_path_buf()
        } else {
            path.with_extension(extension)
        }
    }

    /// Hidden sibling used while a target is being written: `dir/.name.partial.ext`
    pub fn partial_sibling(target: &Path) -> PathBuf {
        let stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match target.extension() {
            Some(ext) => format!(".{}.partial.{}", stem, ext.to_string_lossy()),
            None => format!(".{}.partial", stem),
        };
        target.with_file_name(name)
    }

    /// Absolute form of a path without requiring it to exist
    pub fn absolute(path: &Path) -> PathBuf {
        std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
    }
}
