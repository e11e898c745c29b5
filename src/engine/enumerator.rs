//! Lazy enumeration of the regular files under a source root

use globset::{GlobBuilder, GlobMatcher};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{BfpuError, BfpuResult};

/// Walks a source root and yields regular files whose name matches an
/// optional glob.
///
/// Depth is unbounded when recursive, otherwise only direct children are
/// visited. Directories and symbolic links are never yielded.
#[derive(Debug, Clone)]
pub struct FileEnumerator {
    root: PathBuf,
    recursive: bool,
    matcher: Option<GlobMatcher>,
}

impl FileEnumerator {
    pub fn new(root: impl Into<PathBuf>, recursive: bool, glob: Option<&str>) -> BfpuResult<Self> {
        let matcher = match glob.map(str::trim).filter(|g| !g.is_empty()) {
            Some(pattern) => Some(
                GlobBuilder::new(pattern)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| BfpuError::Glob {
                        pattern: pattern.to_string(),
                        source: e,
                    })?
                    .compile_matcher(),
            ),
            None => None,
        };

        Ok(Self {
            root: root.into(),
            recursive,
            matcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a file name passes the glob
    pub fn matches_name(&self, path: &Path) -> bool {
        match (&self.matcher, path.file_name()) {
            (None, _) => true,
            (Some(matcher), Some(name)) => matcher.is_match(name),
            (Some(_), None) => false,
        }
    }

    /// Single-pass sequence of matching files; walk failures are yielded as
    /// errors in place.
    pub fn files(&self) -> impl Iterator<Item = BfpuResult<PathBuf>> + Send + '_ {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && self.matches_name(entry.path()) {
                        Some(Ok(entry.into_path()))
                    } else {
                        None
                    }
                }
                Err(e) => Some(Err(BfpuError::Enumeration {
                    path: e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone()),
                    source: e,
                })),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("a.txt"), b"a").unwrap();
        fs::write(root.join("b.log"), b"b").unwrap();
        fs::create_dir_all(root.join("sub").join("deeper")).unwrap();
        fs::write(root.join("sub").join("c.txt"), b"c").unwrap();
        fs::write(root.join("sub").join("deeper").join("d.txt"), b"d").unwrap();
        fs::create_dir(root.join("dir.txt")).unwrap();
        temp
    }

    fn names(enumerator: &FileEnumerator) -> Vec<String> {
        enumerator
            .files()
            .map(|p| {
                p.unwrap()
                    .strip_prefix(enumerator.root())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn test_non_recursive_yields_direct_children_only() {
        let temp = tree();
        let enumerator = FileEnumerator::new(temp.path(), false, None).unwrap();
        assert_eq!(names(&enumerator), vec!["a.txt", "b.log"]);
    }

    #[test]
    fn test_recursive_yields_every_regular_file() {
        let temp = tree();
        let enumerator = FileEnumerator::new(temp.path(), true, None).unwrap();
        assert_eq!(
            names(&enumerator),
            vec!["a.txt", "b.log", "sub/c.txt", "sub/deeper/d.txt"]
        );
    }

    #[test]
    fn test_glob_matches_file_name_and_skips_directories() {
        let temp = tree();
        let enumerator = FileEnumerator::new(temp.path(), true, Some("*.txt")).unwrap();
        assert_eq!(
            names(&enumerator),
            vec!["a.txt", "sub/c.txt", "sub/deeper/d.txt"]
        );
    }

    #[test]
    fn test_blank_glob_matches_everything() {
        let temp = tree();
        let enumerator = FileEnumerator::new(temp.path(), false, Some("  ")).unwrap();
        assert_eq!(names(&enumerator).len(), 2);
    }

    #[test]
    fn test_invalid_glob_is_rejected() {
        let temp = tree();
        let err = FileEnumerator::new(temp.path(), false, Some("[a-")).unwrap_err();
        assert!(matches!(err, BfpuError::Glob { .. }));
    }

    #[test]
    fn test_missing_root_surfaces_enumeration_error() {
        let temp = TempDir::new().unwrap();
        let enumerator = FileEnumerator::new(temp.path().join("gone"), true, None).unwrap();
        let first = enumerator.files().next().unwrap();
        assert!(matches!(first, Err(BfpuError::Enumeration { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_yielded() {
        let temp = tree();
        std::os::unix::fs::symlink(temp.path().join("a.txt"), temp.path().join("link.txt"))
            .unwrap();
        let enumerator = FileEnumerator::new(temp.path(), false, Some("*.txt")).unwrap();
        assert_eq!(names(&enumerator), vec!["a.txt"]);
    }
}
