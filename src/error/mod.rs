//! Error handling module for BFPU
//!
//! Variants follow the failure classes of a session: configuration errors stop
//! the run before any work, enumeration errors abort the current action, and
//! per-file causes are either logged (fail-tolerant) or wrapped in
//! [`BfpuError::FileFailed`] and propagated.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for BFPU operations
#[derive(Error, Debug)]
pub enum BfpuError {
    /// Invalid or missing session setting
    #[error("Setting \"{name}\": {message}")]
    Setting { name: String, message: String },

    /// A configured path that exists but is unusable
    #[error("Path \"{}\": {message}", path.display())]
    Path { path: PathBuf, message: String },

    /// A configured path that does not exist
    #[error("Path \"{}\": does not exist", path.display())]
    PathNotFound { path: PathBuf },

    /// Configuration file or property override error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Requested action has no registered factory
    #[error("Action \"{action}\": not found")]
    ActionNotFound { action: String },

    /// Action property missing or malformed
    #[error("Action \"{action}\": property/argument \"{property}\": {message}")]
    ActionProperty {
        action: String,
        property: String,
        message: String,
    },

    /// Action failed before processing any file
    #[error("Action \"{action}\": {message}")]
    ActionRun { action: String, message: String },

    /// Per-file failure wrapped with the action and both paths
    #[error(
        "Action \"{action}\": failed on \"{}\" (target \"{}\")",
        source_path.display(),
        target_path.display()
    )]
    FileFailed {
        action: String,
        source_path: PathBuf,
        target_path: PathBuf,
        #[source]
        source: Box<BfpuError>,
    },

    /// Source listing failure, fatal for the action in every mode
    #[error("Action \"{action}\": cannot list source files")]
    SourceWalk {
        action: String,
        #[source]
        source: Box<BfpuError>,
    },

    /// Session stopped by a user interrupt
    #[error("Action \"{action}\": interrupted")]
    Interrupted { action: String },

    /// Per-file work abandoned after cancellation
    #[error("Cancelled")]
    Cancelled,

    /// Directory walk failure
    #[error("Failed to enumerate \"{}\": {source}", path.display())]
    Enumeration {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// Invalid file-name glob
    #[error("Invalid glob \"{pattern}\": {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// Target directory could not be created
    #[error("Path \"{}\": failed to create directory: {source}", path.display())]
    TargetDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// External command could not be started
    #[error("Command \"{command}\" failed to start: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// External command exited with a failure status
    #[error("Command \"{command}\" exited with code {code}")]
    CommandExit { command: String, code: i32 },

    /// Codec engine failure during grab or record
    #[error("Media {operation} failed: {message}")]
    Media {
        operation: &'static str,
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// FFmpeg error
    #[error("FFmpeg error: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),
}

impl BfpuError {
    pub fn media(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Media {
            operation,
            message: message.into(),
        }
    }

    pub fn property(
        action: impl Into<String>,
        property: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ActionProperty {
            action: action.into(),
            property: property.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for BFPU operations
pub type BfpuResult<T> = std::result::Result<T, BfpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_action_and_paths() {
        let err = BfpuError::FileFailed {
            action: "command-line".into(),
            source_path: PathBuf::from("/in/a.txt"),
            target_path: PathBuf::from("/out/a.txt"),
            source: Box::new(BfpuError::CommandExit {
                command: "false".into(),
                code: 1,
            }),
        };
        let text = err.to_string();
        assert!(text.starts_with("Action \"command-line\""));
        assert!(text.contains("/in/a.txt"));
        assert!(text.contains("/out/a.txt"));
        assert!(!text.contains("exited with code"));

        let cause = std::error::Error::source(&err).unwrap();
        assert_eq!(cause.to_string(), "Command \"false\" exited with code 1");
    }

    #[test]
    fn source_walk_names_action() {
        let err = BfpuError::SourceWalk {
            action: "command-line".into(),
            source: Box::new(BfpuError::PathNotFound {
                path: PathBuf::from("/in"),
            }),
        };
        assert_eq!(
            err.to_string(),
            "Action \"command-line\": cannot list source files"
        );
        assert!(std::error::Error::source(&err)
            .unwrap()
            .to_string()
            .contains("/in"));
    }

    #[test]
    fn not_found_message() {
        let err = BfpuError::ActionNotFound {
            action: "nope".into(),
        };
        assert_eq!(err.to_string(), "Action \"nope\": not found");
        assert_eq!(
            BfpuError::media("grab", "eof").to_string(),
            "Media grab failed: eof"
        );
    }

    #[test]
    fn property_error_format() {
        let err = BfpuError::property("command-line", "command", "not specified");
        assert_eq!(
            err.to_string(),
            "Action \"command-line\": property/argument \"command\": not specified"
        );
    }
}
