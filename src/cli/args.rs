//! Command-line argument definitions

use clap::Args;
use std::path::PathBuf;

use crate::domain::model::SessionProperties;

/// Session flags; each one wins over the configuration file
#[derive(Args, Debug, Default)]
pub struct SessionArgs {
    /// Source directory
    #[arg(short, long, env = "BFPU_SOURCE")]
    pub source: Option<PathBuf>,

    /// Destination directory (default: current directory)
    #[arg(short, long, env = "BFPU_DESTINATION")]
    pub destination: Option<PathBuf>,

    /// Descend into subdirectories
    #[arg(short, long, env = "BFPU_RECURSIVE")]
    pub recursive: bool,

    /// File-name glob, e.g. "*.mov"
    #[arg(short, long, env = "BFPU_GLOB")]
    pub glob: Option<String>,

    /// Skip files whose target already exists
    #[arg(long, env = "BFPU_SKIP_ON_EXISTING_TARGET")]
    pub skip_on_existing_target: bool,

    /// Log failing files and continue
    #[arg(long, env = "BFPU_FAIL_TOLERANT")]
    pub fail_tolerant: bool,

    /// Actions to run, in order
    #[arg(short, long, env = "BFPU_ACTIONS", value_delimiter = ',')]
    pub actions: Vec<String>,

    /// Files processed concurrently (0: one per CPU)
    #[arg(short, long, env = "BFPU_JOBS")]
    pub jobs: Option<usize>,
}

impl SessionArgs {
    /// Merge flags over properties read from configuration
    pub fn apply(self, mut properties: SessionProperties) -> SessionProperties {
        if !self.actions.is_empty() {
            properties.actions = self.actions;
        }
        if self.source.is_some() {
            properties.source = self.source;
        }
        if self.destination.is_some() {
            properties.destination = self.destination;
        }
        if self.glob.is_some() {
            properties.glob = self.glob;
        }
        if self.jobs.is_some() {
            properties.jobs = self.jobs;
        }
        properties.recursive |= self.recursive;
        properties.skip_on_existing_target |= self.skip_on_existing_target;
        properties.fail_tolerant |= self.fail_tolerant;
        properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_flags_win_over_file() {
        let file = SessionProperties {
            actions: vec!["help".to_string()],
            source: Some(PathBuf::from("from-file")),
            glob: Some("*.txt".to_string()),
            recursive: true,
            ..SessionProperties::default()
        };
        let cli = Cli::try_parse_from([
            "bfpu",
            "-s",
            "from-flag",
            "-a",
            "command-line,ffmpeg-converter",
            "--fail-tolerant",
        ])
        .unwrap();

        let merged = cli.session.apply(file);
        assert_eq!(merged.source, Some(PathBuf::from("from-flag")));
        assert_eq!(merged.actions, vec!["command-line", "ffmpeg-converter"]);
        assert_eq!(merged.glob.as_deref(), Some("*.txt"));
        assert!(merged.recursive);
        assert!(merged.fail_tolerant);
        assert!(!merged.skip_on_existing_target);
    }

    #[test]
    fn test_property_overrides_are_repeatable() {
        let cli = Cli::try_parse_from([
            "bfpu",
            "-D",
            "command-line.command=cp %source% %target%",
            "--property",
            "jobs=2",
        ])
        .unwrap();
        assert_eq!(
            cli.properties,
            vec!["command-line.command=cp %source% %target%", "jobs=2"]
        );
    }
}
