// Domain models - Core types and data structures

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::engine::cancel::CancelToken;
use crate::error::{BfpuError, BfpuResult};

/// Session keys as read from configuration, before validation
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionProperties {
    pub actions: Vec<String>,
    pub source: Option<PathBuf>,
    pub destination: Option<PathBuf>,
    pub recursive: bool,
    pub glob: Option<String>,
    pub skip_on_existing_target: bool,
    pub fail_tolerant: bool,
    pub jobs: Option<usize>,
}

/// Validated, immutable configuration for one run
#[derive(Debug, Clone)]
pub struct Setting {
    source: PathBuf,
    destination: PathBuf,
    recursive: bool,
    glob: Option<String>,
    skip_on_existing_target: bool,
    fail_tolerant: bool,
    jobs: usize,
    action_names: Vec<String>,
    interrupt: CancelToken,
}

impl Setting {
    /// Validate properties into a setting.
    ///
    /// The source must exist and be a directory. A blank source is accepted
    /// only for help-only sessions and then means the current directory. The
    /// destination defaults to the current directory and is created if absent.
    pub fn from_properties(properties: SessionProperties, help_only: bool) -> BfpuResult<Self> {
        let action_names: Vec<String> = properties
            .actions
            .iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if action_names.is_empty() {
            return Err(BfpuError::Setting {
                name: "actions".to_string(),
                message: "no action specified".to_string(),
            });
        }

        let source = match non_blank_path(properties.source) {
            Some(path) => path,
            None if help_only => PathBuf::from("."),
            None => {
                return Err(BfpuError::Setting {
                    name: "source".to_string(),
                    message: "not specified".to_string(),
                })
            }
        };
        if !source.exists() {
            return Err(BfpuError::PathNotFound { path: source });
        }
        if !source.is_dir() {
            return Err(BfpuError::Path {
                path: source,
                message: "is not a directory".to_string(),
            });
        }
        let source = source.canonicalize()?;

        let destination =
            non_blank_path(properties.destination).unwrap_or_else(|| PathBuf::from("."));
        if destination.exists() && !destination.is_dir() {
            return Err(BfpuError::Path {
                path: destination,
                message: "is not a directory".to_string(),
            });
        }
        std::fs::create_dir_all(&destination).map_err(|e| BfpuError::TargetDirectory {
            path: destination.clone(),
            source: e,
        })?;
        let destination = destination.canonicalize()?;

        let glob = properties
            .glob
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty());

        let jobs = match properties.jobs {
            None => 1,
            Some(0) => num_cpus::get().max(1),
            Some(n) => n,
        };

        Ok(Self {
            source,
            destination,
            recursive: properties.recursive,
            glob,
            skip_on_existing_target: properties.skip_on_existing_target,
            fail_tolerant: properties.fail_tolerant,
            jobs,
            action_names,
            interrupt: CancelToken::new(),
        })
    }

    /// Attach the session-wide token set by a user interrupt
    pub fn with_interrupt(mut self, interrupt: CancelToken) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    pub fn glob(&self) -> Option<&str> {
        self.glob.as_deref()
    }

    pub fn skip_on_existing_target(&self) -> bool {
        self.skip_on_existing_target
    }

    pub fn fail_tolerant(&self) -> bool {
        self.fail_tolerant
    }

    /// Number of files processed concurrently; 1 means sequential
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn action_names(&self) -> &[String] {
        &self.action_names
    }

    pub fn interrupt(&self) -> &CancelToken {
        &self.interrupt
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "source={}, destination={}, recursive={}, glob={}, skip-on-existing-target={}, \
             fail-tolerant={}, jobs={}, actions=[{}]",
            self.source.display(),
            self.destination.display(),
            self.recursive,
            self.glob.as_deref().unwrap_or("<none>"),
            self.skip_on_existing_target,
            self.fail_tolerant,
            self.jobs,
            self.action_names.join(", ")
        )
    }
}

fn non_blank_path(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().is_empty() && !p.to_string_lossy().trim().is_empty())
}

/// A matched source file and where its output goes
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedFile {
    pub source: PathBuf,
    /// Path relative to the source root
    pub relative: PathBuf,
    /// Absolute path under the destination root
    pub target: PathBuf,
}

/// Stream properties read from an opened source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceInfo {
    pub has_video: bool,
    pub width: u32,
    pub height: u32,
    /// Sample aspect ratio, 0 when unknown
    pub aspect_ratio: f64,
    pub frame_rate: f64,
    pub length_in_seconds: Option<f64>,
    pub video_bitrate: usize,
    pub rotation: f64,
    pub audio_channels: u32,
    pub sample_rate: u32,
    pub audio_bitrate: usize,
    pub metadata: BTreeMap<String, String>,
    pub video_metadata: BTreeMap<String, String>,
    pub audio_metadata: BTreeMap<String, String>,
}

/// A codec requested by name, resolved against the codec engine per file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecRef {
    /// Encoder implementation name, e.g. `libx264`
    Encoder(String),
    /// Codec name from the engine's descriptor table, e.g. `H264`
    Codec(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f64,
    pub codec: Option<CodecRef>,
    pub bitrate: Option<usize>,
    pub quality: Option<f64>,
    pub frame_rate: f64,
    pub rotation: f64,
    pub options: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioSettings {
    pub channels: u32,
    pub codec: Option<CodecRef>,
    pub bitrate: Option<usize>,
    pub sample_rate: u32,
    pub options: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, String>,
}

/// Everything a recorder needs to open a target
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderSettings {
    pub format: Option<String>,
    pub options: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, String>,
    pub video: Option<VideoSettings>,
    pub audio: Option<AudioSettings>,
}
