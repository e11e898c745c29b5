// Ports - Interface definitions (contracts)

use serde::Deserialize;

use crate::domain::model::Setting;
use crate::error::BfpuResult;

/// A named, pluggable unit of per-file work
pub trait Action: Send + Sync {
    /// Stable identifier used for selection and logging
    fn name(&self) -> &str;

    /// Run the action over every file matched by the setting
    fn run(&self, setting: &Setting) -> BfpuResult<()>;
}

/// A decoded unit handed from a grabber to a recorder
pub trait MediaUnit {
    /// Whether the unit carries a picture, as opposed to audio or metadata only
    fn has_image(&self) -> bool;
}

/// Source side of the codec engine boundary
pub trait FrameGrabber {
    type Unit: MediaUnit;

    /// Source cadence in frames per second
    fn frame_rate(&self) -> f64;

    /// Stream duration, `None` when the container does not report one
    fn length_in_seconds(&self) -> Option<f64>;

    /// Next decoded unit in source order, `None` at end of stream
    fn grab(&mut self) -> BfpuResult<Option<Self::Unit>>;
}

/// Target side of the codec engine boundary
pub trait FrameRecorder<U: MediaUnit> {
    /// Target cadence in frames per second
    fn frame_rate(&self) -> f64;

    fn record(&mut self, unit: &U) -> BfpuResult<()>;
}

/// Verbosity used for output that comes from outside the process
/// (child process output, codec engine messages)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLogLevel {
    #[default]
    Off,
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}
