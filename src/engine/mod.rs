//! File-processing engine shared by every action
//!
//! - [`cancel`] stops in-flight work on interrupt or fail-fast
//! - [`enumerator`] walks the source tree
//! - [`target`] mirrors source paths into the destination tree
//! - [`runner`] applies a per-file operation under the session's failure policy
//! - [`resampler`] converts frame cadence for the transcoding action

pub mod cancel;
pub mod enumerator;
pub mod resampler;
pub mod runner;
pub mod target;

pub use cancel::CancelToken;
pub use enumerator::FileEnumerator;
pub use resampler::{FrameResampler, ResampleMode, ResampleReport, UnitFailurePolicy};
pub use runner::{FileRunner, RunSummary};
pub use target::TargetMapper;
