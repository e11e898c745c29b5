//! BFPU Library
//!
//! Batch file processing: enumerate a source tree, apply named actions to
//! every matched file and mirror the results into a destination tree.

pub mod actions;
pub mod adapters;
pub mod app;
pub mod cli;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ports;
pub mod utils;

// Re-export commonly used types
pub use domain::model::{MatchedFile, SessionProperties, Setting};
pub use error::{BfpuError, BfpuResult};
pub use ports::{Action, FrameGrabber, FrameRecorder, MediaUnit};
