// Adapters - External system implementations

pub mod exec_libav;
pub mod toml_config;
pub mod tracing_log;

// Re-export adapters
pub use exec_libav::{LibavGrabber, LibavRecorder};
pub use toml_config::TomlConfig;
pub use tracing_log::TracingLogAdapter;
