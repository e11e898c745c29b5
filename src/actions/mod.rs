//! Built-in actions, each applied to every matched file of a session

pub mod command_line;
pub mod ffmpeg_converter;
pub mod unimplemented;

pub use command_line::CommandLineAction;
pub use ffmpeg_converter::FfmpegConverterAction;
pub use unimplemented::UnimplementedAction;

pub const DEDUPLICATE_BY_SIZE: &str = "deduplicate-by-size";
pub const HELP: &str = "help";
