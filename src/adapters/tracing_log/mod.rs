// Tracing log adapter - Routes external output through tracing

use ffmpeg_next::ffi;
use ffmpeg_next::util::log;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use tracing::{debug, error, info, trace, warn};

use crate::ports::OutputLogLevel;

/// Target of events emitted for codec engine messages
pub const FFMPEG_TARGET: &str = "bfpu::ffmpeg";

// The engine declares its callback with a `va_list`, which bindgen lowers to a
// pointer where the platform type is an array.
#[cfg(all(target_arch = "x86_64", not(windows)))]
type VaList = *mut ffi::__va_list_tag;
#[cfg(not(all(target_arch = "x86_64", not(windows))))]
type VaList = ffi::va_list;

const LINE_CAPACITY: usize = 1024;

/// Forwards lines produced outside the process (child output, codec engine
/// messages) to tracing at a configured level.
#[derive(Debug, Clone, Copy)]
pub struct TracingLogAdapter {
    level: OutputLogLevel,
}

impl TracingLogAdapter {
    pub fn new(level: OutputLogLevel) -> Self {
        Self { level }
    }

    pub fn is_enabled(&self) -> bool {
        self.level != OutputLogLevel::Off
    }

    /// Convert output level to the codec engine's own log level
    pub fn to_ffmpeg_level(level: OutputLogLevel) -> log::Level {
        match level {
            OutputLogLevel::Off => log::Level::Quiet,
            OutputLogLevel::Trace => log::Level::Trace,
            OutputLogLevel::Debug => log::Level::Verbose,
            OutputLogLevel::Info => log::Level::Info,
            OutputLogLevel::Warn => log::Level::Warning,
            OutputLogLevel::Error => log::Level::Error,
        }
    }

    /// Limit the codec engine to the configured level and send what remains
    /// through tracing instead of raw stderr.
    pub fn apply_to_ffmpeg(&self) {
        log::set_level(Self::to_ffmpeg_level(self.level));
        unsafe {
            ffi::av_log_set_callback(Some(forward_ffmpeg_message));
        }
    }

    /// Emit one line of external output tagged with its origin
    pub fn emit(&self, origin: &str, line: &str) {
        match self.level {
            OutputLogLevel::Off => {}
            OutputLogLevel::Trace => trace!(origin, "{}", line),
            OutputLogLevel::Debug => debug!(origin, "{}", line),
            OutputLogLevel::Info => info!(origin, "{}", line),
            OutputLogLevel::Warn => warn!(origin, "{}", line),
            OutputLogLevel::Error => error!(origin, "{}", line),
        }
    }
}

/// Emit one codec engine message at the tracing level matching its own
pub fn emit_ffmpeg_message(level: c_int, message: &str) {
    let message = message.trim_end();
    if message.is_empty() {
        return;
    }
    match log::Level::try_from(level) {
        Ok(log::Level::Quiet | log::Level::Panic | log::Level::Fatal | log::Level::Error) => {
            error!(target: FFMPEG_TARGET, "{}", message)
        }
        Ok(log::Level::Warning) => warn!(target: FFMPEG_TARGET, "{}", message),
        Ok(log::Level::Info) => info!(target: FFMPEG_TARGET, "{}", message),
        Ok(log::Level::Verbose | log::Level::Debug) => debug!(target: FFMPEG_TARGET, "{}", message),
        Ok(log::Level::Trace) | Err(_) => trace!(target: FFMPEG_TARGET, "{}", message),
    }
}

unsafe extern "C" fn forward_ffmpeg_message(
    context: *mut c_void,
    level: c_int,
    format: *const c_char,
    arguments: VaList,
) {
    if level > ffi::av_log_get_level() {
        return;
    }
    let mut line = [0 as c_char; LINE_CAPACITY];
    let mut print_prefix: c_int = 1;
    ffi::av_log_format_line(
        context,
        level,
        format,
        arguments,
        line.as_mut_ptr(),
        LINE_CAPACITY as c_int,
        &mut print_prefix,
    );
    let message = CStr::from_ptr(line.as_ptr()).to_string_lossy();
    emit_ffmpeg_message(level, &message);
}
