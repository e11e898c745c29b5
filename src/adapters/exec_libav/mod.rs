//! FFmpeg adapter using libav bindings
//!
//! Decoding and encoding go through `ffmpeg-next`. This module owns the codec
//! name table and resolution of configured codec names; [`grabber`] and
//! [`recorder`] implement the grab/record ports.

pub mod grabber;
pub mod recorder;

pub use grabber::{LibavGrabber, LibavUnit};
pub use recorder::LibavRecorder;

use ffmpeg_next::codec::{self, Id};
use ffmpeg_next::{encoder, ffi, Codec};
use std::collections::HashMap;
use std::ffi::CStr;
use std::sync::OnceLock;
use tracing::debug;

use crate::domain::model::CodecRef;
use crate::error::{BfpuError, BfpuResult};

static CODEC_TABLE: OnceLock<HashMap<String, Id>> = OnceLock::new();

/// Initialize the codec engine. Safe to call more than once.
pub fn init() -> BfpuResult<()> {
    ffmpeg_next::init().map_err(|e| BfpuError::media("init", e.to_string()))
}

/// Upper-cased codec name to codec id, built once from the engine's
/// descriptor list
pub fn codec_table() -> &'static HashMap<String, Id> {
    CODEC_TABLE.get_or_init(|| {
        let mut table = HashMap::new();
        let mut descriptor: *const ffi::AVCodecDescriptor = std::ptr::null();
        loop {
            // SAFETY: avcodec_descriptor_next walks a static table and returns
            // null past the last entry; names are static C strings.
            descriptor = unsafe { ffi::avcodec_descriptor_next(descriptor) };
            if descriptor.is_null() {
                break;
            }
            let (id, name) = unsafe {
                let d = &*descriptor;
                if d.name.is_null() {
                    continue;
                }
                (d.id, CStr::from_ptr(d.name).to_string_lossy().to_ascii_uppercase())
            };
            table.insert(name, Id::from(id));
        }
        debug!("Codec table holds {} names", table.len());
        table
    })
}

/// Look up a codec id by name, ignoring case
pub fn codec_id(name: &str) -> Option<Id> {
    codec_table().get(&name.trim().to_ascii_uppercase()).copied()
}

/// Resolve a configured codec to an encoder
pub fn resolve_encoder(codec_ref: &CodecRef) -> BfpuResult<Codec> {
    match codec_ref {
        CodecRef::Encoder(name) => {
            encoder::find_by_name(name.trim()).ok_or_else(|| {
                BfpuError::media("codec lookup", format!("encoder \"{}\" is not registered", name))
            })
        }
        CodecRef::Codec(name) => {
            let id = codec_id(name).ok_or_else(|| {
                BfpuError::media("codec lookup", format!("codec \"{}\" is not found", name))
            })?;
            encoder::find(id).ok_or_else(|| {
                BfpuError::media(
                    "codec lookup",
                    format!("codec \"{}\" has no registered encoder", name),
                )
            })
        }
    }
}

/// Encoder for a media type when none is configured: the container's default
pub fn default_encoder(
    output: &ffmpeg_next::format::context::Output,
    path: &std::path::Path,
    medium: ffmpeg_next::media::Type,
) -> BfpuResult<Codec> {
    let id = output.format().codec(&path, medium);
    if id == codec::Id::None {
        return Err(BfpuError::media(
            "codec lookup",
            format!("container has no default {:?} codec", medium),
        ));
    }
    encoder::find(id).ok_or_else(|| {
        BfpuError::media("codec lookup", format!("no encoder for default codec {:?}", id))
    })
}
