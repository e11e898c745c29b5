//! Decoding side of the FFmpeg adapter

use ffmpeg_next::codec::{self, Parameters};
use ffmpeg_next::format::context::Input;
use ffmpeg_next::util::frame;
use ffmpeg_next::{ffi, media, DictionaryRef, Packet};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use crate::domain::model::SourceInfo;
use crate::error::{BfpuError, BfpuResult};
use crate::ports::{FrameGrabber, MediaUnit};

/// A decoded unit: a picture or a block of audio samples
pub enum LibavUnit {
    Image(frame::Video),
    Samples(frame::Audio),
}

impl MediaUnit for LibavUnit {
    fn has_image(&self) -> bool {
        matches!(self, LibavUnit::Image(_))
    }
}

struct VideoInput {
    index: usize,
    decoder: codec::decoder::Video,
}

struct AudioInput {
    index: usize,
    decoder: codec::decoder::Audio,
}

/// Reads the best video and audio streams of a file and yields decoded units
/// in demux order.
pub struct LibavGrabber {
    input: Input,
    video: Option<VideoInput>,
    audio: Option<AudioInput>,
    pending: VecDeque<LibavUnit>,
    drained: bool,
    info: SourceInfo,
}

impl LibavGrabber {
    pub fn open(path: &Path) -> BfpuResult<Self> {
        let input = ffmpeg_next::format::input(&path)
            .map_err(|e| BfpuError::media("open input", e.to_string()))?;

        let mut info = SourceInfo {
            length_in_seconds: length_in_seconds(input.duration()),
            metadata: to_map(input.metadata()),
            ..SourceInfo::default()
        };

        let video = match input.streams().best(media::Type::Video) {
            Some(stream) => {
                let decoder = codec::context::Context::from_parameters(stream.parameters())
                    .and_then(|context| context.decoder().video())
                    .map_err(|e| BfpuError::media("open video decoder", e.to_string()))?;

                let metadata = to_map(stream.metadata());
                info.has_video = true;
                info.width = decoder.width();
                info.height = decoder.height();
                info.aspect_ratio = ratio_to_f64(decoder.aspect_ratio());
                info.frame_rate = ratio_to_f64(stream.avg_frame_rate());
                if info.frame_rate <= 0.0 {
                    info.frame_rate = ratio_to_f64(stream.rate());
                }
                info.video_bitrate = decoder.bit_rate();
                info.rotation = metadata
                    .get("rotate")
                    .and_then(|r| r.parse::<f64>().ok())
                    .unwrap_or(0.0);
                info.video_metadata = metadata;

                Some(VideoInput {
                    index: stream.index(),
                    decoder,
                })
            }
            None => None,
        };

        let audio = match input.streams().best(media::Type::Audio) {
            Some(stream) => {
                let channels = channel_count(&stream.parameters());
                let decoder = codec::context::Context::from_parameters(stream.parameters())
                    .and_then(|context| context.decoder().audio())
                    .map_err(|e| BfpuError::media("open audio decoder", e.to_string()))?;

                info.audio_channels = channels;
                info.sample_rate = decoder.rate();
                info.audio_bitrate = decoder.bit_rate();
                info.audio_metadata = to_map(stream.metadata());

                Some(AudioInput {
                    index: stream.index(),
                    decoder,
                })
            }
            None => None,
        };

        Ok(Self {
            input,
            video,
            audio,
            pending: VecDeque::new(),
            drained: false,
            info,
        })
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn decode(&mut self, packet: &Packet) -> BfpuResult<()> {
        let stream = packet.stream();
        if let Some(video) = self.video.as_mut().filter(|v| v.index == stream) {
            video
                .decoder
                .send_packet(packet)
                .map_err(|e| BfpuError::media("decode video", e.to_string()))?;
            drain_video(&mut video.decoder, &mut self.pending);
        } else if let Some(audio) = self.audio.as_mut().filter(|a| a.index == stream) {
            audio
                .decoder
                .send_packet(packet)
                .map_err(|e| BfpuError::media("decode audio", e.to_string()))?;
            drain_audio(&mut audio.decoder, &mut self.pending);
        }
        Ok(())
    }

    fn flush(&mut self) -> BfpuResult<()> {
        if let Some(video) = self.video.as_mut() {
            video
                .decoder
                .send_eof()
                .map_err(|e| BfpuError::media("flush video", e.to_string()))?;
            drain_video(&mut video.decoder, &mut self.pending);
        }
        if let Some(audio) = self.audio.as_mut() {
            audio
                .decoder
                .send_eof()
                .map_err(|e| BfpuError::media("flush audio", e.to_string()))?;
            drain_audio(&mut audio.decoder, &mut self.pending);
        }
        Ok(())
    }
}

impl FrameGrabber for LibavGrabber {
    type Unit = LibavUnit;

    fn frame_rate(&self) -> f64 {
        self.info.frame_rate
    }

    fn length_in_seconds(&self) -> Option<f64> {
        self.info.length_in_seconds
    }

    fn grab(&mut self) -> BfpuResult<Option<LibavUnit>> {
        loop {
            if let Some(unit) = self.pending.pop_front() {
                return Ok(Some(unit));
            }
            if self.drained {
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => self.decode(&packet)?,
                Err(ffmpeg_next::Error::Eof) => {
                    self.drained = true;
                    self.flush()?;
                }
                Err(e) => return Err(BfpuError::media("read packet", e.to_string())),
            }
        }
    }
}

fn drain_video(decoder: &mut codec::decoder::Video, pending: &mut VecDeque<LibavUnit>) {
    let mut decoded = frame::Video::empty();
    while decoder.receive_frame(&mut decoded).is_ok() {
        pending.push_back(LibavUnit::Image(decoded));
        decoded = frame::Video::empty();
    }
}

fn drain_audio(decoder: &mut codec::decoder::Audio, pending: &mut VecDeque<LibavUnit>) {
    let mut decoded = frame::Audio::empty();
    while decoder.receive_frame(&mut decoded).is_ok() {
        pending.push_back(LibavUnit::Samples(decoded));
        decoded = frame::Audio::empty();
    }
}

fn length_in_seconds(duration: i64) -> Option<f64> {
    if duration <= 0 {
        None
    } else {
        Some(duration as f64 / ffi::AV_TIME_BASE as f64)
    }
}

fn ratio_to_f64(ratio: ffmpeg_next::Rational) -> f64 {
    if ratio.denominator() == 0 {
        0.0
    } else {
        f64::from(ratio)
    }
}

fn channel_count(parameters: &Parameters) -> u32 {
    // SAFETY: the parameters pointer is valid for the borrow of the stream.
    let channels = unsafe { (*parameters.as_ptr()).ch_layout.nb_channels };
    channels.max(0) as u32
}

fn to_map(dictionary: DictionaryRef<'_>) -> BTreeMap<String, String> {
    dictionary
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_in_seconds() {
        assert_eq!(length_in_seconds(0), None);
        assert_eq!(length_in_seconds(ffi::AV_NOPTS_VALUE), None);
        assert_eq!(length_in_seconds(2 * ffi::AV_TIME_BASE as i64), Some(2.0));
    }

    #[test]
    fn test_ratio_to_f64_handles_unknown() {
        assert_eq!(ratio_to_f64(ffmpeg_next::Rational::new(0, 0)), 0.0);
        assert_eq!(ratio_to_f64(ffmpeg_next::Rational::new(30000, 1001)), 30000.0 / 1001.0);
    }
}
