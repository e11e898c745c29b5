//! Encoding side of the FFmpeg adapter

use ffmpeg_next::codec::{self, capabilities::Capabilities, encoder};
use ffmpeg_next::format::context::Output;
use ffmpeg_next::format::{self, Pixel, Sample};
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame;
use ffmpeg_next::{ffi, filter, media, picture, Dictionary, Packet, Rational};
use std::collections::BTreeMap;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::grabber::LibavUnit;
use super::{default_encoder, resolve_encoder};
use crate::domain::model::{AudioSettings, RecorderSettings, VideoSettings};
use crate::error::{BfpuError, BfpuResult};
use crate::ports::FrameRecorder;
use crate::utils::path::PathUtils;

/// Lambda per quantizer step, FFmpeg's `FF_QP2LAMBDA`
const QP2LAMBDA: f64 = 118.0;

/// Writes encoded units to a hidden sibling of the target and moves it into
/// place on [`LibavRecorder::finish`]. Dropping an unfinished recorder
/// deletes the partial file.
pub struct LibavRecorder {
    octx: Output,
    video: Option<VideoOutput>,
    audio: Option<AudioOutput>,
    frame_rate: f64,
    partial: PartialFile,
}

impl LibavRecorder {
    pub fn open(target: &Path, settings: &RecorderSettings) -> BfpuResult<Self> {
        let partial_path = PathUtils::partial_sibling(target);
        let mut octx = match settings.format.as_deref() {
            Some(name) => format::output_as(&partial_path, name),
            None => format::output(&partial_path),
        }
        .map_err(|e| BfpuError::media("open output", e.to_string()))?;
        let partial = PartialFile {
            path: partial_path.clone(),
            target: target.to_path_buf(),
            committed: false,
        };

        let global_header = octx
            .format()
            .flags()
            .contains(format::flag::Flags::GLOBAL_HEADER);

        let video = match &settings.video {
            Some(video) => Some(VideoOutput::open(
                &mut octx,
                &partial_path,
                video,
                global_header,
            )?),
            None => None,
        };
        let audio = match &settings.audio {
            Some(audio) => Some(AudioOutput::open(
                &mut octx,
                &partial_path,
                audio,
                global_header,
            )?),
            None => None,
        };

        octx.set_metadata(to_dictionary(&settings.metadata));
        octx.write_header_with(to_dictionary(&settings.options))
            .map_err(|e| BfpuError::media("write header", e.to_string()))?;

        let frame_rate = settings.video.as_ref().map(|v| v.frame_rate).unwrap_or(0.0);
        debug!(
            output = %target.display(),
            video = video.is_some(),
            audio = audio.is_some(),
            frame_rate,
            "Opened recorder"
        );

        Ok(Self {
            octx,
            video,
            audio,
            frame_rate,
            partial,
        })
    }

    /// Flush encoders, write the trailer and move the file into place
    pub fn finish(mut self) -> BfpuResult<()> {
        if let Some(video) = self.video.as_mut() {
            video.flush(&mut self.octx)?;
        }
        if let Some(audio) = self.audio.as_mut() {
            audio.flush(&mut self.octx)?;
        }
        self.octx
            .write_trailer()
            .map_err(|e| BfpuError::media("write trailer", e.to_string()))?;

        let Self {
            octx,
            video,
            audio,
            partial,
            ..
        } = self;
        drop(video);
        drop(audio);
        drop(octx);
        partial.commit()
    }
}

impl FrameRecorder<LibavUnit> for LibavRecorder {
    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn record(&mut self, unit: &LibavUnit) -> BfpuResult<()> {
        match unit {
            LibavUnit::Image(image) => match self.video.as_mut() {
                Some(video) => video.encode(&mut self.octx, image),
                None => Ok(()),
            },
            LibavUnit::Samples(samples) => match self.audio.as_mut() {
                Some(audio) => audio.encode(&mut self.octx, Some(samples)),
                None => Ok(()),
            },
        }
    }
}

struct PartialFile {
    path: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn commit(mut self) -> BfpuResult<()> {
        std::fs::rename(&self.path, &self.target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

type ScalerKey = (Pixel, u32, u32);

struct VideoOutput {
    index: usize,
    encoder: encoder::Video,
    time_base: Rational,
    format: Pixel,
    width: u32,
    height: u32,
    scaler: Option<(ScalerKey, scaling::Context)>,
    next_pts: i64,
}

impl VideoOutput {
    fn open(
        octx: &mut Output,
        path: &Path,
        settings: &VideoSettings,
        global_header: bool,
    ) -> BfpuResult<Self> {
        let codec = match &settings.codec {
            Some(codec_ref) => resolve_encoder(codec_ref)?,
            None => default_encoder(octx, path, media::Type::Video)?,
        };
        let format = codec
            .video()
            .ok()
            .and_then(|video| video.formats())
            .and_then(|mut formats| formats.next())
            .unwrap_or(Pixel::YUV420P);

        let frame_rate = Rational::from(settings.frame_rate);
        let time_base = frame_rate.invert();

        let mut stream = octx
            .add_stream(codec)
            .map_err(|e| BfpuError::media("add video stream", e.to_string()))?;
        let index = stream.index();

        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| BfpuError::media("create video encoder", e.to_string()))?;
        encoder.set_width(settings.width);
        encoder.set_height(settings.height);
        encoder.set_format(format);
        encoder.set_frame_rate(Some(frame_rate));
        encoder.set_time_base(time_base);
        if settings.aspect_ratio > 0.0 {
            encoder.set_aspect_ratio(Rational::from(settings.aspect_ratio));
        }
        if let Some(bitrate) = settings.bitrate {
            encoder.set_bit_rate(bitrate);
        }

        let mut flags = codec::Flags::empty();
        if global_header {
            flags |= codec::Flags::GLOBAL_HEADER;
        }
        if let Some(quality) = settings.quality.filter(|q| *q >= 0.0) {
            flags |= codec::Flags::QSCALE;
            encoder.set_quality((quality * QP2LAMBDA).round() as usize);
        }
        encoder.set_flags(flags);

        let encoder = encoder
            .open_as_with(codec, to_dictionary(&settings.options))
            .map_err(|e| BfpuError::media("open video encoder", e.to_string()))?;

        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);
        let mut metadata = to_dictionary(&settings.metadata);
        if settings.rotation != 0.0 {
            metadata.set("rotate", &settings.rotation.to_string());
        }
        stream.set_metadata(metadata);

        Ok(Self {
            index,
            encoder,
            time_base,
            format,
            width: settings.width,
            height: settings.height,
            scaler: None,
            next_pts: 0,
        })
    }

    fn encode(&mut self, octx: &mut Output, source: &frame::Video) -> BfpuResult<()> {
        let mut output = if source.format() == self.format
            && source.width() == self.width
            && source.height() == self.height
        {
            source.clone()
        } else {
            let wanted = (source.format(), source.width(), source.height());
            let stale = !matches!(&self.scaler, Some((key, _)) if *key == wanted);
            if stale {
                let context = scaling::Context::get(
                    source.format(),
                    source.width(),
                    source.height(),
                    self.format,
                    self.width,
                    self.height,
                    scaling::Flags::BILINEAR,
                )
                .map_err(|e| BfpuError::media("create scaler", e.to_string()))?;
                self.scaler = Some((wanted, context));
            }
            let (_, scaler) = self
                .scaler
                .as_mut()
                .ok_or_else(|| BfpuError::media("scale", "scaler unavailable"))?;
            let mut scaled = frame::Video::empty();
            scaler
                .run(source, &mut scaled)
                .map_err(|e| BfpuError::media("scale", e.to_string()))?;
            scaled
        };

        output.set_pts(Some(self.next_pts));
        output.set_kind(picture::Type::None);
        self.next_pts += 1;

        self.encoder
            .send_frame(&output)
            .map_err(|e| BfpuError::media("encode video", e.to_string()))?;
        drain_packets(&mut self.encoder, octx, self.index, self.time_base)
    }

    fn flush(&mut self, octx: &mut Output) -> BfpuResult<()> {
        self.encoder
            .send_eof()
            .map_err(|e| BfpuError::media("flush video", e.to_string()))?;
        drain_packets(&mut self.encoder, octx, self.index, self.time_base)
    }
}

struct AudioOutput {
    index: usize,
    encoder: encoder::Audio,
    time_base: Rational,
    sample_format: Sample,
    sample_rate: u32,
    channels: u32,
    /// Fixed encoder frame size, `None` when the codec takes any size
    frame_size: Option<u32>,
    graph: Option<filter::Graph>,
    input_pts: i64,
    next_pts: i64,
}

impl AudioOutput {
    fn open(
        octx: &mut Output,
        path: &Path,
        settings: &AudioSettings,
        global_header: bool,
    ) -> BfpuResult<Self> {
        let codec = match &settings.codec {
            Some(codec_ref) => resolve_encoder(codec_ref)?,
            None => default_encoder(octx, path, media::Type::Audio)?,
        };
        let sample_format = codec
            .audio()
            .ok()
            .and_then(|audio| audio.formats())
            .and_then(|mut formats| formats.next())
            .unwrap_or(Sample::F32(format::sample::Type::Planar));
        let time_base = Rational::new(1, settings.sample_rate as i32);

        let mut stream = octx
            .add_stream(codec)
            .map_err(|e| BfpuError::media("add audio stream", e.to_string()))?;
        let index = stream.index();

        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(|e| BfpuError::media("create audio encoder", e.to_string()))?;
        encoder.set_rate(settings.sample_rate as i32);
        encoder.set_format(sample_format);
        encoder.set_time_base(time_base);
        // SAFETY: the context is owned by `encoder` and not yet opened.
        unsafe {
            let context = encoder.as_mut_ptr();
            ffi::av_channel_layout_uninit(&mut (*context).ch_layout);
            ffi::av_channel_layout_default(&mut (*context).ch_layout, settings.channels as c_int);
        }
        if let Some(bitrate) = settings.bitrate {
            encoder.set_bit_rate(bitrate);
        }
        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder
            .open_as_with(codec, to_dictionary(&settings.options))
            .map_err(|e| BfpuError::media("open audio encoder", e.to_string()))?;
        let frame_size = if codec
            .capabilities()
            .contains(Capabilities::VARIABLE_FRAME_SIZE)
        {
            None
        } else {
            Some(encoder.frame_size()).filter(|size| *size > 0)
        };

        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);
        stream.set_metadata(to_dictionary(&settings.metadata));

        Ok(Self {
            index,
            encoder,
            time_base,
            sample_format,
            sample_rate: settings.sample_rate,
            channels: settings.channels,
            frame_size,
            graph: None,
            input_pts: 0,
            next_pts: 0,
        })
    }

    /// Resample, reformat and re-chunk source samples for the encoder. Built
    /// from the first frame since the source layout is only known then.
    fn build_graph(&self, first: &frame::Audio) -> BfpuResult<filter::Graph> {
        let graph_error = |e: ffmpeg_next::Error| BfpuError::media("audio filter", e.to_string());

        // SAFETY: the frame outlives the call and its layout is initialized.
        let source_layout = unsafe {
            let layout = &(*first.as_ptr()).ch_layout;
            if layout.order == ffi::AVChannelOrder::AV_CHANNEL_ORDER_UNSPEC {
                default_layout_name(layout.nb_channels)
            } else {
                describe_layout(layout)
            }
        };
        let target_layout = unsafe { default_layout_name(self.channels as c_int) };

        let mut graph = filter::Graph::new();
        let args = format!(
            "time_base=1/{rate}:sample_rate={rate}:sample_fmt={format}:channel_layout={layout}",
            rate = first.rate(),
            format = first.format().name(),
            layout = source_layout,
        );
        let abuffer = filter::find("abuffer")
            .ok_or_else(|| BfpuError::media("audio filter", "abuffer is not available"))?;
        let abuffersink = filter::find("abuffersink")
            .ok_or_else(|| BfpuError::media("audio filter", "abuffersink is not available"))?;
        graph.add(&abuffer, "in", &args).map_err(graph_error)?;
        graph.add(&abuffersink, "out", "").map_err(graph_error)?;

        let spec = format!(
            "aresample={rate},aformat=sample_fmts={format}:channel_layouts={layout}",
            rate = self.sample_rate,
            format = self.sample_format.name(),
            layout = target_layout,
        );
        graph
            .output("in", 0)
            .and_then(|parser| parser.input("out", 0))
            .and_then(|parser| parser.parse(&spec))
            .map_err(graph_error)?;
        graph.validate().map_err(graph_error)?;

        if let Some(frame_size) = self.frame_size {
            if let Some(mut sink) = graph.get("out") {
                sink.sink().set_frame_size(frame_size);
            }
        }
        Ok(graph)
    }

    /// Push one source frame through the graph, or flush it with `None`
    fn encode(&mut self, octx: &mut Output, source: Option<&frame::Audio>) -> BfpuResult<()> {
        if self.graph.is_none() {
            match source {
                Some(first) => self.graph = Some(self.build_graph(first)?),
                None => return Ok(()),
            }
        }

        let Self {
            index,
            encoder,
            time_base,
            graph,
            input_pts,
            next_pts,
            ..
        } = self;
        let graph = graph
            .as_mut()
            .ok_or_else(|| BfpuError::media("audio filter", "graph unavailable"))?;

        {
            let mut input = graph
                .get("in")
                .ok_or_else(|| BfpuError::media("audio filter", "missing graph input"))?;
            let pushed = match source {
                Some(samples) => {
                    let mut samples = samples.clone();
                    samples.set_pts(Some(*input_pts));
                    *input_pts += samples.samples() as i64;
                    input.source().add(&samples)
                }
                None => input.source().flush(),
            };
            pushed.map_err(|e| BfpuError::media("audio filter", e.to_string()))?;
        }

        loop {
            let mut filtered = frame::Audio::empty();
            {
                let mut output = graph
                    .get("out")
                    .ok_or_else(|| BfpuError::media("audio filter", "missing graph output"))?;
                if output.sink().frame(&mut filtered).is_err() {
                    break;
                }
            }
            filtered.set_pts(Some(*next_pts));
            *next_pts += filtered.samples() as i64;
            encoder
                .send_frame(&filtered)
                .map_err(|e| BfpuError::media("encode audio", e.to_string()))?;
            drain_packets(encoder, octx, *index, *time_base)?;
        }
        Ok(())
    }

    fn flush(&mut self, octx: &mut Output) -> BfpuResult<()> {
        self.encode(octx, None)?;
        self.encoder
            .send_eof()
            .map_err(|e| BfpuError::media("flush audio", e.to_string()))?;
        drain_packets(&mut self.encoder, octx, self.index, self.time_base)
    }
}

fn drain_packets(
    encoder: &mut encoder::Encoder,
    octx: &mut Output,
    index: usize,
    time_base: Rational,
) -> BfpuResult<()> {
    let stream_time_base = octx
        .stream(index)
        .map(|stream| stream.time_base())
        .ok_or_else(|| BfpuError::media("write packet", format!("no output stream {}", index)))?;

    let mut packet = Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(index);
        packet.rescale_ts(time_base, stream_time_base);
        packet
            .write_interleaved(octx)
            .map_err(|e| BfpuError::media("write packet", e.to_string()))?;
    }
    Ok(())
}

fn to_dictionary(map: &BTreeMap<String, String>) -> Dictionary<'static> {
    let mut dictionary = Dictionary::new();
    for (key, value) in map {
        dictionary.set(key, value);
    }
    dictionary
}

unsafe fn describe_layout(layout: *const ffi::AVChannelLayout) -> String {
    let mut buffer = [0 as c_char; 128];
    if ffi::av_channel_layout_describe(layout, buffer.as_mut_ptr(), buffer.len()) < 0 {
        return String::new();
    }
    CStr::from_ptr(buffer.as_ptr()).to_string_lossy().into_owned()
}

unsafe fn default_layout_name(channels: c_int) -> String {
    let mut layout: ffi::AVChannelLayout = std::mem::zeroed();
    ffi::av_channel_layout_default(&mut layout, channels.max(1));
    let name = describe_layout(&layout);
    ffi::av_channel_layout_uninit(&mut layout);
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_dictionary_copies_entries() {
        let mut map = BTreeMap::new();
        map.insert("crf".to_string(), "23".to_string());
        map.insert("preset".to_string(), "fast".to_string());
        let dictionary = to_dictionary(&map);
        assert_eq!(dictionary.get("crf"), Some("23"));
        assert_eq!(dictionary.get("preset"), Some("fast"));
    }

    #[test]
    fn test_unfinished_partial_file_is_removed() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join(".clip.partial.mp4");
        std::fs::write(&path, b"half").unwrap();
        drop(PartialFile {
            path: path.clone(),
            target: temp.path().join("clip.mp4"),
            committed: false,
        });
        assert!(!path.exists());
    }

    #[test]
    fn test_committed_partial_file_is_renamed() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join(".clip.partial.mp4");
        let target = temp.path().join("clip.mp4");
        std::fs::write(&path, b"done").unwrap();
        PartialFile {
            path: path.clone(),
            target: target.clone(),
            committed: false,
        }
        .commit()
        .unwrap();
        assert!(!path.exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"done");
    }
}
