//! Transcodes media files through the codec engine with frame-rate conversion

use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info};

use crate::adapters::exec_libav::{self, LibavGrabber, LibavRecorder};
use crate::adapters::toml_config::TomlConfig;
use crate::adapters::tracing_log::TracingLogAdapter;
use crate::domain::model::{
    AudioSettings, CodecRef, MatchedFile, RecorderSettings, Setting, SourceInfo, VideoSettings,
};
use crate::engine::{CancelToken, FileRunner, FrameResampler, UnitFailurePolicy};
use crate::error::{BfpuError, BfpuResult};
use crate::ports::{Action, OutputLogLevel};

pub const NAME: &str = "ffmpeg-converter";

/// Used when neither the properties nor the source give a frame rate
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// `[ffmpeg-converter]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ConverterProperties {
    pub output_log_level: OutputLogLevel,
    pub file_ext: Option<String>,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
    pub aspect_ratio: Option<f64>,
    pub skip_metadata: bool,
    pub format: Option<String>,
    pub option: BTreeMap<String, toml::Value>,
    pub video_encoder: Option<String>,
    pub video_option: BTreeMap<String, toml::Value>,
    pub video_codec: Option<String>,
    pub video_bitrate: Option<usize>,
    pub video_quality: Option<f64>,
    pub frame_rate: Option<f64>,
    pub frame_rate_min: Option<f64>,
    pub frame_rate_max: Option<f64>,
    pub display_rotation: Option<f64>,
    pub skip_video_metadata: bool,
    pub audio_encoder: Option<String>,
    pub audio_option: BTreeMap<String, toml::Value>,
    pub audio_codec: Option<String>,
    pub audio_bitrate: Option<usize>,
    pub sample_rate: Option<u32>,
    pub sample_rate_min: Option<u32>,
    pub sample_rate_max: Option<u32>,
    pub skip_audio_metadata: bool,
    pub unit_failure: UnitFailurePolicy,
}

impl ConverterProperties {
    pub fn video_codec_ref(&self) -> Option<CodecRef> {
        codec_ref(self.video_encoder.as_deref(), self.video_codec.as_deref())
    }

    pub fn audio_codec_ref(&self) -> Option<CodecRef> {
        codec_ref(self.audio_encoder.as_deref(), self.audio_codec.as_deref())
    }
}

#[derive(Debug)]
pub struct FfmpegConverterAction {
    properties: ConverterProperties,
    resampler: FrameResampler,
}

impl FfmpegConverterAction {
    pub fn new(properties: ConverterProperties) -> Self {
        let resampler = FrameResampler::new(properties.unit_failure);
        Self {
            properties,
            resampler,
        }
    }

    pub fn from_config(config: &TomlConfig) -> BfpuResult<Self> {
        Ok(Self::new(config.section(NAME)?))
    }

    pub fn properties(&self) -> &ConverterProperties {
        &self.properties
    }

    fn resolve_codecs(&self) -> BfpuResult<()> {
        let requested = [
            ("video", self.properties.video_codec_ref()),
            ("audio", self.properties.audio_codec_ref()),
        ];
        for (medium, codec_ref) in requested {
            let Some(codec_ref) = codec_ref else {
                continue;
            };
            let codec = exec_libav::resolve_encoder(&codec_ref).map_err(|e| BfpuError::ActionRun {
                action: NAME.to_string(),
                message: format!("required {} codec: {}", medium, e),
            })?;
            info!("Found required {} codec {}", medium, codec.description());
        }
        Ok(())
    }

    fn convert(&self, matched: &MatchedFile, cancel: &CancelToken) -> BfpuResult<()> {
        info!(
            "Converting {} to {}",
            matched.source.display(),
            matched.target.display()
        );
        let started = Instant::now();

        let mut grabber = LibavGrabber::open(&matched.source)?;
        let settings = plan_recorder(&self.properties, grabber.info());
        let mut recorder = LibavRecorder::open(&matched.target, &settings)?;
        let report = self.resampler.run(&mut grabber, &mut recorder, cancel)?;
        recorder.finish()?;

        debug!(?report, "Resampled {}", matched.source.display());
        info!(
            "Converted {} to {} in {} ms",
            matched.source.display(),
            matched.target.display(),
            started.elapsed().as_millis()
        );
        Ok(())
    }
}

impl Action for FfmpegConverterAction {
    fn name(&self) -> &str {
        NAME
    }

    fn run(&self, setting: &Setting) -> BfpuResult<()> {
        debug!(properties = ?self.properties, "Converter properties");
        TracingLogAdapter::new(self.properties.output_log_level).apply_to_ffmpeg();
        exec_libav::init()?;
        self.resolve_codecs()?;

        FileRunner::new(NAME, setting)
            .with_extension(self.properties.file_ext.as_deref())
            .for_each_match(|matched, cancel| self.convert(matched, cancel))?;
        Ok(())
    }
}

/// Encoder name wins over codec name
pub fn codec_ref(encoder: Option<&str>, codec: Option<&str>) -> Option<CodecRef> {
    let non_blank = |value: Option<&str>| {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    non_blank(encoder)
        .map(CodecRef::Encoder)
        .or_else(|| non_blank(codec).map(CodecRef::Codec))
}

/// Explicit value, else the source value raised to `min` or lowered to `max`
pub fn choose_rate<T: PartialOrd + Copy>(
    explicit: Option<T>,
    min: Option<T>,
    max: Option<T>,
    source: T,
) -> T {
    if let Some(value) = explicit {
        return value;
    }
    match (min, max) {
        (Some(min), _) if source < min => min,
        (_, Some(max)) if source > max => max,
        _ => source,
    }
}

/// Derive recorder settings from the properties and the opened source
pub fn plan_recorder(properties: &ConverterProperties, source: &SourceInfo) -> RecorderSettings {
    let video = source.has_video.then(|| {
        let frame_rate = choose_rate(
            properties.frame_rate,
            properties.frame_rate_min,
            properties.frame_rate_max,
            source.frame_rate,
        );
        VideoSettings {
            width: properties.image_width.unwrap_or(source.width),
            height: properties.image_height.unwrap_or(source.height),
            aspect_ratio: properties.aspect_ratio.unwrap_or(source.aspect_ratio),
            codec: properties.video_codec_ref(),
            bitrate: properties.video_bitrate,
            quality: properties.video_quality,
            frame_rate: if frame_rate > 0.0 {
                frame_rate
            } else {
                DEFAULT_FRAME_RATE
            },
            rotation: properties.display_rotation.unwrap_or(source.rotation),
            options: stringify(&properties.video_option),
            metadata: copy_unless(properties.skip_video_metadata, &source.video_metadata),
        }
    });

    let audio = (source.audio_channels > 0).then(|| AudioSettings {
        channels: source.audio_channels,
        codec: properties.audio_codec_ref(),
        bitrate: properties.audio_bitrate,
        sample_rate: choose_rate(
            properties.sample_rate,
            properties.sample_rate_min,
            properties.sample_rate_max,
            source.sample_rate,
        ),
        options: stringify(&properties.audio_option),
        metadata: copy_unless(properties.skip_audio_metadata, &source.audio_metadata),
    });

    RecorderSettings {
        format: properties
            .format
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string),
        options: stringify(&properties.option),
        metadata: copy_unless(properties.skip_metadata, &source.metadata),
        video,
        audio,
    }
}

fn copy_unless(skip: bool, metadata: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    if skip {
        BTreeMap::new()
    } else {
        metadata.clone()
    }
}

/// Codec options are passed as strings; TOML scalars keep their literal form
fn stringify(options: &BTreeMap<String, toml::Value>) -> BTreeMap<String, String> {
    options
        .iter()
        .map(|(key, value)| {
            let value = match value {
                toml::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceInfo {
        SourceInfo {
            has_video: true,
            width: 1920,
            height: 1080,
            aspect_ratio: 1.0,
            frame_rate: 59.94,
            length_in_seconds: Some(12.0),
            rotation: 90.0,
            audio_channels: 2,
            sample_rate: 48000,
            metadata: BTreeMap::from([("title".to_string(), "clip".to_string())]),
            video_metadata: BTreeMap::from([("handler_name".to_string(), "v".to_string())]),
            audio_metadata: BTreeMap::from([("language".to_string(), "eng".to_string())]),
            ..SourceInfo::default()
        }
    }

    #[test]
    fn test_encoder_name_wins_over_codec_name() {
        assert_eq!(
            codec_ref(Some("libx264"), Some("h264")),
            Some(CodecRef::Encoder("libx264".to_string()))
        );
        assert_eq!(
            codec_ref(Some("  "), Some("h264")),
            Some(CodecRef::Codec("h264".to_string()))
        );
        assert_eq!(codec_ref(None, None), None);
    }

    #[test]
    fn test_choose_rate() {
        assert_eq!(choose_rate(Some(25.0), Some(30.0), None, 60.0), 25.0);
        assert_eq!(choose_rate(None, Some(30.0), None, 24.0), 30.0);
        assert_eq!(choose_rate(None, None, Some(30.0), 60.0), 30.0);
        assert_eq!(choose_rate(None, Some(24.0), Some(30.0), 25.0), 25.0);
        assert_eq!(choose_rate(None, None, Some(44100), 48000), 44100);
    }

    #[test]
    fn test_plan_copies_source_by_default() {
        let settings = plan_recorder(&ConverterProperties::default(), &source());
        let video = settings.video.unwrap();
        assert_eq!((video.width, video.height), (1920, 1080));
        assert_eq!(video.frame_rate, 59.94);
        assert_eq!(video.rotation, 90.0);
        assert_eq!(video.codec, None);
        assert_eq!(video.metadata.get("handler_name").map(String::as_str), Some("v"));
        assert_eq!(settings.metadata.get("title").map(String::as_str), Some("clip"));

        let audio = settings.audio.unwrap();
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.sample_rate, 48000);
    }

    #[test]
    fn test_plan_applies_properties() {
        let properties = ConverterProperties {
            image_width: Some(1280),
            image_height: Some(720),
            frame_rate_max: Some(30.0),
            display_rotation: Some(0.0),
            video_codec: Some("h264".to_string()),
            video_option: BTreeMap::from([
                ("crf".to_string(), toml::Value::Integer(23)),
                ("preset".to_string(), toml::Value::String("fast".to_string())),
            ]),
            sample_rate: Some(44100),
            skip_metadata: true,
            skip_audio_metadata: true,
            format: Some(" mp4 ".to_string()),
            ..ConverterProperties::default()
        };
        let settings = plan_recorder(&properties, &source());
        assert_eq!(settings.format.as_deref(), Some("mp4"));
        assert!(settings.metadata.is_empty());

        let video = settings.video.unwrap();
        assert_eq!((video.width, video.height), (1280, 720));
        assert_eq!(video.frame_rate, 30.0);
        assert_eq!(video.rotation, 0.0);
        assert_eq!(video.codec, Some(CodecRef::Codec("h264".to_string())));
        assert_eq!(video.options.get("crf").map(String::as_str), Some("23"));
        assert_eq!(video.options.get("preset").map(String::as_str), Some("fast"));

        let audio = settings.audio.unwrap();
        assert_eq!(audio.sample_rate, 44100);
        assert!(audio.metadata.is_empty());
    }

    #[test]
    fn test_plan_without_audio_or_video() {
        let silent = SourceInfo {
            audio_channels: 0,
            ..source()
        };
        assert!(plan_recorder(&ConverterProperties::default(), &silent)
            .audio
            .is_none());

        let audio_only = SourceInfo {
            has_video: false,
            ..source()
        };
        let settings = plan_recorder(&ConverterProperties::default(), &audio_only);
        assert!(settings.video.is_none());
        assert!(settings.audio.is_some());
    }

    #[test]
    fn test_unknown_source_rate_uses_default() {
        let unknown = SourceInfo {
            frame_rate: 0.0,
            ..source()
        };
        let settings = plan_recorder(&ConverterProperties::default(), &unknown);
        assert_eq!(settings.video.unwrap().frame_rate, DEFAULT_FRAME_RATE);
    }

    #[test]
    fn test_properties_from_config() {
        let config = TomlConfig::from_toml_str(
            r#"
            [ffmpeg-converter]
            file-ext = "mp4"
            frame-rate = 30.0
            video-encoder = "libx264"
            unit-failure = "skip-unit"
            [ffmpeg-converter.video-option]
            crf = "23"
            "#,
        )
        .unwrap();
        let action = FfmpegConverterAction::from_config(&config).unwrap();
        let properties = action.properties();
        assert_eq!(properties.file_ext.as_deref(), Some("mp4"));
        assert_eq!(properties.frame_rate, Some(30.0));
        assert_eq!(properties.unit_failure, UnitFailurePolicy::SkipUnit);
        assert_eq!(
            properties.video_codec_ref(),
            Some(CodecRef::Encoder("libx264".to_string()))
        );
        assert_eq!(action.resampler.policy(), UnitFailurePolicy::SkipUnit);
    }
}
