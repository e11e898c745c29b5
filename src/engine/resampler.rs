//! Frame-rate conversion by dropping or duplicating decoded units
//!
//! The resampler sits between a [`FrameGrabber`] and a [`FrameRecorder`] and
//! never looks inside a unit. When the integer parts of the source and target
//! rates agree every unit is passed through. Otherwise image-bearing units are
//! emitted zero or more times so that output index `n` carries source image
//! `round(n * step)`, where `step` is the ratio of estimated source units to
//! estimated target units over the stream duration. Units without an image
//! (audio, metadata) are always passed through and do not move the counters.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::engine::cancel::CancelToken;
use crate::error::{BfpuError, BfpuResult};
use crate::ports::{FrameGrabber, FrameRecorder, MediaUnit};

/// Consecutive grab failures tolerated under [`UnitFailurePolicy::SkipUnit`]
pub const MAX_CONSECUTIVE_GRAB_FAILURES: usize = 8;

/// Smallest accepted `step`; each source image is emitted at most about
/// `1 / MIN_STEP` times
pub const MIN_STEP: f64 = 1e-3;

/// What a failing grab or record does to the file being converted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitFailurePolicy {
    /// Fail the whole file on the first unit failure
    #[default]
    AbortFile,
    /// Log the failure and continue with the next unit
    SkipUnit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResampleMode {
    PassThrough,
    DropDuplicate { step: f64 },
}

/// Counters for one file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResampleReport {
    pub mode: ResampleMode,
    /// Units taken from the grabber
    pub grabbed: u64,
    /// Image-bearing units seen in drop/duplicate mode
    pub image_units: u64,
    /// Image emissions in drop/duplicate mode, including failed ones
    pub recorded: u64,
    /// Units emitted without a cadence decision
    pub passed_through: u64,
    /// Units lost to grab or record failures under `SkipUnit`
    pub skipped: u64,
}

impl ResampleReport {
    fn new(mode: ResampleMode) -> Self {
        Self {
            mode,
            grabbed: 0,
            image_units: 0,
            recorded: 0,
            passed_through: 0,
            skipped: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameResampler {
    policy: UnitFailurePolicy,
}

impl FrameResampler {
    pub fn new(policy: UnitFailurePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> UnitFailurePolicy {
        self.policy
    }

    /// Decide how a stream is converted.
    ///
    /// Unknown, zero or non-finite durations and rates leave `step` undefined
    /// and fall back to pass-through.
    pub fn plan(source_rate: f64, target_rate: f64, length_in_seconds: Option<f64>) -> ResampleMode {
        if source_rate.floor() == target_rate.floor() {
            return ResampleMode::PassThrough;
        }
        let length = match length_in_seconds {
            Some(length) if length.is_finite() && length > 0.0 => length,
            _ => return ResampleMode::PassThrough,
        };

        let source_units = source_rate * length;
        let target_units = target_rate * length;
        let step = source_units / target_units;
        if !step.is_finite() || step <= 0.0 {
            return ResampleMode::PassThrough;
        }
        ResampleMode::DropDuplicate { step }
    }

    /// Move every unit from `grabber` to `recorder`. State is local to the call.
    ///
    /// `cancel` is checked before every grab; a cancelled run returns
    /// [`BfpuError::Cancelled`] and leaves finishing to the caller.
    pub fn run<G, R>(
        &self,
        grabber: &mut G,
        recorder: &mut R,
        cancel: &CancelToken,
    ) -> BfpuResult<ResampleReport>
    where
        G: FrameGrabber,
        R: FrameRecorder<G::Unit>,
    {
        let mode = Self::plan(
            grabber.frame_rate(),
            recorder.frame_rate(),
            grabber.length_in_seconds(),
        );
        if let ResampleMode::DropDuplicate { step } = mode {
            if step < MIN_STEP {
                return Err(BfpuError::media(
                    "resample",
                    format!(
                        "target rate {} is more than {} times the source rate {}",
                        recorder.frame_rate(),
                        (1.0 / MIN_STEP).round(),
                        grabber.frame_rate()
                    ),
                ));
            }
        }
        debug!(
            source_rate = grabber.frame_rate(),
            target_rate = recorder.frame_rate(),
            ?mode,
            "Resampling"
        );

        let mut report = ResampleReport::new(mode);
        let mut grab_failures = 0usize;

        loop {
            cancel.check()?;
            let unit = match grabber.grab() {
                Ok(Some(unit)) => {
                    grab_failures = 0;
                    unit
                }
                Ok(None) => break,
                Err(e) => {
                    if self.policy == UnitFailurePolicy::AbortFile {
                        return Err(e);
                    }
                    grab_failures += 1;
                    report.skipped += 1;
                    if grab_failures >= MAX_CONSECUTIVE_GRAB_FAILURES {
                        return Err(BfpuError::media(
                            "grab",
                            format!("{} consecutive failures, last: {}", grab_failures, e),
                        ));
                    }
                    warn!(error = %e, "Skipping unit that failed to decode");
                    continue;
                }
            };
            report.grabbed += 1;

            match mode {
                ResampleMode::PassThrough => {
                    self.emit(recorder, &unit, &mut report)?;
                    report.passed_through += 1;
                }
                ResampleMode::DropDuplicate { .. } if !unit.has_image() => {
                    self.emit(recorder, &unit, &mut report)?;
                    report.passed_through += 1;
                }
                ResampleMode::DropDuplicate { step } => {
                    let index = report.image_units as f64;
                    while (report.recorded as f64 * step).round() == index {
                        self.emit(recorder, &unit, &mut report)?;
                        report.recorded += 1;
                    }
                    report.image_units += 1;
                }
            }
        }

        Ok(report)
    }

    fn emit<U, R>(&self, recorder: &mut R, unit: &U, report: &mut ResampleReport) -> BfpuResult<()>
    where
        U: MediaUnit,
        R: FrameRecorder<U>,
    {
        match recorder.record(unit) {
            Ok(()) => Ok(()),
            Err(e) if self.policy == UnitFailurePolicy::SkipUnit => {
                warn!(error = %e, image = unit.has_image(), "Skipping unit that failed to encode");
                report.skipped += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_equal_integer_rates_pass_through() {
        assert_eq!(
            FrameResampler::plan(29.97, 29.0, Some(10.0)),
            ResampleMode::PassThrough
        );
        assert_eq!(
            FrameResampler::plan(30.0, 30.0, Some(10.0)),
            ResampleMode::PassThrough
        );
    }

    #[test]
    fn test_plan_step_is_rate_ratio() {
        assert_eq!(
            FrameResampler::plan(60.0, 30.0, Some(4.0)),
            ResampleMode::DropDuplicate { step: 2.0 }
        );
        assert_eq!(
            FrameResampler::plan(24.0, 48.0, Some(4.0)),
            ResampleMode::DropDuplicate { step: 0.5 }
        );
    }

    #[test]
    fn test_plan_undefined_step_degrades_to_pass_through() {
        for length in [None, Some(0.0), Some(-1.0), Some(f64::NAN), Some(f64::INFINITY)] {
            assert_eq!(
                FrameResampler::plan(60.0, 30.0, length),
                ResampleMode::PassThrough
            );
        }
        assert_eq!(
            FrameResampler::plan(0.0, 30.0, Some(4.0)),
            ResampleMode::PassThrough
        );
        assert_eq!(
            FrameResampler::plan(30.0, 0.0, Some(4.0)),
            ResampleMode::PassThrough
        );
        assert_eq!(
            FrameResampler::plan(f64::NAN, 30.0, Some(4.0)),
            ResampleMode::PassThrough
        );
    }

    #[test]
    fn test_policy_deserializes_kebab_case() {
        #[derive(Deserialize)]
        struct Holder {
            policy: UnitFailurePolicy,
        }
        let holder: Holder = toml::from_str("policy = \"skip-unit\"").unwrap();
        assert_eq!(holder.policy, UnitFailurePolicy::SkipUnit);
        assert_eq!(UnitFailurePolicy::default(), UnitFailurePolicy::AbortFile);
    }
}
