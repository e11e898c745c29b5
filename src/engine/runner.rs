//! Per-file execution with fail-tolerant or fail-fast policy

use rayon::iter::{ParallelBridge, ParallelIterator};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::domain::model::{MatchedFile, Setting};
use crate::engine::cancel::CancelToken;
use crate::engine::enumerator::FileEnumerator;
use crate::engine::target::TargetMapper;
use crate::error::{BfpuError, BfpuResult};
use crate::utils::path::PathUtils;

/// Counters for one action run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Files abandoned after an interrupt or a sibling's fatal failure
    pub cancelled: usize,
}

impl RunSummary {
    fn count(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Processed => self.processed += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Cancelled => self.cancelled += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Processed,
    Skipped,
    Failed,
    Cancelled,
}

/// Drives a per-file operation over every file the setting matches.
///
/// A failing file is logged and skipped when the setting is fail-tolerant.
/// Otherwise the failure is wrapped in [`BfpuError::FileFailed`] and the run
/// stops; files written before it stay on disk. Enumeration failures always
/// stop the run.
///
/// The operation receives a [`CancelToken`] that is set on a user interrupt
/// or, with a worker pool, when a sibling fails fatally. Work that returns an
/// error after cancellation is abandoned and its target removed, so a later
/// run with `skip-on-existing-target` redoes it.
pub struct FileRunner<'a> {
    action: &'a str,
    setting: &'a Setting,
    mapper: TargetMapper,
}

impl<'a> FileRunner<'a> {
    pub fn new(action: &'a str, setting: &'a Setting) -> Self {
        Self {
            action,
            setting,
            mapper: TargetMapper::new(setting.source(), setting.destination()),
        }
    }

    /// Override target extensions, see [`TargetMapper::with_extension`]
    pub fn with_extension(mut self, extension: Option<&str>) -> Self {
        self.mapper = self.mapper.with_extension(extension);
        self
    }

    pub fn for_each_match<F>(&self, operation: F) -> BfpuResult<RunSummary>
    where
        F: Fn(&MatchedFile, &CancelToken) -> BfpuResult<()> + Sync,
    {
        let enumerator = FileEnumerator::new(
            self.setting.source(),
            self.setting.recursive(),
            self.setting.glob(),
        )
        .map_err(|e| self.walk_failed(e))?;
        let cancel = self.setting.interrupt().child();

        let summary = if self.setting.jobs() > 1 {
            self.run_parallel(&enumerator, &operation, &cancel)?
        } else {
            self.run_sequential(&enumerator, &operation, &cancel)?
        };

        info!(
            action = self.action,
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Finished processing files"
        );
        if self.setting.interrupt().is_cancelled() {
            return Err(BfpuError::Interrupted {
                action: self.action.to_string(),
            });
        }
        Ok(summary)
    }

    fn walk_failed(&self, cause: BfpuError) -> BfpuError {
        BfpuError::SourceWalk {
            action: self.action.to_string(),
            source: Box::new(cause),
        }
    }

    fn run_sequential<F>(
        &self,
        enumerator: &FileEnumerator,
        operation: &F,
        cancel: &CancelToken,
    ) -> BfpuResult<RunSummary>
    where
        F: Fn(&MatchedFile, &CancelToken) -> BfpuResult<()> + Sync,
    {
        let mut summary = RunSummary::default();
        for entry in enumerator.files() {
            let source = entry.map_err(|e| self.walk_failed(e))?;
            let outcome = self.process(&source, operation, cancel)?;
            summary.count(outcome);
            if outcome == Outcome::Cancelled {
                break;
            }
        }
        Ok(summary)
    }

    /// Files are claimed once each from the shared walk. The first fatal
    /// failure cancels the run token: no new files start and in-flight
    /// siblings are told to stop.
    fn run_parallel<F>(
        &self,
        enumerator: &FileEnumerator,
        operation: &F,
        cancel: &CancelToken,
    ) -> BfpuResult<RunSummary>
    where
        F: Fn(&MatchedFile, &CancelToken) -> BfpuResult<()> + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.setting.jobs())
            .thread_name(|index| format!("bfpu-worker-{}", index))
            .build()
            .map_err(|e| BfpuError::ActionRun {
                action: self.action.to_string(),
                message: format!("failed to start worker pool: {}", e),
            })?;
        debug!(action = self.action, jobs = self.setting.jobs(), "Started worker pool");

        let processed = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let cancelled = AtomicUsize::new(0);
        let fatal: Mutex<Option<BfpuError>> = Mutex::new(None);

        // Err(()) only stops the bridge; the cause is kept in `fatal`
        let _ = pool.install(|| {
            enumerator
                .files()
                .par_bridge()
                .try_for_each(|entry| -> Result<(), ()> {
                    let outcome = entry
                        .map_err(|e| self.walk_failed(e))
                        .and_then(|source| self.process(&source, operation, cancel));
                    match outcome {
                        Ok(Outcome::Cancelled) => {
                            cancelled.fetch_add(1, Ordering::Relaxed);
                            Err(())
                        }
                        Ok(outcome) => {
                            let counter = match outcome {
                                Outcome::Processed => &processed,
                                Outcome::Skipped => &skipped,
                                _ => &failed,
                            };
                            counter.fetch_add(1, Ordering::Relaxed);
                            Ok(())
                        }
                        Err(e) => {
                            cancel.cancel();
                            let mut first = fatal.lock().unwrap_or_else(PoisonError::into_inner);
                            if first.is_none() {
                                *first = Some(e);
                            }
                            Err(())
                        }
                    }
                })
        });

        if let Some(e) = fatal.into_inner().unwrap_or_else(PoisonError::into_inner) {
            return Err(e);
        }
        Ok(RunSummary {
            processed: processed.into_inner(),
            skipped: skipped.into_inner(),
            failed: failed.into_inner(),
            cancelled: cancelled.into_inner(),
        })
    }

    fn process<F>(&self, source: &Path, operation: &F, cancel: &CancelToken) -> BfpuResult<Outcome>
    where
        F: Fn(&MatchedFile, &CancelToken) -> BfpuResult<()> + Sync,
    {
        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        let matched = self.mapper.map(source)?;

        if self.setting.skip_on_existing_target() && matched.target.exists() {
            info!(
                action = self.action,
                "Skipping {} because target {} already exists",
                matched.source.display(),
                matched.target.display()
            );
            return Ok(Outcome::Skipped);
        }

        debug!(
            action = self.action,
            "Processing {} -> {}",
            matched.source.display(),
            matched.target.display()
        );
        let result = self
            .mapper
            .prepare(&matched)
            .and_then(|()| operation(&matched, cancel));

        match result {
            Ok(()) => Ok(Outcome::Processed),
            Err(e) if cancel.is_cancelled() => {
                self.discard(&matched, &e);
                Ok(Outcome::Cancelled)
            }
            Err(e) if self.setting.fail_tolerant() => {
                warn!(
                    action = self.action,
                    source_path = %matched.source.display(),
                    target_path = %matched.target.display(),
                    error = %e,
                    "File failed, continuing"
                );
                Ok(Outcome::Failed)
            }
            Err(e) => Err(BfpuError::FileFailed {
                action: self.action.to_string(),
                source_path: matched.source.clone(),
                target_path: PathUtils::absolute(&matched.target),
                source: Box::new(e),
            }),
        }
    }

    /// Remove whatever an abandoned operation left at the target
    fn discard(&self, matched: &MatchedFile, cause: &BfpuError) {
        debug!(
            action = self.action,
            error = %cause,
            "Abandoned {}",
            matched.source.display()
        );
        match std::fs::remove_file(&matched.target) {
            Ok(()) => info!(
                action = self.action,
                "Removed unfinished target {}",
                matched.target.display()
            ),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                action = self.action,
                error = %e,
                "Failed to remove unfinished target {}",
                matched.target.display()
            ),
        }
    }
}
