//! Cooperative cancellation for per-file work

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{BfpuError, BfpuResult};

/// Shared stop flag checked by long-running per-file work.
///
/// A child token reports cancellation when it or any of its ancestors is
/// cancelled; cancelling a child leaves the parent untouched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.is_cancelled())
    }

    /// `Err(BfpuError::Cancelled)` once cancelled
    pub fn check(&self) -> BfpuResult<()> {
        if self.is_cancelled() {
            return Err(BfpuError::Cancelled);
        }
        Ok(())
    }
}
