//! Rate-limited reporting of resolution errors.
//!
//! A persistent failure (daemon socket gone, proxy down) fails every query.
//! Each distinct failure is logged until it has been seen `capacity` times
//! within the window, then once more with a notice, then muted for the
//! cooldown.

use tracing::warn;

use crate::error::ResolveError;
use crate::metrics;
use crate::window::{OccurrenceWindow, WindowConfig};

/// What happened to a reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Logged normally.
    Logged,
    /// Logged with a notice that further occurrences are muted.
    LoggedAndMuted,
    /// Not logged.
    Suppressed,
}

/// Logs resolution errors through an [`OccurrenceWindow`].
#[derive(Clone)]
pub struct ErrorReporter {
    window: OccurrenceWindow<String>,
}

impl ErrorReporter {
    /// Create a reporter. Must be called within a Tokio runtime.
    pub fn new(config: WindowConfig) -> Self {
        Self {
            window: OccurrenceWindow::new(config),
        }
    }

    /// Report a failed resolution.
    pub fn report(&self, error: &ResolveError) -> Disposition {
        metrics::record_resolve_error(error.kind());

        let message = error.to_string();
        let key = error.suppression_key();
        let filled = self.window.increment(key.clone());
        metrics::record_tracked_errors(self.window.tracked_keys());

        if filled {
            let config = self.window.config();
            warn!(
                kind = error.kind(),
                occurrences = config.capacity,
                window_secs = config.window.as_secs(),
                cooldown_secs = config.cooldown.as_secs(),
                "{} (got this error {} times within the last {:?}, suppressing it for the next {:?})",
                message,
                config.capacity,
                config.window,
                config.cooldown,
            );
            Disposition::LoggedAndMuted
        } else if !self.window.is_full(&key) {
            warn!(kind = error.kind(), "{}", message);
            Disposition::Logged
        } else {
            metrics::record_error_suppressed();
            Disposition::Suppressed
        }
    }

    /// Number of distinct failures currently tracked.
    pub fn tracked_messages(&self) -> usize {
        self.window.tracked_keys()
    }
}
