use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ProgressSource;
use crate::progress::{
    COMPLETED_LABEL, ERROR_LABEL, PENDING_LABEL, STALLED_LABEL, StatusMap, Step, step,
};
use crate::ui::{Notifier, ProgressView, ToastLevel};

pub const COMPLETED_TOAST: &str = "Download Completed Successfully!";
pub const STALLED_TOAST: &str = "Download stalled: no progress from server";

#[derive(Clone, Debug)]
pub struct PollerConfig {
    pub interval: Duration,
    /// How long the finished bar stays visible after completion.
    pub hide_delay: Duration,
    pub max_consecutive_failures: Option<u32>,
    pub max_duration: Option<Duration>,
    pub statuses: StatusMap,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            hide_delay: Duration::from_millis(3000),
            max_consecutive_failures: Some(60),
            max_duration: Some(Duration::from_secs(6 * 3600)),
            statuses: StatusMap::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "lowercase")]
pub enum PollOutcome {
    Completed,
    Failed(String),
    Stalled,
    Cancelled,
}

/// One poll session: everything needed to drive a progress display for a job.
pub struct PollJob<S> {
    pub job_id: String,
    pub source: Arc<S>,
    pub view: Arc<dyn ProgressView>,
    pub notifier: Arc<dyn Notifier>,
    pub config: PollerConfig,
}

impl<S: ProgressSource> PollJob<S> {
    /// Polls until a terminal status or cancellation. Returns as soon as the
    /// outcome is known; hiding a completed bar is `hide_after_delay`'s job.
    pub async fn run(&self, cancel: CancellationToken) -> PollOutcome {
        let config = &self.config;
        let started = Instant::now();
        let mut interval = tokio::time::interval_at(started + config.interval, config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures: u32 = 0;

        info!("Polling progress for {} every {:?}", self.job_id, config.interval);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(),
                _ = interval.tick() => {}
            }

            if let Some(max) = config.max_duration
                && started.elapsed() > max
            {
                warn!("Polling for {} exceeded {:?}", self.job_id, max);
                return self.stalled();
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(),
                r = self.source.fetch_progress(&self.job_id) => r,
            };

            let report = match result {
                Ok(report) => {
                    failures = 0;
                    report
                }
                Err(e) => {
                    failures += 1;
                    warn!("Polling error for {} ({} in a row): {}", self.job_id, failures, e);
                    if let Some(max) = config.max_consecutive_failures
                        && failures >= max
                    {
                        return self.stalled();
                    }
                    continue;
                }
            };

            debug!("{} -> {:?}", self.job_id, report);

            match step(&report, &config.statuses) {
                Step::Advance(percent) => {
                    self.view.set_percent(percent);
                    self.view.set_label(&format!("{}%", percent));
                }
                Step::Waiting => self.view.set_label(PENDING_LABEL),
                Step::NoChange => {}
                Step::Completed => {
                    self.view.set_percent(100);
                    self.view.set_label(COMPLETED_LABEL);
                    self.notifier.notify(ToastLevel::Success, COMPLETED_TOAST);
                    info!("Download {} completed", self.job_id);
                    return PollOutcome::Completed;
                }
                Step::Failed(message) => {
                    self.view.set_label(ERROR_LABEL);
                    self.notifier
                        .notify(ToastLevel::Error, &format!("Download Error: {}", message));
                    warn!("Download {} failed: {}", self.job_id, message);
                    return PollOutcome::Failed(message);
                }
            }
        }
    }

    /// Keeps the finished bar up for `hide_delay`, then hides it.
    /// Cancelling `cancel` first leaves the view as it is.
    pub async fn hide_after_delay(&self, cancel: CancellationToken) {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => debug!("Hide of {} skipped", self.job_id),
            _ = tokio::time::sleep(self.config.hide_delay) => self.view.hide(),
        }
    }

    fn stalled(&self) -> PollOutcome {
        self.view.set_label(STALLED_LABEL);
        self.notifier.notify(ToastLevel::Warning, STALLED_TOAST);
        PollOutcome::Stalled
    }

    fn cancelled(&self) -> PollOutcome {
        info!("Polling for {} cancelled", self.job_id);
        PollOutcome::Cancelled
    }
}
