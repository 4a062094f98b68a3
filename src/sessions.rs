use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::api::ProgressSource;
use crate::poller::{PollJob, PollOutcome};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub job_id: String,
    pub session_id: Uuid,
    pub started_at: u64, // unix seconds
}

struct SessionEntry {
    info: SessionInfo,
    token: CancellationToken,
    outcome: watch::Receiver<Option<PollOutcome>>,
}

/// Active poll sessions, at most one per job id.
#[derive(Clone, Default)]
pub struct Sessions {
    inner: Arc<Mutex<HashMap<String, SessionEntry>>>,
    // Completed sessions whose bar is still shown, keyed like `inner`.
    hides: Arc<Mutex<HashMap<String, (Uuid, CancellationToken)>>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `job`, replacing (and cancelling) any session already running for its id.
    pub fn start<S>(&self, job: PollJob<S>) -> Uuid
    where
        S: ProgressSource + 'static,
    {
        let job_id = job.job_id.clone();
        let session_id = Uuid::new_v4();
        let token = CancellationToken::new();
        let (outcome_tx, outcome_rx) = watch::channel(None);

        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        {
            let mut sessions = self.inner.lock().unwrap();
            if let Some(previous) = sessions.remove(&job_id) {
                info!(
                    "Replacing poll session {} for {}",
                    previous.info.session_id, job_id
                );
                previous.token.cancel();
            }
            if let Some((_, hide)) = self.hides.lock().unwrap().remove(&job_id) {
                hide.cancel();
            }
            sessions.insert(
                job_id.clone(),
                SessionEntry {
                    info: SessionInfo {
                        job_id: job_id.clone(),
                        session_id,
                        started_at,
                    },
                    token: token.clone(),
                    outcome: outcome_rx,
                },
            );
        }

        let sessions = self.clone();
        tokio::spawn(async move {
            let outcome = job.run(token).await;
            info!("Poll session {} for {} ended: {:?}", session_id, job_id, outcome);
            let hide = sessions.finish(&job_id, session_id, outcome == PollOutcome::Completed);
            let _ = outcome_tx.send(Some(outcome));

            if let Some(hide) = hide {
                job.hide_after_delay(hide).await;
                let mut hides = sessions.hides.lock().unwrap();
                if hides.get(&job_id).is_some_and(|(id, _)| *id == session_id) {
                    hides.remove(&job_id);
                }
            }
        });

        session_id
    }

    /// Removes the entry only if it still belongs to `session_id`. A completed
    /// session gets a token guarding its pending hide, which the next `start`
    /// for the same id cancels.
    fn finish(
        &self,
        job_id: &str,
        session_id: Uuid,
        completed: bool,
    ) -> Option<CancellationToken> {
        let mut sessions = self.inner.lock().unwrap();
        if !sessions
            .get(job_id)
            .is_some_and(|e| e.info.session_id == session_id)
        {
            return None;
        }
        sessions.remove(job_id);
        if !completed {
            return None;
        }
        let token = CancellationToken::new();
        self.hides
            .lock()
            .unwrap()
            .insert(job_id.to_string(), (session_id, token.clone()));
        Some(token)
    }

    pub fn cancel(&self, job_id: &str) -> bool {
        let entry = self.inner.lock().unwrap().remove(job_id);
        match entry {
            Some(entry) => {
                info!("Cancelling poll session {} for {}", entry.info.session_id, job_id);
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Stops everything still drawing on the display of `job_id`: the running
    /// session and any pending post-completion hide.
    pub fn release(&self, job_id: &str) {
        let entry = self.inner.lock().unwrap().remove(job_id);
        if let Some(entry) = entry {
            info!("Releasing poll session {} for {}", entry.info.session_id, job_id);
            entry.token.cancel();
        }
        if let Some((_, hide)) = self.hides.lock().unwrap().remove(job_id) {
            hide.cancel();
        }
    }

    pub fn cancel_all(&self) {
        let drained: Vec<SessionEntry> = self.inner.lock().unwrap().drain().map(|(_, e)| e).collect();
        for entry in drained {
            entry.token.cancel();
        }
        for (_, (_, hide)) in self.hides.lock().unwrap().drain() {
            hide.cancel();
        }
    }

    pub fn active(&self) -> Vec<SessionInfo> {
        let sessions = self.inner.lock().unwrap();
        let mut list: Vec<SessionInfo> = sessions.values().map(|e| e.info.clone()).collect();
        list.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.job_id.cmp(&b.job_id)));
        list
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        self.inner.lock().unwrap().contains_key(job_id)
    }

    /// Waits for the current session of `job_id` to finish.
    /// `None` if no session is running for it.
    pub async fn wait(&self, job_id: &str) -> Option<PollOutcome> {
        let mut rx = {
            let sessions = self.inner.lock().unwrap();
            sessions.get(job_id)?.outcome.clone()
        };
        let outcome = rx.wait_for(|o| o.is_some()).await.ok()?;
        outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::COMPLETED_TOAST;
    use crate::poller::testing::*;
    use crate::ui::ToastLevel;
    use std::time::Duration;

    fn endless() -> Arc<ScriptedSource> {
        Arc::new(ScriptedSource::new(
            (0..1000).map(|i| downloading((i % 100) as f64)).collect(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_session_removes_itself() {
        let sessions = Sessions::new();
        let view = Arc::new(RecordingView::default());
        let source = Arc::new(ScriptedSource::new(vec![downloading(50.0), status("completed")]));

        sessions.start(job(source, view, fast_config()));
        assert!(sessions.is_active("vid"));

        assert_eq!(sessions.wait("vid").await, Some(PollOutcome::Completed));
        tokio::task::yield_now().await;
        assert!(!sessions.is_active("vid"));
        assert_eq!(sessions.wait("vid").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_session_is_gone_during_hide_delay() {
        let sessions = Sessions::new();
        let view = Arc::new(RecordingView::default());
        let source = Arc::new(ScriptedSource::new(vec![status("completed")]));
        sessions.start(job(source.clone(), view.clone(), fast_config()));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(source.requests(), 1);
        assert_eq!(
            view.toasts(),
            vec![(ToastLevel::Success, COMPLETED_TOAST.to_string())]
        );
        assert!(!sessions.is_active("vid"));
        assert!(sessions.active().is_empty());
        assert!(!sessions.cancel("vid"));
        assert!(!view.calls().contains(&Call::Hide));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(view.calls().last(), Some(&Call::Hide));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_at_completion() {
        let sessions = Sessions::new();
        let view = Arc::new(RecordingView::default());
        let source = Arc::new(ScriptedSource::new(vec![status("completed")]));
        sessions.start(job(source, view, fast_config()));
        let started = tokio::time::Instant::now();

        assert_eq!(sessions.wait("vid").await, Some(PollOutcome::Completed));
        assert!(started.elapsed() < Duration::from_millis(1100));
        assert!(!sessions.is_active("vid"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_during_hide_delay_keeps_new_bar() {
        let sessions = Sessions::new();
        let first_view = Arc::new(RecordingView::default());
        let first_source = Arc::new(ScriptedSource::new(vec![status("completed")]));
        sessions.start(job(first_source, first_view.clone(), fast_config()));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let second_view = Arc::new(RecordingView::default());
        sessions.start(job(endless(), second_view.clone(), fast_config()));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!first_view.calls().contains(&Call::Hide));
        assert!(!second_view.calls().contains(&Call::Hide));
        assert!(sessions.is_active("vid"));

        sessions.cancel_all();
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_cancels_previous_session() {
        let sessions = Sessions::new();
        let first_source = endless();
        let first_view = Arc::new(RecordingView::default());
        let first = sessions.start(job(first_source.clone(), first_view, fast_config()));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(first_source.requests(), 1);

        let second_view = Arc::new(RecordingView::default());
        let second_source = Arc::new(ScriptedSource::new(vec![status("completed")]));
        let second = sessions.start(job(second_source, second_view, fast_config()));
        assert_ne!(first, second);

        let active = sessions.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session_id, second);

        assert_eq!(sessions.wait("vid").await, Some(PollOutcome::Completed));
        // The replaced session never polled again.
        assert_eq!(first_source.requests(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_cancel() {
        let sessions = Sessions::new();
        let source = endless();
        let view = Arc::new(RecordingView::default());
        sessions.start(job(source.clone(), view, fast_config()));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(sessions.cancel("vid"));
        assert!(!sessions.cancel("vid"));
        assert!(sessions.active().is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.requests(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_stops_session_and_pending_hide() {
        let sessions = Sessions::new();
        let view = Arc::new(RecordingView::default());
        let source = Arc::new(ScriptedSource::new(vec![status("completed")]));
        sessions.start(job(source, view.clone(), fast_config()));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        sessions.release("vid");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!view.calls().contains(&Call::Hide));

        let source = endless();
        sessions.start(job(source.clone(), Arc::new(RecordingView::default()), fast_config()));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        sessions.release("vid");
        assert!(!sessions.is_active("vid"));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.requests(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let sessions = Sessions::new();
        let a = endless();
        let b = endless();
        let mut job_b = job(b.clone(), Arc::new(RecordingView::default()), fast_config());
        job_b.job_id = "other".into();

        sessions.start(job(a.clone(), Arc::new(RecordingView::default()), fast_config()));
        sessions.start(job_b);
        assert_eq!(sessions.active().len(), 2);

        sessions.cancel_all();
        assert!(sessions.active().is_empty());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(a.requests(), 0);
        assert_eq!(b.requests(), 0);
    }
}
