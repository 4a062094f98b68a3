use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api::{ApiError, BackendClient, VideoInfo};
use crate::poller::{PollJob, PollerConfig};
use crate::progress::STARTING_LABEL;
use crate::sessions::Sessions;
use crate::ui::{BroadcastView, Notifier, ProgressView, ToastLevel, UiEvent};

pub const CHAT_INTRO: &str = "Click \"Analyze Video\" to start chatting about the content.";
pub const ANALYSIS_READY: &str = "Video is being analyzed. You can ask questions now.";

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Please enter a YouTube URL")]
    EmptyUrl,

    #[error("No video selected")]
    NoVideo,

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Ai,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AnalysisState {
    Idle,
    InProgress,
    Failed,
}

/// Stops polling `video_id` and clears its progress display.
pub fn cancel_download(
    sessions: &Sessions,
    tx: &broadcast::Sender<UiEvent>,
    video_id: &str,
) -> bool {
    if !sessions.cancel(video_id) {
        return false;
    }
    BroadcastView::new(video_id, tx.clone()).hide();
    tx.notify(ToastLevel::Info, "Download cancelled");
    true
}

struct CurrentVideo {
    url: String,
    info: VideoInfo,
}

/// Client-side state of the downloader/chat screen.
pub struct Controller {
    client: Arc<BackendClient>,
    sessions: Sessions,
    tx: broadcast::Sender<UiEvent>,
    poller: PollerConfig,
    current: Option<CurrentVideo>,
    analysis: AnalysisState,
    chat_enabled: bool,
    transcript: Vec<ChatMessage>,
}

impl Controller {
    pub fn new(
        client: Arc<BackendClient>,
        sessions: Sessions,
        tx: broadcast::Sender<UiEvent>,
        poller: PollerConfig,
    ) -> Self {
        Self {
            client,
            sessions,
            tx,
            poller,
            current: None,
            analysis: AnalysisState::Idle,
            chat_enabled: false,
            transcript: Vec::new(),
        }
    }

    pub fn current_video(&self) -> Option<&VideoInfo> {
        self.current.as_ref().map(|c| &c.info)
    }

    pub fn chat_enabled(&self) -> bool {
        self.chat_enabled
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    fn emit(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }

    fn toast(&self, level: ToastLevel, message: &str) {
        self.tx.notify(level, message);
    }

    fn append(&mut self, role: ChatRole, text: impl Into<String>) -> ChatMessage {
        let message = ChatMessage {
            role,
            text: text.into(),
        };
        self.transcript.push(message.clone());
        self.emit(UiEvent::Chat {
            message: message.clone(),
        });
        message
    }

    fn view_for(&self, video_id: &str) -> BroadcastView {
        BroadcastView::new(video_id, self.tx.clone())
    }

    pub async fn search(&mut self, url: &str) -> Result<VideoInfo, ControllerError> {
        let url = url.trim();
        if url.is_empty() {
            self.toast(ToastLevel::Warning, &ControllerError::EmptyUrl.to_string());
            return Err(ControllerError::EmptyUrl);
        }

        self.emit(UiEvent::Loading { active: true });
        let result = self.client.video_info(url).await;
        self.emit(UiEvent::Loading { active: false });

        let info = match result {
            Ok(info) => info,
            Err(e) => {
                error!("Failed to fetch video info for {}: {}", url, e);
                self.toast(ToastLevel::Error, "Failed to fetch video info");
                return Err(e.into());
            }
        };

        info!("Loaded {} ({} formats)", info.id, info.formats.len());
        self.current = Some(CurrentVideo {
            url: url.to_string(),
            info: info.clone(),
        });
        self.emit(UiEvent::Video { info: info.clone() });

        self.transcript.clear();
        self.analysis = AnalysisState::Idle;
        self.chat_enabled = false;
        self.append(ChatRole::System, CHAT_INTRO);

        Ok(info)
    }

    pub async fn start_download(
        &mut self,
        video_id: &str,
        format_id: &str,
    ) -> Result<Uuid, ControllerError> {
        let url = self
            .current
            .as_ref()
            .map(|c| c.url.clone())
            .ok_or(ControllerError::NoVideo)?;

        // A previous session for this id must not draw over the reset bar.
        self.sessions.release(video_id);
        let view = Arc::new(self.view_for(video_id));
        view.show();
        view.set_percent(0);
        view.set_label(STARTING_LABEL);

        if let Err(e) = self.client.start_download(&url, format_id, video_id).await {
            error!("Download request for {} failed: {}", video_id, e);
            view.hide();
            self.toast(ToastLevel::Error, "Download request failed");
            return Err(e.into());
        }

        info!("Download of {} ({}) requested", video_id, format_id);
        let job = PollJob {
            job_id: video_id.to_string(),
            source: self.client.clone(),
            view: view.clone(),
            notifier: view,
            config: self.poller.clone(),
        };
        Ok(self.sessions.start(job))
    }

    pub fn cancel_download(&self, video_id: &str) -> bool {
        cancel_download(&self.sessions, &self.tx, video_id)
    }

    /// `None` when there is no video to analyze.
    pub async fn analyze(&mut self) -> Option<AnalysisState> {
        let url = self.current.as_ref()?.url.clone();

        match self.client.analyze(&url).await {
            Ok(ack) if ack.status.contains("started") => {
                self.analysis = AnalysisState::InProgress;
                self.chat_enabled = true;
                self.toast(ToastLevel::Info, "Analysis started. You can chat shortly.");
                self.append(ChatRole::System, ANALYSIS_READY);
            }
            Ok(ack) => {
                warn!("Analysis not started: {}", ack.status);
                self.analysis = AnalysisState::Failed;
                self.toast(ToastLevel::Warning, &ack.status);
            }
            Err(e) => {
                error!("Analysis request failed: {}", e);
                self.analysis = AnalysisState::Idle;
                self.toast(ToastLevel::Error, &format!("Analysis failed: {}", e));
            }
        }
        Some(self.analysis)
    }

    /// Returns the reply appended to the transcript, or `None` if nothing was sent.
    pub async fn send_message(&mut self, text: &str) -> Option<ChatMessage> {
        let text = text.trim();
        if text.is_empty() || !self.chat_enabled {
            return None;
        }
        let video_id = self.current.as_ref()?.info.id.clone();

        self.append(ChatRole::User, text);
        let reply = match self.client.chat(&video_id, text).await {
            Ok(answer) => self.append(ChatRole::Ai, answer.answer),
            Err(e) => {
                warn!("Chat request failed: {}", e);
                self.append(ChatRole::System, format!("Error: {}", e))
            }
        };
        Some(reply)
    }
}
