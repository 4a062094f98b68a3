use serde::Serialize;
use tokio::sync::broadcast;

use crate::api::VideoInfo;
use crate::controller::{ChatMessage, ChatRole};
use crate::format::{format_bytes, format_duration};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Everything the client renders, as a stream of state changes.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    Show { display: String },
    Progress { display: String, percent: u8 },
    Label { display: String, text: String },
    Hide { display: String },
    Toast { level: ToastLevel, message: String },
    Loading { active: bool },
    Video { info: VideoInfo },
    Chat { message: ChatMessage },
}

impl UiEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A progress bar plus its text label.
pub trait ProgressView: Send + Sync {
    fn show(&self);
    fn set_percent(&self, percent: u8);
    fn set_label(&self, text: &str);
    fn hide(&self);
}

/// Transient user notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: ToastLevel, message: &str);
}

impl Notifier for broadcast::Sender<UiEvent> {
    fn notify(&self, level: ToastLevel, message: &str) {
        let _ = self.send(UiEvent::Toast {
            level,
            message: message.to_string(),
        });
    }
}

/// Progress display bound to one key; several can share a channel.
#[derive(Clone)]
pub struct BroadcastView {
    display: String,
    tx: broadcast::Sender<UiEvent>,
}

impl BroadcastView {
    pub fn new(display: impl Into<String>, tx: broadcast::Sender<UiEvent>) -> Self {
        Self {
            display: display.into(),
            tx,
        }
    }

    fn emit(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }
}

impl ProgressView for BroadcastView {
    fn show(&self) {
        self.emit(UiEvent::Show {
            display: self.display.clone(),
        });
    }

    fn set_percent(&self, percent: u8) {
        self.emit(UiEvent::Progress {
            display: self.display.clone(),
            percent,
        });
    }

    fn set_label(&self, text: &str) {
        self.emit(UiEvent::Label {
            display: self.display.clone(),
            text: text.to_string(),
        });
    }

    fn hide(&self) {
        self.emit(UiEvent::Hide {
            display: self.display.clone(),
        });
    }
}

impl Notifier for BroadcastView {
    fn notify(&self, level: ToastLevel, message: &str) {
        self.tx.notify(level, message);
    }
}

const BAR_WIDTH: usize = 30;

/// Console rendering of a single event. `None` means nothing to print.
pub fn render(event: &UiEvent) -> Option<String> {
    match event {
        UiEvent::Show { display } => Some(format!("[{}] download started", display)),
        UiEvent::Progress { display, percent } => {
            let filled = (*percent as usize * BAR_WIDTH) / 100;
            Some(format!(
                "[{}] [{}{}] {:>3}%",
                display,
                "#".repeat(filled),
                "-".repeat(BAR_WIDTH - filled),
                percent
            ))
        }
        UiEvent::Label { display, text } => Some(format!("[{}] {}", display, text)),
        UiEvent::Hide { .. } => None,
        UiEvent::Toast { level, message } => {
            let tag = match level {
                ToastLevel::Info => "info",
                ToastLevel::Success => "ok",
                ToastLevel::Warning => "warn",
                ToastLevel::Error => "error",
            };
            Some(format!("({}) {}", tag, message))
        }
        UiEvent::Loading { active } => active.then(|| "Loading...".to_string()),
        UiEvent::Video { info } => {
            let mut out = format!(
                "{} [{}]\n  id: {}",
                info.title,
                info.duration.map(format_duration).unwrap_or_default(),
                info.id
            );
            for fmt in &info.formats {
                out.push_str(&format!(
                    "\n  {:>6}  {} - {} ({})",
                    fmt.format_id,
                    fmt.ext.to_uppercase(),
                    fmt.resolution,
                    format_bytes(fmt.filesize)
                ));
            }
            Some(out)
        }
        UiEvent::Chat { message } => {
            let who = match message.role {
                ChatRole::User => "you",
                ChatRole::Ai => "ai",
                ChatRole::System => "system",
            };
            Some(format!("{}> {}", who, message.text))
        }
    }
}
