use crate::config::Settings;
use crate::sessions::Sessions;
use crate::ui::UiEvent;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub sessions: Sessions,
    pub tx: broadcast::Sender<UiEvent>,
}
