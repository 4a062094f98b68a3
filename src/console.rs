use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::controller::{Controller, ControllerError};
use crate::ui::{UiEvent, render};

const HELP: &str = "\
commands:
  info <url>            look up a video and list its formats
  download <format_id>  download the current video in that format
  analyze               analyze the current video's transcript
  chat <question>       ask about the current video
  cancel [video_id]     stop tracking a download
  wait [video_id]       block until a download finishes
  sessions              list downloads being tracked
  history               show the chat so far
  quit";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Info(String),
    Download(String),
    Analyze,
    Chat(String),
    Cancel(Option<String>),
    Wait(Option<String>),
    Sessions,
    History,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let arg = (!rest.is_empty()).then(|| rest.to_string());

    match word.to_ascii_lowercase().as_str() {
        "info" | "search" => Some(Command::Info(rest.to_string())),
        "download" | "dl" => arg.map(Command::Download),
        "analyze" => Some(Command::Analyze),
        "chat" | "ask" => Some(Command::Chat(rest.to_string())),
        "cancel" => Some(Command::Cancel(arg)),
        "wait" => Some(Command::Wait(arg)),
        "sessions" => Some(Command::Sessions),
        "history" => Some(Command::History),
        "help" | "?" => Some(Command::Help),
        "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

/// Prints UI events as they arrive.
pub fn spawn_renderer(mut rx: broadcast::Receiver<UiEvent>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(line) = render(&event) {
                        println!("{}", line);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Console renderer skipped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Reads commands from stdin until `quit` or EOF.
pub async fn run(mut controller: Controller) {
    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        };

        let Some(command) = parse_command(&line) else {
            if !line.trim().is_empty() {
                println!("unknown command, try `help`");
            }
            continue;
        };
        debug!("Console command: {:?}", command);

        match command {
            Command::Info(url) => {
                // Failures are already surfaced as toasts.
                let _ = controller.search(&url).await;
            }
            Command::Download(format_id) => {
                let Some(video_id) = controller.current_video().map(|v| v.id.clone()) else {
                    println!("{}: use `info <url>` first", ControllerError::NoVideo);
                    continue;
                };
                let _ = controller.start_download(&video_id, &format_id).await;
            }
            Command::Analyze => {
                if controller.analyze().await.is_none() {
                    println!("{}: use `info <url>` first", ControllerError::NoVideo);
                }
            }
            Command::Chat(text) => {
                if controller.send_message(&text).await.is_none() && !controller.chat_enabled() {
                    println!("chat is available once `analyze` has started");
                }
            }
            Command::Cancel(target) => {
                let target = target.or_else(|| controller.current_video().map(|v| v.id.clone()));
                match target {
                    Some(id) if controller.cancel_download(&id) => {}
                    Some(id) => println!("no active download for {}", id),
                    None => println!("nothing to cancel"),
                }
            }
            Command::Wait(target) => {
                let target = target.or_else(|| controller.current_video().map(|v| v.id.clone()));
                let outcome = match &target {
                    Some(id) => controller.sessions().wait(id).await,
                    None => None,
                };
                match (target, outcome) {
                    (Some(id), Some(outcome)) => println!("{}: {:?}", id, outcome),
                    (Some(id), None) => println!("no active download for {}", id),
                    (None, _) => println!("nothing to wait for"),
                }
            }
            Command::Sessions => {
                let active = controller.sessions().active();
                if active.is_empty() {
                    println!("no active downloads");
                }
                for s in active {
                    println!("{}  session {}  since {}", s.job_id, s.session_id, s.started_at);
                }
            }
            Command::History => {
                for message in controller.transcript() {
                    if let Some(line) = render(&UiEvent::Chat {
                        message: message.clone(),
                    }) {
                        println!("{}", line);
                    }
                }
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
        }
    }
}
