//! Bus consumer printing batch progress to the log.

use std::path::Path;

use log::{debug, error, info, warn};
use tokio::sync::broadcast::{error::RecvError, Receiver};

use crate::protocol::{Message, SearchMessage};

/// Reports search notifications until the batch publishes its terminal message.
pub struct ConsoleReporter {
    bus_consumer: Receiver<Message>,
    total: usize,
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

impl ConsoleReporter {
    pub fn new(bus_consumer: Receiver<Message>) -> Self {
        Self {
            bus_consumer,
            total: 0,
        }
    }

    /// Line to print for `message`, if it is worth printing at all.
    fn describe(&mut self, message: &SearchMessage) -> Option<String> {
        match message {
            SearchMessage::BatchStarted { total } => {
                self.total = *total;
                Some(format!("Searching covers for {total} track(s)"))
            }
            SearchMessage::TrackStateChanged { path, state } => {
                Some(format!("{}: {}", file_label(path), state))
            }
            SearchMessage::Progress { current, total } if *current > 0 => {
                Some(format!("[{current}/{total}]"))
            }
            SearchMessage::BatchFinished => Some(format!("Done, {} track(s) checked", self.total)),
            SearchMessage::BatchCancelled { processed } => Some(format!(
                "Cancelled after {processed} of {} track(s)",
                self.total
            )),
            SearchMessage::BatchFailed { message } => Some(format!("Search failed: {message}")),
            SearchMessage::Progress { .. }
            | SearchMessage::TrackHighlighted { .. }
            | SearchMessage::TrackProcessing(_)
            | SearchMessage::TrackFinished(_) => None,
        }
    }

    fn handle_message(&mut self, message: SearchMessage) -> bool {
        let terminal = message.is_terminal();
        match (self.describe(&message), &message) {
            (Some(line), SearchMessage::BatchFailed { .. }) => error!("{}", line),
            (Some(line), SearchMessage::BatchCancelled { .. }) => warn!("{}", line),
            (Some(line), SearchMessage::Progress { .. }) => debug!("{}", line),
            (Some(line), _) => info!("{}", line),
            (None, _) => {}
        }
        terminal
    }

    /// Starts the blocking reporter loop. Returns the terminal message, if one arrived.
    pub fn run(&mut self) -> Option<SearchMessage> {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Search(message)) => {
                    if self.handle_message(message.clone()) {
                        return Some(message);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("ConsoleReporter: bus lagged by {} messages", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
