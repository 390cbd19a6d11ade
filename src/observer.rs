//! Progress sink for the batch. The orchestration never renders anything itself.

use log::trace;
use tokio::sync::broadcast::Sender;

use crate::protocol::{Message, SearchMessage};
use crate::track::Track;

/// Receives batch lifecycle and per-track notifications.
pub trait BatchObserver: Send + Sync {
    fn on_batch_started(&self, total: usize);
    fn on_track_state_changed(&self, track: &Track, state: &str);
    fn on_track_highlighted(&self, track: &Track, highlighted: bool);
    fn on_track_processing(&self, track: &Track);
    fn on_track_finished(&self, track: &Track);
    fn on_progress(&self, current: usize, total: usize);
    fn on_batch_finished(&self);
    fn on_batch_cancelled(&self, processed: usize);
    fn on_batch_failed(&self, message: &str);
}

/// Observer that republishes every notification on the event bus.
pub struct BusObserver {
    bus_sender: Sender<Message>,
}

impl BusObserver {
    pub fn new(bus_sender: Sender<Message>) -> Self {
        Self { bus_sender }
    }

    fn publish(&self, message: SearchMessage) {
        // No subscribers is fine; the batch does not depend on anyone listening.
        if self.bus_sender.send(Message::Search(message)).is_err() {
            trace!("BusObserver: no active bus subscribers");
        }
    }
}

impl BatchObserver for BusObserver {
    fn on_batch_started(&self, total: usize) {
        self.publish(SearchMessage::BatchStarted { total });
    }

    fn on_track_state_changed(&self, track: &Track, state: &str) {
        self.publish(SearchMessage::TrackStateChanged {
            path: track.path().to_path_buf(),
            state: state.to_string(),
        });
    }

    fn on_track_highlighted(&self, track: &Track, highlighted: bool) {
        self.publish(SearchMessage::TrackHighlighted {
            path: track.path().to_path_buf(),
            highlighted,
        });
    }

    fn on_track_processing(&self, track: &Track) {
        self.publish(SearchMessage::TrackProcessing(track.path().to_path_buf()));
    }

    fn on_track_finished(&self, track: &Track) {
        self.publish(SearchMessage::TrackFinished(track.path().to_path_buf()));
    }

    fn on_progress(&self, current: usize, total: usize) {
        self.publish(SearchMessage::Progress { current, total });
    }

    fn on_batch_finished(&self) {
        self.publish(SearchMessage::BatchFinished);
    }

    fn on_batch_cancelled(&self, processed: usize) {
        self.publish(SearchMessage::BatchCancelled { processed });
    }

    fn on_batch_failed(&self, message: &str) {
        self.publish(SearchMessage::BatchFailed {
            message: message.to_string(),
        });
    }
}
