//! Terminal playback host.

use std::sync::{Mutex, MutexGuard, PoisonError};
use teamintro_core::{
    coordinator::{CardState, CardView, PlaybackHost},
    models::Member,
    streaming::SessionView,
};
use tokio::sync::watch;
use tracing::warn;

pub const LIVE_UNSUPPORTED: &str =
    "This backend delivers introductions as live streams, which need a media-capable client.";

/// What the terminal was asked to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Playback {
    Video { member: String, video_url: String },
    LiveUnsupported { member: String },
}

/// A `PlaybackHost` that records the request so it can be printed.
/// A terminal has no video sink, so live sessions fail immediately.
#[derive(Default)]
pub struct ConsoleHost {
    last: Mutex<Option<Playback>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConsoleHost {
    pub fn last(&self) -> Option<Playback> {
        lock(&self.last).clone()
    }

    fn record(&self, playback: Playback) {
        *lock(&self.last) = Some(playback);
    }
}

impl PlaybackHost for ConsoleHost {
    fn play_video(&self, member: &Member, video_url: &str) {
        self.record(Playback::Video {
            member: member.name.clone(),
            video_url: video_url.to_string(),
        });
    }

    fn start_live(&self, member: &Member) -> watch::Receiver<SessionView> {
        warn!(member = %member.name, "Live delivery requested in a terminal");
        self.record(Playback::LiveUnsupported {
            member: member.name.clone(),
        });
        watch::channel(SessionView::failed(LIVE_UNSUPPORTED)).1
    }
}

/// One line describing a card after activation.
pub fn describe(view: &CardView, playback: Option<&Playback>) -> String {
    match (view.state, playback) {
        (CardState::Ready, Some(Playback::Video { member, video_url })) => {
            format!("[ready] {}: {}", member, video_url)
        }
        (_, Some(Playback::LiveUnsupported { .. })) => LIVE_UNSUPPORTED.to_string(),
        (CardState::Checking, _) => "Still checking...".to_string(),
        _ => view.message.clone().unwrap_or_default(),
    }
}
