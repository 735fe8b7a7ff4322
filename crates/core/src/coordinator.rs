//! Intro Request Coordinator
//!
//! One [`IntroCard`] per team member. Activating a card asks the delivery
//! selector how the introduction should be shown and moves the card through
//! `Idle -> Checking -> {Ready | NotReady | Idle}`. While a card is `Checking`
//! further activations are ignored, so a card never has two requests in flight.

use crate::{
    delivery::{Delivery, DeliverySelector},
    models::{Member, Team},
    playback::Key,
    streaming::{SessionStatus, SessionView},
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

pub const RETRY_MESSAGE: &str = "Could not load this introduction. Please try again.";

/// Where introductions are played once a card knows how to deliver them.
pub trait PlaybackHost: Send + Sync {
    /// Shows the finished video at `video_url` for `member`.
    fn play_video(&self, member: &Member, video_url: &str);

    /// Opens a live session for `member` and returns its view.
    fn start_live(&self, member: &Member) -> watch::Receiver<SessionView>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    Idle,
    Checking,
    Ready,
    NotReady,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardView {
    pub state: CardState,
    pub message: Option<String>,
}

impl CardView {
    fn with(state: CardState, message: Option<String>) -> Self {
        Self { state, message }
    }

    pub fn idle() -> Self {
        Self::with(CardState::Idle, None)
    }

    /// A completed introduction is marked with a badge.
    pub fn shows_ready_badge(&self) -> bool {
        self.state == CardState::Ready
    }

    pub fn accepts_activation(&self) -> bool {
        matches!(self.state, CardState::Idle | CardState::NotReady)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardInput {
    Click,
    Key(Key),
}

pub struct IntroCard {
    team_id: String,
    member_index: usize,
    member: Member,
    selector: Arc<dyn DeliverySelector>,
    host: Arc<dyn PlaybackHost>,
    view: watch::Sender<CardView>,
}

impl IntroCard {
    pub fn new(
        team_id: impl Into<String>,
        member_index: usize,
        member: Member,
        selector: Arc<dyn DeliverySelector>,
        host: Arc<dyn PlaybackHost>,
    ) -> Self {
        Self {
            team_id: team_id.into(),
            member_index,
            member,
            selector,
            host,
            view: watch::Sender::new(CardView::idle()),
        }
    }

    pub fn member(&self) -> &Member {
        &self.member
    }

    pub fn member_index(&self) -> usize {
        self.member_index
    }

    pub fn view(&self) -> CardView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CardView> {
        self.view.subscribe()
    }

    /// Handles a pointer click or a key press while the card has focus.
    /// Only a click or Enter activates the card.
    pub async fn handle_input(&self, input: CardInput) -> bool {
        match input {
            CardInput::Click | CardInput::Key(Key::Enter) => self.activate().await,
            CardInput::Key(_) => false,
        }
    }

    /// Requests this member's introduction. Returns `false` without doing
    /// anything if the card is already checking or already ready.
    #[instrument(skip(self), fields(team_id = %self.team_id, member_index = self.member_index))]
    pub async fn activate(&self) -> bool {
        let started = self.view.send_if_modified(|view| {
            if !view.accepts_activation() {
                return false;
            }
            *view = CardView::with(CardState::Checking, None);
            true
        });
        if !started {
            debug!(state = ?self.view.borrow().state, "Ignoring activation");
            return false;
        }

        match self.selector.select(&self.team_id, self.member_index).await {
            Ok(Delivery::PreRendered { video_url }) => {
                info!(%video_url, "Introduction ready");
                self.view.send_replace(CardView::with(CardState::Ready, None));
                self.host.play_video(&self.member, &video_url);
            }
            Ok(Delivery::Pending { status }) => {
                info!(%status, "Introduction not ready yet");
                let message = format!("{} will be available shortly.", self.member.name);
                self.view
                    .send_replace(CardView::with(CardState::NotReady, Some(message)));
            }
            Ok(Delivery::LiveStream) => {
                let next = self.follow_live_session().await;
                self.view.send_replace(next);
            }
            Err(e) => {
                warn!(error = %e, "Introduction request failed");
                self.view.send_replace(CardView::with(
                    CardState::Idle,
                    Some(RETRY_MESSAGE.to_string()),
                ));
            }
        }
        true
    }

    /// Stays in `Checking` until the live session is streaming or has failed.
    /// Session failures are reported by the surface, not on the card.
    async fn follow_live_session(&self) -> CardView {
        let mut session = self.host.start_live(&self.member);
        let status = session
            .wait_for(|view| view.status != SessionStatus::Connecting)
            .await
            .map(|view| view.status);
        match status {
            Ok(SessionStatus::Streaming | SessionStatus::Done) => {
                CardView::with(CardState::Ready, None)
            }
            Ok(_) | Err(_) => CardView::idle(),
        }
    }

    /// Returns the card to `Idle`, as when the surrounding page is reset.
    pub fn reset(&self) {
        self.view.send_replace(CardView::idle());
    }
}

/// Builds one card per member of a team, indexed by position.
pub fn cards_for_team(
    team: &Team,
    selector: Arc<dyn DeliverySelector>,
    host: Arc<dyn PlaybackHost>,
) -> Vec<IntroCard> {
    team.members
        .iter()
        .enumerate()
        .map(|(index, member)| {
            IntroCard::new(
                team.team_id.clone(),
                index,
                member.clone(),
                selector.clone(),
                host.clone(),
            )
        })
        .collect()
}
