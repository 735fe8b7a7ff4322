//! Playback Stage
//!
//! The area of the team page that hosts the playback surface. At most one
//! surface is mounted at a time; mounting a new one unmounts the previous one
//! first, and a surface's `on_close` unmounts only that surface.

use crate::{
    coordinator::PlaybackHost,
    gateway::RequestGateway,
    lock,
    models::Member,
    playback::{Frame, KeyboardHub, PlaybackSurface, SurfaceInput},
    streaming::{AvatarSessionFactory, SessionView, StreamingSessionManager},
};
use std::sync::{
    Arc, Mutex, Weak,
    atomic::{AtomicU64, Ordering},
};
use tokio::sync::watch;
use tracing::info;

type Slot = Arc<Mutex<Option<(u64, PlaybackSurface)>>>;

pub struct PlaybackStage {
    keyboard: KeyboardHub,
    gateway: Arc<dyn RequestGateway>,
    factory: Arc<dyn AvatarSessionFactory>,
    slot: Slot,
    generation: AtomicU64,
}

impl PlaybackStage {
    pub fn new(
        keyboard: KeyboardHub,
        gateway: Arc<dyn RequestGateway>,
        factory: Arc<dyn AvatarSessionFactory>,
    ) -> Self {
        Self {
            keyboard,
            gateway,
            factory,
            slot: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    /// Unmounts the current surface, then mounts the one built by `build`.
    fn mount(&self, build: impl FnOnce(Box<dyn FnOnce() + Send>) -> PlaybackSurface) {
        self.close();

        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let slot = Arc::downgrade(&self.slot);
        let surface = build(Box::new(move || unmount(&slot, id)));
        *lock(&self.slot) = Some((id, surface));
    }

    /// Routes input to the mounted surface. Returns `true` if it closed it.
    pub fn handle(&self, input: SurfaceInput) -> bool {
        let controls = lock(&self.slot)
            .as_ref()
            .map(|(_, surface)| surface.controls());
        controls.is_some_and(|controls| controls.handle(input))
    }

    pub fn is_open(&self) -> bool {
        lock(&self.slot).is_some()
    }

    pub fn frame(&self) -> Option<Frame> {
        lock(&self.slot).as_ref().map(|(_, surface)| surface.frame())
    }

    /// Unmounts whatever is showing, stopping any live session.
    pub fn close(&self) {
        let previous = lock(&self.slot).take();
        drop(previous);
    }
}

fn unmount(slot: &Weak<Mutex<Option<(u64, PlaybackSurface)>>>, id: u64) {
    let Some(slot) = slot.upgrade() else {
        return;
    };
    let removed = {
        let mut guard = lock(&slot);
        match guard.as_ref() {
            Some((mounted, _)) if *mounted == id => guard.take(),
            _ => None,
        }
    };
    drop(removed);
}

impl PlaybackHost for PlaybackStage {
    fn play_video(&self, member: &Member, video_url: &str) {
        info!(member = %member.name, %video_url, "Opening pre-rendered introduction");
        self.mount(|on_close| {
            PlaybackSurface::pre_rendered(member.clone(), video_url, &self.keyboard, on_close)
        });
    }

    fn start_live(&self, member: &Member) -> watch::Receiver<SessionView> {
        info!(member = %member.name, "Opening live introduction");
        let mut view = None;
        self.mount(|on_close| {
            let session = StreamingSessionManager::new(self.gateway.clone(), self.factory.clone());
            let surface = PlaybackSurface::live(member.clone(), session, &self.keyboard, on_close);
            view = surface.session_view();
            surface
        });
        view.unwrap_or_else(|| watch::channel(SessionView::connecting()).1)
    }
}

impl Drop for PlaybackStage {
    fn drop(&mut self) {
        self.close();
    }
}
