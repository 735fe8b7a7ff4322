//! Playback Surface
//!
//! The modal that shows an introduction, either bound to a live avatar
//! session or to a pre-rendered video URL. Both variants share one dismissal
//! contract: the close control, Escape, a pointer press on the backdrop and
//! (for pre-rendered video) the natural end of playback all invoke `on_close`,
//! and only the first of them does anything.

use crate::{
    lock,
    models::Member,
    streaming::{
        MediaStream, START_FAILED_MESSAGE, SessionStatus, SessionView, StreamingSessionManager,
    },
};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Enter,
    Other,
}

type KeyListener = Arc<dyn Fn(Key) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, KeyListener)>,
}

/// Process-wide key event source that surfaces subscribe to while mounted.
#[derive(Clone, Default)]
pub struct KeyboardHub {
    listeners: Arc<Mutex<Listeners>>,
}

impl KeyboardHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` until the returned subscription is dropped.
    pub fn subscribe(&self, listener: impl Fn(Key) + Send + Sync + 'static) -> KeySubscription {
        let mut listeners = lock(&self.listeners);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(listener)));
        KeySubscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Delivers `key` to every current listener.
    pub fn dispatch(&self, key: Key) {
        // Listeners may unsubscribe while running, so call them outside the lock.
        let snapshot: Vec<KeyListener> = lock(&self.listeners)
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(key);
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).entries.len()
    }
}

/// Keeps a key listener registered; dropping it unregisters the listener.
pub struct KeySubscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Drop for KeySubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).entries.retain(|(id, _)| *id != self.id);
        }
    }
}

type CloseCallback = Box<dyn FnOnce() + Send>;

/// Runs the close callback at most once, whichever trigger gets there first.
struct CloseLatch {
    on_close: Mutex<Option<CloseCallback>>,
}

impl CloseLatch {
    fn new(on_close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_close: Mutex::new(Some(Box::new(on_close))),
        }
    }

    fn fire(&self) -> bool {
        let callback = lock(&self.on_close).take();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerTarget {
    /// The dimmed area around the modal content.
    Backdrop,
    /// Anywhere inside the modal content.
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceInput {
    CloseButton,
    Key(Key),
    Pointer(PointerTarget),
    MediaEnded,
}

/// Dismissal handle for a mounted surface. Cloneable so that input can be
/// routed without holding on to the surface itself.
#[derive(Clone)]
pub struct SurfaceControls {
    latch: Arc<CloseLatch>,
    closes_on_media_end: bool,
}

impl SurfaceControls {
    /// Returns `true` if this input closed the surface.
    pub fn handle(&self, input: SurfaceInput) -> bool {
        let dismiss = match input {
            SurfaceInput::CloseButton => true,
            SurfaceInput::Key(key) => key == Key::Escape,
            SurfaceInput::Pointer(target) => target == PointerTarget::Backdrop,
            SurfaceInput::MediaEnded => self.closes_on_media_end,
        };
        dismiss && self.latch.fire()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    Url(String),
    Live(Option<MediaStream>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overlay {
    Status(String),
    Error(String),
}

/// What the surface currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub title: String,
    pub source: VideoSource,
    pub native_controls: bool,
    pub overlay: Option<Overlay>,
}

/// Status text laid over a live stream.
pub fn live_overlay(view: &SessionView) -> Option<Overlay> {
    match view.status {
        SessionStatus::Connecting => Some(Overlay::Status("Connecting...".to_string())),
        SessionStatus::Streaming => None,
        SessionStatus::Done => Some(Overlay::Status("Introduction complete".to_string())),
        SessionStatus::Error => Some(Overlay::Error(
            view.error
                .clone()
                .unwrap_or_else(|| START_FAILED_MESSAGE.to_string()),
        )),
    }
}

enum Content {
    PreRendered {
        video_url: String,
    },
    Live {
        view: watch::Receiver<SessionView>,
        // Dropped with the surface, which stops the remote session.
        _session: StreamingSessionManager,
    },
}

/// A mounted playback modal for one member.
pub struct PlaybackSurface {
    member: Member,
    content: Content,
    controls: SurfaceControls,
    _escape: KeySubscription,
}

impl PlaybackSurface {
    /// Mounts a surface playing a finished video from `video_url`.
    pub fn pre_rendered(
        member: Member,
        video_url: impl Into<String>,
        keyboard: &KeyboardHub,
        on_close: impl FnOnce() + Send + 'static,
    ) -> Self {
        let content = Content::PreRendered {
            video_url: video_url.into(),
        };
        Self::mount(member, content, true, keyboard, on_close)
    }

    /// Mounts a surface bound to a live session for `member`, starting the
    /// session immediately. Must be called from within a Tokio runtime.
    pub fn live(
        member: Member,
        mut session: StreamingSessionManager,
        keyboard: &KeyboardHub,
        on_close: impl FnOnce() + Send + 'static,
    ) -> Self {
        let view = session.start(&member);
        let content = Content::Live {
            view,
            _session: session,
        };
        Self::mount(member, content, false, keyboard, on_close)
    }

    fn mount(
        member: Member,
        content: Content,
        closes_on_media_end: bool,
        keyboard: &KeyboardHub,
        on_close: impl FnOnce() + Send + 'static,
    ) -> Self {
        let controls = SurfaceControls {
            latch: Arc::new(CloseLatch::new(on_close)),
            closes_on_media_end,
        };
        let escape_controls = controls.clone();
        let escape = keyboard.subscribe(move |key| {
            escape_controls.handle(SurfaceInput::Key(key));
        });
        debug!(member = %member.name, live = !closes_on_media_end, "Playback surface mounted");
        Self {
            member,
            content,
            controls,
            _escape: escape,
        }
    }

    pub fn member(&self) -> &Member {
        &self.member
    }

    pub fn is_live(&self) -> bool {
        matches!(self.content, Content::Live { .. })
    }

    pub fn controls(&self) -> SurfaceControls {
        self.controls.clone()
    }

    pub fn handle(&self, input: SurfaceInput) -> bool {
        self.controls.handle(input)
    }

    /// The live session's view, for live surfaces.
    pub fn session_view(&self) -> Option<watch::Receiver<SessionView>> {
        match &self.content {
            Content::Live { view, .. } => Some(view.clone()),
            Content::PreRendered { .. } => None,
        }
    }

    pub fn frame(&self) -> Frame {
        match &self.content {
            Content::PreRendered { video_url } => Frame {
                title: self.member.name.clone(),
                source: VideoSource::Url(video_url.clone()),
                native_controls: true,
                overlay: None,
            },
            Content::Live { view, .. } => {
                let view = view.borrow();
                Frame {
                    title: self.member.name.clone(),
                    source: VideoSource::Live(view.media.clone()),
                    native_controls: false,
                    overlay: live_overlay(&view),
                }
            }
        }
    }
}

impl Drop for PlaybackSurface {
    fn drop(&mut self) {
        debug!(member = %self.member.name, "Playback surface unmounted");
    }
}
