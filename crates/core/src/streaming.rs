//! Streaming Session Manager
//!
//! Owns the lifecycle of one live avatar session: fetches a single-use
//! credential, opens the session for a member, reacts to the session's
//! lifecycle events, and always attempts to stop the remote session when the
//! owner lets go of it.
//!
//! The avatar SDK is reached through the [`AvatarSession`] capability so that
//! the manager never depends on the transport underneath it.

use crate::{
    gateway::{GatewayError, RequestGateway, SessionCredential},
    lock,
    models::{AvatarIdentity, Member},
};
use async_trait::async_trait;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{Instrument, debug, info, info_span, warn};

pub const START_FAILED_MESSAGE: &str = "Failed to start streaming session.";
pub const DISCONNECTED_MESSAGE: &str = "Stream disconnected unexpectedly.";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The single-use credential could not be obtained.
    #[error("Failed to obtain a streaming credential: {0}")]
    Credential(#[from] GatewayError),
    #[error("Failed to open avatar session: {0}")]
    Open(String),
    #[error("Avatar command failed: {0}")]
    Command(String),
    /// The stream went away before the introduction finished.
    #[error("{}", DISCONNECTED_MESSAGE)]
    Disconnected,
}

impl SessionError {
    /// Text shown in the live surface's error panel.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Credential(err) => {
                err.detail().unwrap_or(START_FAILED_MESSAGE).to_string()
            }
            SessionError::Disconnected => DISCONNECTED_MESSAGE.to_string(),
            SessionError::Open(_) | SessionError::Command(_) => START_FAILED_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Streaming,
    Done,
    Error,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Done | SessionStatus::Error)
    }
}

/// Opaque handle to the live media produced by an avatar session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream(pub String);

/// What the live surface renders for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub status: SessionStatus,
    pub error: Option<String>,
    pub media: Option<MediaStream>,
}

impl SessionView {
    pub fn connecting() -> Self {
        Self {
            status: SessionStatus::Connecting,
            error: None,
            media: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: SessionStatus::Error,
            error: Some(message.into()),
            media: None,
        }
    }
}

/// Lifecycle events emitted by an avatar session, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Media is flowing and can be bound to a sink.
    StreamReady(MediaStream),
    /// The avatar finished speaking.
    AvatarStopTalking,
    /// The underlying connection closed.
    StreamDisconnected,
}

/// A live avatar session as exposed by the streaming SDK.
#[async_trait]
pub trait AvatarSession: Send + Sync {
    /// Subscribes to lifecycle events. Must be called before `open`.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent>;

    /// Opens the session with the given avatar and voice.
    async fn open(&self, identity: &AvatarIdentity) -> Result<(), SessionError>;

    /// Speaks `text` verbatim.
    async fn speak(&self, text: &str) -> Result<(), SessionError>;

    /// Terminates the remote session.
    async fn stop(&self) -> Result<(), SessionError>;
}

/// Builds an avatar session from a freshly issued credential.
pub trait AvatarSessionFactory: Send + Sync {
    fn create(&self, credential: SessionCredential) -> Arc<dyn AvatarSession>;
}

type SessionSlot = Arc<Mutex<Option<Arc<dyn AvatarSession>>>>;

/// Issues a best-effort stop on a detached task. Errors are swallowed.
///
/// Spawns on `runtime` rather than the caller's context, so a teardown from a
/// thread outside Tokio still reaches the remote session.
fn release(runtime: &Handle, session: Arc<dyn AvatarSession>) {
    runtime.spawn(async move {
        if let Err(e) = session.stop().await {
            debug!(error = %e, "Ignoring failure to stop avatar session");
        }
    });
}

/// Applies session events to the published view.
///
/// Every transition is gated on the shared `cancelled` flag, so once the owner
/// has torn the session down nothing can change what it last saw. `Done` and
/// `Error` are terminal; a late `StreamDisconnected` after `Done` is ignored.
struct SessionMachine {
    view: watch::Sender<SessionView>,
    cancelled: Arc<AtomicBool>,
    intro_text: String,
}

impl SessionMachine {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn is_finished(&self) -> bool {
        self.view.borrow().status.is_terminal()
    }

    /// Returns the text to speak when the stream has just become ready.
    fn apply(&self, event: SessionEvent) -> Option<String> {
        if self.is_cancelled() {
            return None;
        }
        let mut speak = None;
        self.view.send_if_modified(|view| match event {
            SessionEvent::StreamReady(media) if view.status == SessionStatus::Connecting => {
                view.status = SessionStatus::Streaming;
                view.media = Some(media);
                speak = Some(self.intro_text.clone());
                true
            }
            SessionEvent::AvatarStopTalking if view.status == SessionStatus::Streaming => {
                view.status = SessionStatus::Done;
                true
            }
            SessionEvent::StreamDisconnected if !view.status.is_terminal() => {
                view.status = SessionStatus::Error;
                view.error = Some(DISCONNECTED_MESSAGE.to_string());
                true
            }
            _ => false,
        });
        speak
    }

    fn fail(&self, err: &SessionError) {
        if self.is_cancelled() {
            return;
        }
        self.view.send_if_modified(|view| {
            if view.status.is_terminal() {
                return false;
            }
            view.status = SessionStatus::Error;
            view.error = Some(err.user_message());
            true
        });
    }
}

struct ActiveSession {
    cancelled: Arc<AtomicBool>,
    slot: SessionSlot,
    runtime: Handle,
    driver: JoinHandle<()>,
    view: watch::Receiver<SessionView>,
}

impl ActiveSession {
    fn cancel(self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.driver.abort();
        if let Some(session) = lock(&self.slot).take() {
            release(&self.runtime, session);
        }
    }
}

/// Runs at most one live session at a time.
///
/// Dropping the manager tears the current session down.
pub struct StreamingSessionManager {
    gateway: Arc<dyn RequestGateway>,
    factory: Arc<dyn AvatarSessionFactory>,
    active: Option<ActiveSession>,
}

impl StreamingSessionManager {
    pub fn new(gateway: Arc<dyn RequestGateway>, factory: Arc<dyn AvatarSessionFactory>) -> Self {
        Self {
            gateway,
            factory,
            active: None,
        }
    }

    /// Starts a session introducing `member`, tearing down any previous one
    /// first. Must be called from within a Tokio runtime.
    pub fn start(&mut self, member: &Member) -> watch::Receiver<SessionView> {
        self.teardown();

        let (view_tx, view_rx) = watch::channel(SessionView::connecting());
        let cancelled = Arc::new(AtomicBool::new(false));
        let slot: SessionSlot = Arc::new(Mutex::new(None));
        let machine = SessionMachine {
            view: view_tx,
            cancelled: cancelled.clone(),
            intro_text: member.intro_text.clone(),
        };

        let runtime = Handle::current();
        let span = info_span!("avatar_session", member = %member.name);
        let driver = runtime.spawn(
            drive(
                self.gateway.clone(),
                self.factory.clone(),
                member.avatar_identity(),
                machine,
                slot.clone(),
                runtime.clone(),
            )
            .instrument(span),
        );

        self.active = Some(ActiveSession {
            cancelled,
            slot,
            runtime,
            driver,
            view: view_rx.clone(),
        });
        view_rx
    }

    /// The view of the current session, if one is running.
    pub fn view(&self) -> Option<watch::Receiver<SessionView>> {
        self.active.as_ref().map(|active| active.view.clone())
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Suppresses further transitions from the current session and issues a
    /// best-effort remote stop. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if let Some(active) = self.active.take() {
            debug!("Tearing down avatar session");
            active.cancel();
        }
    }
}

impl Drop for StreamingSessionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn drive(
    gateway: Arc<dyn RequestGateway>,
    factory: Arc<dyn AvatarSessionFactory>,
    identity: AvatarIdentity,
    machine: SessionMachine,
    slot: SessionSlot,
    runtime: Handle,
) {
    let credential = match gateway.request_stream_token().await {
        Ok(credential) => credential,
        Err(e) => {
            warn!(error = %e, "Streaming credential request failed");
            machine.fail(&SessionError::Credential(e));
            return;
        }
    };
    if machine.is_cancelled() {
        return;
    }

    let session = factory.create(credential);
    {
        let mut guard = lock(&slot);
        if machine.is_cancelled() {
            drop(guard);
            release(&runtime, session);
            return;
        }
        *guard = Some(session.clone());
    }

    let mut events = session.subscribe();
    if let Err(e) = session.open(&identity).await {
        warn!(error = %e, avatar_id = %identity.avatar_id, "Avatar session failed to open");
        machine.fail(&e);
        return;
    }
    info!(avatar_id = %identity.avatar_id, "Avatar session opened");

    while let Some(event) = events.recv().await {
        debug!(?event, "Avatar session event");
        if let Some(text) = machine.apply(event) {
            if let Err(e) = session.speak(&text).await {
                warn!(error = %e, "Avatar speak command failed");
                machine.fail(&e);
            }
        }
        if machine.is_finished() {
            break;
        }
    }

    if !machine.is_finished() {
        machine.apply(SessionEvent::StreamDisconnected);
    }
    info!(status = ?machine.view.borrow().status, "Avatar session finished");
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// A scripted avatar session: the test pushes events, the session records commands.
    #[derive(Default)]
    pub struct FakeSession {
        pub token: String,
        pub events: Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>,
        pub opened_with: Mutex<Option<AvatarIdentity>>,
        pub spoken: Mutex<Vec<String>>,
        pub stops: AtomicUsize,
        pub fail_open: bool,
        pub opened: Notify,
        pub stopped: Notify,
    }

    impl FakeSession {
        pub fn emit(&self, event: SessionEvent) {
            if let Some(tx) = lock(&self.events).as_ref() {
                let _ = tx.send(event);
            }
        }

        pub fn stop_count(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AvatarSession for FakeSession {
        fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
            let (tx, rx) = mpsc::unbounded_channel();
            *lock(&self.events) = Some(tx);
            rx
        }

        async fn open(&self, identity: &AvatarIdentity) -> Result<(), SessionError> {
            *lock(&self.opened_with) = Some(identity.clone());
            self.opened.notify_one();
            if self.fail_open {
                return Err(SessionError::Open("avatar unavailable".to_string()));
            }
            Ok(())
        }

        async fn speak(&self, text: &str) -> Result<(), SessionError> {
            lock(&self.spoken).push(text.to_string());
            Ok(())
        }

        async fn stop(&self) -> Result<(), SessionError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.stopped.notify_one();
            Err(SessionError::Command("already closed".to_string()))
        }
    }

    #[derive(Default)]
    pub struct FakeFactory {
        pub sessions: Mutex<Vec<Arc<FakeSession>>>,
        pub fail_open: bool,
    }

    impl FakeFactory {
        pub fn session(&self, index: usize) -> Option<Arc<FakeSession>> {
            lock(&self.sessions).get(index).cloned()
        }

        pub fn created(&self) -> usize {
            lock(&self.sessions).len()
        }
    }

    impl AvatarSessionFactory for FakeFactory {
        fn create(&self, credential: SessionCredential) -> Arc<dyn AvatarSession> {
            let session = Arc::new(FakeSession {
                token: credential.expose().to_string(),
                fail_open: self.fail_open,
                ..Default::default()
            });
            lock(&self.sessions).push(session.clone());
            session
        }
    }

    /// Waits until the factory has created session `index` and it has been opened.
    pub async fn opened_session(factory: &FakeFactory, index: usize) -> Arc<FakeSession> {
        let session = tokio::time::timeout(std::time::Duration::from_secs(1), async {
            loop {
                if let Some(session) = factory.session(index) {
                    return session;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("session was never created");
        if lock(&session.opened_with).is_none() {
            tokio::time::timeout(std::time::Duration::from_secs(1), session.opened.notified())
                .await
                .expect("session was never opened");
        }
        session
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::gateway::MockRequestGateway;
    use std::time::Duration;

    fn ana() -> Member {
        Member {
            name: "Ana".to_string(),
            intro_text: "Hi I'm Ana".to_string(),
            avatar_id: Some("avatar-ana".to_string()),
            voice_id: Some("voice-ana".to_string()),
            ..Default::default()
        }
    }

    fn bo() -> Member {
        Member {
            name: "Bo".to_string(),
            intro_text: "Hi I'm Bo".to_string(),
            avatar_id: Some("avatar-bo".to_string()),
            ..Default::default()
        }
    }

    fn token_gateway() -> Arc<dyn RequestGateway> {
        let mut gateway = MockRequestGateway::new();
        gateway
            .expect_request_stream_token()
            .returning(|| Ok(SessionCredential::new("tok")));
        Arc::new(gateway)
    }

    async fn wait_for_status(view: &mut watch::Receiver<SessionView>, status: SessionStatus) {
        tokio::time::timeout(Duration::from_secs(1), view.wait_for(|v| v.status == status))
            .await
            .expect("timed out waiting for session status")
            .expect("session view closed");
    }

    fn machine(view: watch::Sender<SessionView>) -> SessionMachine {
        SessionMachine {
            view,
            cancelled: Arc::new(AtomicBool::new(false)),
            intro_text: "Hi I'm Ana".to_string(),
        }
    }

    #[test]
    fn test_machine_speaks_once_on_ready() {
        let (tx, rx) = watch::channel(SessionView::connecting());
        let machine = machine(tx);

        let first = machine.apply(SessionEvent::StreamReady(MediaStream("m1".into())));
        let second = machine.apply(SessionEvent::StreamReady(MediaStream("m2".into())));

        assert_eq!(first.as_deref(), Some("Hi I'm Ana"));
        assert_eq!(second, None);
        assert_eq!(rx.borrow().status, SessionStatus::Streaming);
        assert_eq!(rx.borrow().media, Some(MediaStream("m1".into())));
    }

    #[test]
    fn test_machine_ignores_disconnect_after_done() {
        let (tx, rx) = watch::channel(SessionView::connecting());
        let machine = machine(tx);

        machine.apply(SessionEvent::StreamReady(MediaStream("m".into())));
        machine.apply(SessionEvent::AvatarStopTalking);
        machine.apply(SessionEvent::StreamDisconnected);
        machine.fail(&SessionError::Disconnected);

        assert_eq!(rx.borrow().status, SessionStatus::Done);
        assert_eq!(rx.borrow().error, None);
    }

    #[test]
    fn test_machine_disconnect_while_streaming_is_error() {
        let (tx, rx) = watch::channel(SessionView::connecting());
        let machine = machine(tx);

        machine.apply(SessionEvent::StreamReady(MediaStream("m".into())));
        machine.apply(SessionEvent::StreamDisconnected);
        machine.apply(SessionEvent::AvatarStopTalking);

        assert_eq!(rx.borrow().status, SessionStatus::Error);
        assert_eq!(rx.borrow().error.as_deref(), Some(DISCONNECTED_MESSAGE));
    }

    #[test]
    fn test_machine_is_silent_once_cancelled() {
        let (tx, rx) = watch::channel(SessionView::connecting());
        let machine = machine(tx);
        machine.cancelled.store(true, Ordering::SeqCst);

        assert_eq!(
            machine.apply(SessionEvent::StreamReady(MediaStream("m".into()))),
            None
        );
        machine.fail(&SessionError::Disconnected);
        assert_eq!(*rx.borrow(), SessionView::connecting());
    }

    #[tokio::test]
    async fn test_session_runs_to_done() {
        let factory = Arc::new(FakeFactory::default());
        let mut manager = StreamingSessionManager::new(token_gateway(), factory.clone());
        let mut view = manager.start(&ana());

        let session = opened_session(&factory, 0).await;
        assert_eq!(session.token, "tok");
        let identity = lock(&session.opened_with).clone().unwrap();
        assert_eq!(identity.avatar_id, "avatar-ana");
        assert_eq!(identity.voice_id.as_deref(), Some("voice-ana"));

        session.emit(SessionEvent::StreamReady(MediaStream("media-1".into())));
        wait_for_status(&mut view, SessionStatus::Streaming).await;
        session.emit(SessionEvent::AvatarStopTalking);
        session.emit(SessionEvent::StreamDisconnected);
        wait_for_status(&mut view, SessionStatus::Done).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(view.borrow().status, SessionStatus::Done);
        assert_eq!(*lock(&session.spoken), vec!["Hi I'm Ana".to_string()]);
    }

    #[tokio::test]
    async fn test_credential_failure_shows_detail() {
        let mut gateway = MockRequestGateway::new();
        gateway.expect_request_stream_token().returning(|| {
            Err(GatewayError::Http {
                status: 500,
                detail: Some("quota exceeded".to_string()),
            })
        });
        let factory = Arc::new(FakeFactory::default());
        let mut manager = StreamingSessionManager::new(Arc::new(gateway), factory.clone());

        let mut view = manager.start(&ana());
        wait_for_status(&mut view, SessionStatus::Error).await;

        assert_eq!(view.borrow().error.as_deref(), Some("quota exceeded"));
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test]
    async fn test_credential_failure_without_detail_uses_fallback() {
        let mut gateway = MockRequestGateway::new();
        gateway
            .expect_request_stream_token()
            .returning(|| Err(GatewayError::Transport("connection refused".to_string())));
        let mut manager =
            StreamingSessionManager::new(Arc::new(gateway), Arc::new(FakeFactory::default()));

        let mut view = manager.start(&ana());
        wait_for_status(&mut view, SessionStatus::Error).await;
        assert_eq!(view.borrow().error.as_deref(), Some(START_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn test_open_failure_is_error_and_still_stopped() {
        let factory = Arc::new(FakeFactory {
            fail_open: true,
            ..Default::default()
        });
        let mut manager = StreamingSessionManager::new(token_gateway(), factory.clone());
        let mut view = manager.start(&ana());

        wait_for_status(&mut view, SessionStatus::Error).await;
        assert_eq!(view.borrow().error.as_deref(), Some(START_FAILED_MESSAGE));

        let session = factory.session(0).unwrap();
        drop(manager);
        tokio::time::timeout(Duration::from_secs(1), session.stopped.notified())
            .await
            .unwrap();
        assert_eq!(session.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_teardown_before_done_stops_and_silences_session() {
        let factory = Arc::new(FakeFactory::default());
        let mut manager = StreamingSessionManager::new(token_gateway(), factory.clone());
        let view = manager.start(&ana());
        let session = opened_session(&factory, 0).await;

        drop(manager);
        tokio::time::timeout(Duration::from_secs(1), session.stopped.notified())
            .await
            .unwrap();

        session.emit(SessionEvent::StreamReady(MediaStream("late".into())));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(session.stop_count(), 1);
        assert_eq!(view.borrow().status, SessionStatus::Connecting);
        assert!(lock(&session.spoken).is_empty());
    }

    #[tokio::test]
    async fn test_switching_member_tears_down_previous_session() {
        let factory = Arc::new(FakeFactory::default());
        let mut manager = StreamingSessionManager::new(token_gateway(), factory.clone());

        let first_view = manager.start(&ana());
        let first = opened_session(&factory, 0).await;

        let mut second_view = manager.start(&bo());
        tokio::time::timeout(Duration::from_secs(1), first.stopped.notified())
            .await
            .unwrap();
        let second = opened_session(&factory, 1).await;

        first.emit(SessionEvent::StreamReady(MediaStream("stale".into())));
        second.emit(SessionEvent::StreamReady(MediaStream("fresh".into())));
        wait_for_status(&mut second_view, SessionStatus::Streaming).await;

        assert_eq!(first_view.borrow().status, SessionStatus::Connecting);
        assert_eq!(
            second_view.borrow().media,
            Some(MediaStream("fresh".into()))
        );
        assert_eq!(second.stop_count(), 0);
        assert!(manager.is_active());

        manager.teardown();
        manager.teardown();
        assert!(!manager.is_active());
    }

    #[tokio::test]
    async fn test_teardown_off_runtime_thread_still_stops_session() {
        let factory = Arc::new(FakeFactory::default());
        let mut manager = StreamingSessionManager::new(token_gateway(), factory.clone());
        let view = manager.start(&ana());
        let session = opened_session(&factory, 0).await;

        std::thread::spawn(move || drop(manager)).join().unwrap();
        tokio::time::timeout(Duration::from_secs(1), session.stopped.notified())
            .await
            .unwrap();

        assert_eq!(session.stop_count(), 1);
        assert_eq!(view.borrow().status, SessionStatus::Connecting);
    }

    #[tokio::test]
    async fn test_closed_event_stream_counts_as_disconnect() {
        let factory = Arc::new(FakeFactory::default());
        let mut manager = StreamingSessionManager::new(token_gateway(), factory.clone());
        let mut view = manager.start(&ana());
        let session = opened_session(&factory, 0).await;

        session.emit(SessionEvent::StreamReady(MediaStream("m".into())));
        wait_for_status(&mut view, SessionStatus::Streaming).await;
        lock(&session.events).take();

        wait_for_status(&mut view, SessionStatus::Error).await;
        assert_eq!(view.borrow().error.as_deref(), Some(DISCONNECTED_MESSAGE));
    }
}
