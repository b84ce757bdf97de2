//! The forum session manager: one explicit session object per open
//! forum, owning the real-time connection, the message log, the typing
//! state, and the optimistic send pipeline.
//!
//! All mutable state lives in a single actor task; the owning caller
//! talks to it through a [`SessionHandle`] (commands in, state
//! snapshots out). Every timer — flush, typing idle, typing sweep,
//! health ping, reconnect, send retry — is a deadline inside the
//! actor's `select!` loop, so teardown can cancel all of them at once.

pub mod connection;
pub mod events;
pub mod ingest;
pub mod roster;
pub mod send;
pub mod transport;
pub mod typing;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::ForumApi;
use crate::auth::credentials::Credentials;
use crate::config::ClientConfig;
use crate::error::ApiError;

use connection::{
    ConnectionState, ConnectionStatus, PingTracker, ReconnectPolicy, INITIAL_RECONNECT_DELAY,
    PING_INTERVAL, PING_WARN_LATENCY,
};
use events::{Attendee, ChatMessage, ClientEvent, ServerEvent};
use ingest::{IngestBuffer, MessageLog, FLUSH_INTERVAL};
use roster::Roster;
use send::{PersistResolution, SEND_RETRY_DELAY};
use transport::{CloseReason, LinkEvent, Transport, TransportLink};
use typing::{TypingDebounce, TypingDisplay, TypingRoster, TYPING_IDLE, TYPING_SWEEP_INTERVAL};

/// Session tuning taken from config. Protocol constants (flush window,
/// idle debounce, backoff bounds) are fixed in their modules.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Reconnect attempts before the session goes terminal; 0 means
    /// unlimited.
    pub max_reconnect_attempts: u32,
    /// TTL for remote typers that vanish without a stop signal; `None`
    /// disables eviction (the original client's behavior).
    pub typing_ttl: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 0,
            typing_ttl: Some(Duration::from_secs(5)),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_reconnect_attempts: config.session.max_reconnect_attempts,
            typing_ttl: match config.session.typing_ttl_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        }
    }
}

/// Severity of a user-visible notice. Notices are non-blocking — the
/// session is always left in a well-defined state alongside one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

/// State pushed from the session to its owner. Collection updates are
/// whole-snapshot replacements, never in-place deltas.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    Connection(ConnectionStatus),
    Messages(Vec<ChatMessage>),
    Attendees(Vec<Attendee>),
    Typing(TypingDisplay),
    Notice(Notice),
    /// The forum was deleted server-side; the session has ended.
    ForumDeleted,
}

enum Command {
    InputChanged(String),
    Send(String),
    RetryNow,
    JoinForum { passcode: Option<String> },
    Shutdown(oneshot::Sender<()>),
}

enum Internal {
    PersistDone {
        temp_id: String,
        content: String,
        is_retry: bool,
        outcome: Result<(), ApiError>,
    },
    JoinDone {
        outcome: Result<(), ApiError>,
    },
}

#[derive(PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Owner-side handle. Dropping it (or calling [`shutdown`]) tears the
/// session down: final buffer flush, timers cancelled, leave signal,
/// transport closed.
///
/// [`shutdown`]: SessionHandle::shutdown
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    updates: mpsc::UnboundedReceiver<SessionUpdate>,
    roster: Roster,
    task: tokio::task::JoinHandle<()>,
}

impl SessionHandle {
    /// Report the current composer content (keystroke activity).
    pub fn input_changed(&self, content: impl Into<String>) {
        let _ = self.commands.send(Command::InputChanged(content.into()));
    }

    /// Send a message. Empty/whitespace content is a silent no-op;
    /// sending while disconnected surfaces a notice.
    pub fn send_message(&self, content: impl Into<String>) {
        let _ = self.commands.send(Command::Send(content.into()));
    }

    /// Manual reconnect after the session went terminal.
    pub fn retry_now(&self) {
        let _ = self.commands.send(Command::RetryNow);
    }

    /// Request forum membership, optionally with a passcode.
    pub fn join_forum(&self, passcode: Option<String>) {
        let _ = self.commands.send(Command::JoinForum { passcode });
    }

    /// Next state update, or `None` once the session has ended.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        self.updates.recv().await
    }

    pub fn try_next_update(&mut self) -> Option<SessionUpdate> {
        self.updates.try_recv().ok()
    }

    /// Current attendee snapshot, readable without waiting for updates.
    pub fn attendees(&self) -> Vec<Attendee> {
        self.roster.snapshot()
    }

    /// Graceful teardown; resolves once the actor has fully stopped.
    /// Returns the updates emitted on the way out (the final flush,
    /// if anything was still buffered).
    pub async fn shutdown(mut self) -> Vec<SessionUpdate> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
        let _ = self.task.await;
        let mut remaining = Vec::new();
        while let Ok(update) = self.updates.try_recv() {
            remaining.push(update);
        }
        remaining
    }
}

/// Constructor for forum sessions.
pub struct ForumSession;

impl ForumSession {
    /// Spawn a session for `forum_id`. The actor fetches forum detail,
    /// connects the transport, and runs until shutdown or forum
    /// deletion.
    pub fn spawn<T: Transport, A: ForumApi>(
        forum_id: impl Into<String>,
        credentials: Credentials,
        transport: T,
        api: Arc<A>,
        options: SessionOptions,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let roster = Roster::new();

        let actor = SessionActor {
            session_id: Uuid::new_v4(),
            forum_id: forum_id.into(),
            typers: TypingRoster::new(credentials.user.id.clone(), options.typing_ttl),
            reconnect: ReconnectPolicy::new(options.max_reconnect_attempts),
            credentials,
            transport,
            api,
            commands: command_rx,
            updates: update_tx,
            internal_tx,
            internal_rx,
            link: None,
            state: ConnectionState::Connecting,
            log: MessageLog::new(),
            buffer: IngestBuffer::new(),
            debounce: TypingDebounce::new(),
            roster: roster.clone(),
            ping: PingTracker::default(),
            flush_at: None,
            typing_idle_at: None,
            reconnect_at: None,
            retry_send_at: None,
            pending_retry: None,
            next_ping_at: None,
            next_sweep_at: None,
        };

        let task = tokio::spawn(actor.run());

        SessionHandle {
            commands: command_tx,
            updates: update_rx,
            roster,
            task,
        }
    }
}

struct SessionActor<T: Transport, A: ForumApi> {
    session_id: Uuid,
    forum_id: String,
    credentials: Credentials,
    transport: T,
    api: Arc<A>,

    commands: mpsc::UnboundedReceiver<Command>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,

    link: Option<TransportLink>,
    state: ConnectionState,
    reconnect: ReconnectPolicy,
    ping: PingTracker,

    log: MessageLog,
    buffer: IngestBuffer,
    debounce: TypingDebounce,
    typers: TypingRoster,
    roster: Roster,

    // Timers, all owned by the select loop below
    flush_at: Option<Instant>,
    typing_idle_at: Option<Instant>,
    reconnect_at: Option<Instant>,
    retry_send_at: Option<Instant>,
    pending_retry: Option<String>,
    next_ping_at: Option<Instant>,
    next_sweep_at: Option<Instant>,
}

/// Sleep until an optional deadline; pend forever when unarmed.
async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl<T: Transport, A: ForumApi> SessionActor<T, A> {
    async fn run(mut self) {
        info!(session_id = %self.session_id, forum_id = %self.forum_id, "forum session started");

        match self.api.fetch_forum(&self.forum_id).await {
            Ok(detail) => {
                info!(forum_id = %self.forum_id, forum = %detail.name, "loaded forum detail");
                self.log.seed(detail.messages);
                self.roster.seed(detail.attendees);
                self.emit_messages();
                self.emit_attendees();
            }
            Err(e) => {
                warn!(forum_id = %self.forum_id, error = %e, "failed to load forum detail");
                self.notice(
                    NoticeLevel::Warning,
                    format!("Could not load forum history: {}", e),
                );
            }
        }

        self.connect().await;

        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(Command::Shutdown(ack)) => {
                            self.teardown(true);
                            let _ = ack.send(());
                            break;
                        }
                        Some(cmd) => {
                            if self.handle_command(cmd).await == Flow::Stop {
                                break;
                            }
                        }
                        // Handle dropped — same as an explicit shutdown
                        None => {
                            self.teardown(true);
                            break;
                        }
                    }
                }
                event = Self::next_link_event(&mut self.link) => {
                    if self.on_link_event(event) == Flow::Stop {
                        break;
                    }
                }
                Some(internal) = self.internal_rx.recv() => {
                    self.on_internal(internal);
                }
                _ = deadline(self.flush_at) => self.on_flush_due(),
                _ = deadline(self.typing_idle_at) => self.on_typing_idle(),
                _ = deadline(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.connect().await;
                }
                _ = deadline(self.retry_send_at) => self.on_send_retry_due(),
                _ = deadline(self.next_ping_at) => self.on_ping_due(),
                _ = deadline(self.next_sweep_at) => self.on_sweep_due(),
            }
        }

        info!(session_id = %self.session_id, forum_id = %self.forum_id, "forum session ended");
    }

    async fn next_link_event(link: &mut Option<TransportLink>) -> LinkEvent {
        match link {
            Some(l) => match l.events.recv().await {
                Some(event) => event,
                None => LinkEvent::Closed(CloseReason::Error("transport channel closed".into())),
            },
            None => std::future::pending().await,
        }
    }

    // ── Connection lifecycle ────────────────────────────────────────

    async fn connect(&mut self) {
        self.state = if self.reconnect.attempts() > 0 {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        };
        self.emit_status(None);

        match self.transport.connect(&self.credentials.token).await {
            Ok(link) => {
                link.send(ClientEvent::JoinForum {
                    forum_id: self.forum_id.clone(),
                });
                self.link = Some(link);
                self.state = ConnectionState::Connected;
                self.reconnect.on_success();
                self.next_ping_at = Some(Instant::now() + PING_INTERVAL);
                self.emit_status(None);
                info!(forum_id = %self.forum_id, "connected to forum");
            }
            Err(e) => {
                warn!(forum_id = %self.forum_id, error = %e, "connect failed");
                self.schedule_reconnect(format!("Connection failed: {}", e));
            }
        }
    }

    /// Book a reconnect attempt per the backoff policy, or go terminal
    /// when the attempt budget is exhausted.
    fn schedule_reconnect(&mut self, why: String) {
        match self.reconnect.next_delay() {
            Some(delay) => {
                self.state = ConnectionState::Reconnecting;
                self.reconnect_at = Some(Instant::now() + delay);
                self.emit_status(Some(why));
            }
            None => {
                self.state = ConnectionState::Disconnected;
                self.reconnect_at = None;
                self.emit_status(Some(why));
                self.notice(
                    NoticeLevel::Error,
                    "Connection lost — please refresh the page or retry".into(),
                );
            }
        }
    }

    fn on_link_closed(&mut self, reason: CloseReason) {
        self.link = None;
        self.next_ping_at = None;
        match reason {
            CloseReason::ServerClosed => {
                // Server-initiated: surface it and schedule a single
                // reconnect one second out
                self.state = ConnectionState::Disconnected;
                self.emit_status(Some("Disconnected by server".into()));
                self.notice(
                    NoticeLevel::Error,
                    "Disconnected from forum — reconnecting shortly".into(),
                );
                self.reconnect_at = Some(Instant::now() + INITIAL_RECONNECT_DELAY);
            }
            CloseReason::Error(e) => {
                self.schedule_reconnect(format!("Connection error: {}", e));
            }
        }
    }

    // ── Inbound events ──────────────────────────────────────────────

    fn on_link_event(&mut self, event: LinkEvent) -> Flow {
        match event {
            LinkEvent::Inbound(event) => self.on_server_event(event),
            LinkEvent::Closed(reason) => {
                self.on_link_closed(reason);
                Flow::Continue
            }
        }
    }

    fn on_server_event(&mut self, event: ServerEvent) -> Flow {
        match event {
            ServerEvent::NewMessage { message } => {
                if self.buffer.offer(message) {
                    self.flush_at = Some(Instant::now() + FLUSH_INTERVAL);
                }
            }
            ServerEvent::UserJoined { user } => {
                if self.roster.join(user) {
                    self.emit_attendees();
                }
            }
            ServerEvent::UserLeft { user_id, .. } => {
                if self.roster.leave(&user_id).is_some() {
                    self.emit_attendees();
                }
            }
            ServerEvent::Typing {
                user_id,
                user_name,
                is_typing,
            } => {
                if self
                    .typers
                    .apply(&user_id, &user_name, is_typing, Instant::now())
                {
                    self.emit_typing_display();
                }
                if self.typers.needs_sweeping() {
                    if self.next_sweep_at.is_none() {
                        self.next_sweep_at = Some(Instant::now() + TYPING_SWEEP_INTERVAL);
                    }
                } else {
                    self.next_sweep_at = None;
                }
            }
            ServerEvent::ForumDeleted { forum_id } => {
                if forum_id == self.forum_id {
                    self.notice(NoticeLevel::Error, "This forum has been deleted".into());
                    self.emit(SessionUpdate::ForumDeleted);
                    // The forum is gone; no leave signal to send
                    self.teardown(false);
                    return Flow::Stop;
                }
            }
            ServerEvent::ConnectionHealth { healthy, message } => {
                if !healthy {
                    self.notice(
                        NoticeLevel::Warning,
                        message.unwrap_or_else(|| "Connection is unhealthy".into()),
                    );
                }
            }
            ServerEvent::Pong { timestamp } => {
                if let Some(latency) = self.ping.on_pong(timestamp, Instant::now())
                    && latency > PING_WARN_LATENCY
                {
                    warn!(
                        forum_id = %self.forum_id,
                        latency_ms = latency.as_millis() as u64,
                        "slow connection health round-trip"
                    );
                }
            }
        }
        Flow::Continue
    }

    // ── Commands ────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command) -> Flow {
        match cmd {
            Command::InputChanged(content) => self.on_input_changed(&content),
            Command::Send(content) => self.do_send(content, false),
            Command::RetryNow => {
                if self.state == ConnectionState::Disconnected {
                    self.reconnect.reset();
                    self.reconnect_at = None;
                    self.connect().await;
                }
            }
            Command::JoinForum { passcode } => self.spawn_join(passcode),
            Command::Shutdown(_) => unreachable!("handled in the run loop"),
        }
        Flow::Continue
    }

    fn on_input_changed(&mut self, content: &str) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let action = self.debounce.on_input(content);
        if action.emit_start {
            self.emit_typing_signal(true);
        }
        if action.arm_idle_timer {
            self.typing_idle_at = Some(Instant::now() + TYPING_IDLE);
        }
    }

    fn on_typing_idle(&mut self) {
        self.typing_idle_at = None;
        if self.debounce.on_idle() {
            self.emit_typing_signal(false);
        }
    }

    fn emit_typing_signal(&self, is_typing: bool) {
        if let Some(link) = &self.link {
            link.send(ClientEvent::Typing {
                forum_id: self.forum_id.clone(),
                user_id: self.credentials.user.id.clone(),
                user_name: self.credentials.user.name.clone(),
                is_typing,
            });
        }
    }

    // ── Optimistic send pipeline ────────────────────────────────────

    fn do_send(&mut self, content: String, is_retry: bool) {
        if content.trim().is_empty() {
            return;
        }
        if self.state != ConnectionState::Connected || self.link.is_none() {
            self.notice(
                NoticeLevel::Warning,
                "Not connected — message not sent".into(),
            );
            return;
        }

        let optimistic = send::make_optimistic(&self.credentials.user, &content);
        let temp_id = optimistic.id.clone();
        self.log.append_optimistic(optimistic);
        self.emit_messages();

        // Sending always ends the typing burst immediately
        if self.debounce.on_send() {
            self.emit_typing_signal(false);
        }
        self.typing_idle_at = None;

        self.spawn_persist(temp_id, content, is_retry);
    }

    fn spawn_persist(&self, temp_id: String, content: String, is_retry: bool) {
        let api = self.api.clone();
        let forum_id = self.forum_id.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = api.post_message(&forum_id, &content).await;
            let _ = internal.send(Internal::PersistDone {
                temp_id,
                content,
                is_retry,
                outcome,
            });
        });
    }

    fn spawn_join(&self, passcode: Option<String>) {
        let api = self.api.clone();
        let forum_id = self.forum_id.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = api.join_forum(&forum_id, passcode.as_deref()).await;
            let _ = internal.send(Internal::JoinDone { outcome });
        });
    }

    fn on_internal(&mut self, internal: Internal) {
        match internal {
            Internal::PersistDone {
                temp_id,
                content,
                is_retry,
                outcome,
            } => match send::resolve(outcome, is_retry) {
                PersistResolution::Keep => {
                    // The broadcast echo will fold the optimistic entry
                    // away through the dedup rule
                }
                PersistResolution::Rollback { notice } => {
                    if self.log.remove_by_id(&temp_id) {
                        self.emit_messages();
                    }
                    self.notice(NoticeLevel::Error, notice);
                }
                PersistResolution::RollbackAndRetry { notice } => {
                    if self.log.remove_by_id(&temp_id) {
                        self.emit_messages();
                    }
                    self.notice(NoticeLevel::Warning, notice);
                    self.pending_retry = Some(content);
                    self.retry_send_at = Some(Instant::now() + SEND_RETRY_DELAY);
                }
            },
            Internal::JoinDone { outcome } => match outcome {
                Ok(()) => self.notice(NoticeLevel::Info, "Join request accepted".into()),
                Err(e) => self.notice(NoticeLevel::Error, format!("Could not join forum: {}", e)),
            },
        }
    }

    fn on_send_retry_due(&mut self) {
        self.retry_send_at = None;
        if let Some(content) = self.pending_retry.take() {
            self.do_send(content, true);
        }
    }

    // ── Timers ──────────────────────────────────────────────────────

    fn on_flush_due(&mut self) {
        self.flush_at = None;
        if self.buffer.flush_into(&mut self.log) {
            self.emit_messages();
        }
    }

    fn on_ping_due(&mut self) {
        if let Some(link) = &self.link {
            let timestamp = Utc::now().timestamp_millis();
            link.send(ClientEvent::Ping { timestamp });
            self.ping.on_sent(timestamp, Instant::now());
            self.next_ping_at = Some(Instant::now() + PING_INTERVAL);
        } else {
            self.next_ping_at = None;
        }
    }

    fn on_sweep_due(&mut self) {
        self.next_sweep_at = None;
        if self.typers.sweep(Instant::now()) {
            self.emit_typing_display();
        }
        if self.typers.needs_sweeping() {
            self.next_sweep_at = Some(Instant::now() + TYPING_SWEEP_INTERVAL);
        }
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// Final flush, then cancel every timer, then leave and close the
    /// transport — in that order, so nothing buffered is lost and
    /// nothing fires afterwards.
    fn teardown(&mut self, send_leave: bool) {
        if self.buffer.has_pending() && self.buffer.flush_into(&mut self.log) {
            self.emit_messages();
        }

        self.flush_at = None;
        self.typing_idle_at = None;
        self.reconnect_at = None;
        self.retry_send_at = None;
        self.pending_retry = None;
        self.next_ping_at = None;
        self.next_sweep_at = None;

        if let Some(link) = self.link.take() {
            if send_leave {
                link.send(ClientEvent::LeaveForum {
                    forum_id: self.forum_id.clone(),
                });
            }
            link.close();
        }
        self.state = ConnectionState::Disconnected;
    }

    // ── Update emission ─────────────────────────────────────────────

    fn emit(&self, update: SessionUpdate) {
        let _ = self.updates.send(update);
    }

    fn emit_messages(&self) {
        self.emit(SessionUpdate::Messages(self.log.snapshot()));
    }

    fn emit_attendees(&self) {
        self.emit(SessionUpdate::Attendees(self.roster.snapshot()));
    }

    fn emit_typing_display(&self) {
        self.emit(SessionUpdate::Typing(self.typers.display()));
    }

    fn emit_status(&self, detail: Option<String>) {
        self.emit(SessionUpdate::Connection(ConnectionStatus {
            state: self.state,
            reconnect_attempts: self.reconnect.attempts(),
            reconnect_delay_ms: self.reconnect.display_delay_ms(),
            detail,
        }));
    }

    fn notice(&self, level: NoticeLevel, text: String) {
        self.emit(SessionUpdate::Notice(Notice { level, text }));
    }
}
