//! Device-link session management.
//!
//! This module contains the connection manager: the session loop that owns
//! the transport and the four session entities, and the [`DeviceLink`]
//! handle that starts and stops sessions. All connection-state transitions
//! happen here; no other component mutates session state.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::connection::{HttpTransport, SerialTransport, Transport, is_dotted_quad};
use super::error::{LinkError, LinkResult};
use super::messages::{DeviceMessage, LinkCommand, LinkEvent};
use super::state::{ConnectionState, SessionState, SlotMode, UiState};

/// Where to find the sensor device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    /// Serial device path, e.g. `/dev/ttyUSB0`
    Serial { path: String },

    /// Dotted-quad IPv4 address of the HTTP device
    Http { host: String },
}

impl ConnectTarget {
    /// Fail fast on targets that can never connect. Transport-level
    /// failures (device missing, probe refused) surface later, from the
    /// session task.
    pub fn validate(&self) -> LinkResult<()> {
        match self {
            Self::Serial { path } if path.is_empty() => Err(LinkError::InvalidAddress(
                "empty serial device path".to_string(),
            )),
            Self::Serial { .. } => Ok(()),
            Self::Http { host } => {
                if is_dotted_quad(host) {
                    Ok(())
                } else {
                    Err(LinkError::InvalidAddress(format!(
                        "{} is not a dotted-quad IPv4 address",
                        host
                    )))
                }
            }
        }
    }

    /// How slot-count messages from this transport are interpreted.
    pub fn slot_mode(&self) -> SlotMode {
        match self {
            Self::Serial { .. } => SlotMode::Event,
            Self::Http { .. } => SlotMode::Snapshot,
        }
    }
}

impl std::fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serial { path } => write!(f, "serial:{}", path),
            Self::Http { host } => write!(f, "http://{}", host),
        }
    }
}

/// One device-link session.
///
/// Owns the transport and the session entities for exactly one connection.
/// Runs as a task; emits [`LinkEvent`]s on its channel and publishes a
/// [`UiState`] snapshot after every processed message. Ends on transport
/// failure or when its cancellation token fires; either way every entity is
/// back at its initial value before the task returns.
pub struct DeviceLinkClient {
    target: ConnectTarget,
    event_tx: mpsc::Sender<LinkEvent>,
    state_tx: Arc<watch::Sender<UiState>>,
    command_rx: mpsc::Receiver<LinkCommand>,
    shutdown: CancellationToken,
    session: SessionState,
    connection: ConnectionState,
}

impl DeviceLinkClient {
    pub fn new(
        target: ConnectTarget,
        event_tx: mpsc::Sender<LinkEvent>,
        state_tx: Arc<watch::Sender<UiState>>,
        command_rx: mpsc::Receiver<LinkCommand>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            target,
            event_tx,
            state_tx,
            command_rx,
            shutdown,
            session: SessionState::new(),
            connection: ConnectionState::Disconnected,
        }
    }

    /// Open the transport and run the session.
    pub async fn run(mut self) -> LinkResult<()> {
        if let Err(e) = self.target.validate() {
            return self.connect_failed(e).await;
        }

        self.set_connection(ConnectionState::Connecting);
        debug!(device = %self.target, "Connecting");

        let mode = self.target.slot_mode();
        match self.target.clone() {
            ConnectTarget::Serial { path } => match SerialTransport::open(&path) {
                Ok(transport) => self.run_with_transport(transport, mode).await,
                Err(e) => self.connect_failed(e).await,
            },
            ConnectTarget::Http { host } => match HttpTransport::connect(&host).await {
                Ok(transport) => self.run_with_transport(transport, mode).await,
                Err(e) => self.connect_failed(e).await,
            },
        }
    }

    /// Run the session over a pre-established transport.
    pub(crate) async fn run_with_transport(
        mut self,
        mut conn: impl Transport,
        mode: SlotMode,
    ) -> LinkResult<()> {
        // Fresh entities for the new session.
        self.session.reset();
        self.set_connection(ConnectionState::Connected);
        self.event_tx.send(LinkEvent::Connected).await.ok();
        info!(device = %self.target, "Connected");

        let result = loop {
            tokio::select! {
                result = conn.next_messages() => match result {
                    Ok(Some(messages)) => {
                        if let Err(e) = self.process(&messages, mode).await {
                            break Err(e);
                        }
                    }
                    Ok(None) => {
                        info!("Device closed the connection");
                        break Err(LinkError::Disconnected);
                    }
                    Err(e) => break Err(e),
                },

                Some(command) = self.command_rx.recv() => match command {
                    LinkCommand::DismissNotification => {
                        if self.session.dismiss_notification() {
                            debug!("Notification dismissed");
                            self.publish_state();
                            self.event_tx.send(LinkEvent::NotificationCleared).await.ok();
                        }
                    }
                },

                // disconnect() cancels the token, which aborts a pending
                // read/poll here rather than delivering it as data.
                _ = self.shutdown.cancelled() => break Ok(()),
            }
        };

        self.teardown(conn, &result).await;
        result
    }

    /// Reduce one batch of messages, emitting events and publishing the
    /// UI snapshot after each change.
    async fn process(&mut self, messages: &[DeviceMessage], mode: SlotMode) -> LinkResult<()> {
        for msg in messages {
            trace!(?msg, "Processing message");
            for event in self.session.apply(msg, mode) {
                self.publish_state();
                self.event_tx
                    .send(event)
                    .await
                    .map_err(|_| LinkError::Disconnected)?;
            }
        }
        Ok(())
    }

    /// Release the transport, surface a connection-loss signal if the
    /// session ended abnormally, and reset every entity.
    async fn teardown(&mut self, mut conn: impl Transport, result: &LinkResult<()>) {
        if let Err(e) = conn.shutdown().await {
            debug!(error = %e, "Transport shutdown reported an error");
        }

        if let Err(err) = result {
            warn!(error = %err, "Connection lost");
            self.set_connection(ConnectionState::Error(err.to_string()));
            self.event_tx
                .send(LinkEvent::ConnectionLost(err.to_string()))
                .await
                .ok();
        }

        self.session.reset();
        self.set_connection(ConnectionState::Disconnected);
        self.event_tx.send(LinkEvent::Disconnected).await.ok();
        info!("Disconnected");
    }

    async fn connect_failed(&mut self, err: LinkError) -> LinkResult<()> {
        warn!(device = %self.target, error = %err, "Connect failed");
        self.event_tx
            .send(LinkEvent::ConnectFailed(err.to_string()))
            .await
            .ok();
        self.set_connection(ConnectionState::Disconnected);
        Err(err)
    }

    fn set_connection(&mut self, state: ConnectionState) {
        self.connection = state;
        self.publish_state();
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(UiState {
            connection: self.connection.clone(),
            slots: self.session.slots.clone(),
            alignment: self.session.alignment.clone(),
            notification: self.session.notification().clone(),
        });
    }
}

/// Handle owning the session lifecycle.
///
/// At most one session exists at a time; `connect` tears any previous one
/// down completely before starting the next, and `disconnect` is an
/// idempotent no-op when nothing is running. Consumers subscribe to UI
/// snapshots here and receive [`LinkEvent`]s on the channel supplied at
/// construction.
pub struct DeviceLink {
    event_tx: mpsc::Sender<LinkEvent>,
    state_tx: Arc<watch::Sender<UiState>>,
    state_rx: watch::Receiver<UiState>,
    session: Option<SessionHandle>,
}

struct SessionHandle {
    shutdown: CancellationToken,
    command_tx: mpsc::Sender<LinkCommand>,
    task: JoinHandle<LinkResult<()>>,
}

impl DeviceLink {
    pub fn new(event_tx: mpsc::Sender<LinkEvent>) -> Self {
        let (state_tx, state_rx) = watch::channel(UiState::default());
        Self {
            event_tx,
            state_tx: Arc::new(state_tx),
            state_rx,
            session: None,
        }
    }

    /// Subscribe to UI-facing state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.state_rx.clone()
    }

    /// Start a session against `target`.
    ///
    /// Validation failures are returned immediately and no session starts.
    /// Transport-level connect failures surface asynchronously as
    /// [`LinkEvent::ConnectFailed`].
    pub async fn connect(&mut self, target: ConnectTarget) -> LinkResult<()> {
        target.validate()?;

        // Only one ingestion loop may exist; fully tear down any previous
        // session before starting the next.
        let _ = self.disconnect().await;

        let shutdown = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::channel(8);
        let client = DeviceLinkClient::new(
            target,
            self.event_tx.clone(),
            self.state_tx.clone(),
            command_rx,
            shutdown.clone(),
        );

        self.session = Some(SessionHandle {
            shutdown,
            command_tx,
            task: tokio::spawn(client.run()),
        });
        Ok(())
    }

    /// Stop the running session, if any, and wait for its teardown to
    /// finish. Safe to call when already disconnected.
    ///
    /// Returns the session's final result: `Ok(())` for a clean
    /// disconnect, the transport error if the session had already ended
    /// abnormally, `None` if no session existed.
    pub async fn disconnect(&mut self) -> Option<LinkResult<()>> {
        if let Some(session) = self.session.take() {
            session.shutdown.cancel();
            match session.task.await {
                Ok(result) => Some(result),
                Err(e) => Some(Err(LinkError::ConnectionLost(format!(
                    "session task failed: {}",
                    e
                )))),
            }
        } else {
            None
        }
    }

    /// Dismiss the visible notification. No-op when disconnected.
    pub async fn dismiss_notification(&self) {
        if let Some(session) = &self.session {
            let _ = session
                .command_tx
                .send(LinkCommand::DismissNotification)
                .await;
        }
    }

    /// Whether a session task is currently alive.
    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.task.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::super::connection::{MockTransport, MockTransportHandle};
    use super::super::state::{AlignmentStatus, SlotSnapshot};
    use super::*;
    use std::collections::BTreeSet;

    struct TestRig {
        event_rx: mpsc::Receiver<LinkEvent>,
        state_rx: watch::Receiver<UiState>,
        command_tx: mpsc::Sender<LinkCommand>,
        shutdown: CancellationToken,
        handle: MockTransportHandle,
        task: JoinHandle<LinkResult<()>>,
    }

    /// Spawn a session over a mock transport in the given mode.
    fn spawn_session(mode: SlotMode) -> TestRig {
        let (event_tx, event_rx) = mpsc::channel(100);
        let (state_tx, state_rx) = watch::channel(UiState::default());
        let (command_tx, command_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        let client = DeviceLinkClient::new(
            ConnectTarget::Serial {
                path: "/dev/null".to_string(),
            },
            event_tx,
            Arc::new(state_tx),
            command_rx,
            shutdown.clone(),
        );

        let (transport, handle) = MockTransport::pair();
        let task = tokio::spawn(client.run_with_transport(transport, mode));

        TestRig {
            event_rx,
            state_rx,
            command_tx,
            shutdown,
            handle,
            task,
        }
    }

    #[tokio::test]
    async fn session_emits_events_and_snapshots() {
        let mut rig = spawn_session(SlotMode::Event);

        assert_eq!(rig.event_rx.recv().await, Some(LinkEvent::Connected));

        rig.handle.send(vec![
            DeviceMessage::Alignment("OK".to_string()),
            DeviceMessage::SlotCount(3),
        ]);

        assert_eq!(
            rig.event_rx.recv().await,
            Some(LinkEvent::AlignmentChanged(AlignmentStatus::Aligned))
        );
        let expected = SlotSnapshot {
            available_count: 3,
            occupied: BTreeSet::from([2]),
            ..SlotSnapshot::default()
        };
        assert_eq!(
            rig.event_rx.recv().await,
            Some(LinkEvent::SlotsUpdated(expected.clone()))
        );

        // The watch snapshot reflects the same state.
        let state = rig.state_rx.borrow().clone();
        assert_eq!(state.connection, ConnectionState::Connected);
        assert_eq!(state.slots, expected);
        assert_eq!(state.alignment, Some(AlignmentStatus::Aligned));

        rig.shutdown.cancel();
        assert!(rig.task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn transport_failure_tears_down_session() {
        let mut rig = spawn_session(SlotMode::Snapshot);
        assert_eq!(rig.event_rx.recv().await, Some(LinkEvent::Connected));

        rig.handle.send(vec![DeviceMessage::SlotCount(1)]);
        rig.event_rx.recv().await; // SlotsUpdated

        rig.handle
            .fail(LinkError::ConnectionLost("HTTP 503".to_string()));

        let event = rig.event_rx.recv().await.unwrap();
        assert!(matches!(event, LinkEvent::ConnectionLost(ref reason)
            if reason.contains("HTTP 503")));
        assert_eq!(rig.event_rx.recv().await, Some(LinkEvent::Disconnected));

        // The session task reports the error and all entities are reset.
        assert!(rig.task.await.unwrap().is_err());
        let state = rig.state_rx.borrow().clone();
        assert_eq!(state.connection, ConnectionState::Disconnected);
        assert_eq!(state.slots, SlotSnapshot::default());
        assert_eq!(state.alignment, None);
        assert!(!state.notification.visible);
    }

    #[tokio::test]
    async fn device_eof_is_connection_loss() {
        let mut rig = spawn_session(SlotMode::Event);
        assert_eq!(rig.event_rx.recv().await, Some(LinkEvent::Connected));

        drop(rig.handle); // transport reports end-of-stream

        let event = rig.event_rx.recv().await.unwrap();
        assert!(matches!(event, LinkEvent::ConnectionLost(_)));
        assert_eq!(rig.event_rx.recv().await, Some(LinkEvent::Disconnected));
        assert!(matches!(
            rig.task.await.unwrap(),
            Err(LinkError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn disconnect_while_read_pending_resets_entities() {
        let mut rig = spawn_session(SlotMode::Event);
        assert_eq!(rig.event_rx.recv().await, Some(LinkEvent::Connected));

        rig.handle.send(vec![
            DeviceMessage::SlotCount(1),
            DeviceMessage::SlotCount(0),
        ]);
        // Drain: SlotsUpdated, SlotsUpdated, NotificationRaised.
        rig.event_rx.recv().await;
        rig.event_rx.recv().await;
        rig.event_rx.recv().await;

        // No data pending; the session sits in its blocking read until
        // cancellation resolves it.
        rig.shutdown.cancel();
        assert!(rig.task.await.unwrap().is_ok());

        assert_eq!(rig.event_rx.recv().await, Some(LinkEvent::Disconnected));
        let state = rig.state_rx.borrow().clone();
        assert_eq!(state.connection, ConnectionState::Disconnected);
        assert_eq!(state.slots, SlotSnapshot::default());
        assert_eq!(state.alignment, None);
        assert!(!state.notification.visible);
    }

    #[tokio::test]
    async fn dismiss_command_clears_notification() {
        let mut rig = spawn_session(SlotMode::Snapshot);
        assert_eq!(rig.event_rx.recv().await, Some(LinkEvent::Connected));

        rig.handle.send(vec![DeviceMessage::SlotCount(0)]);
        rig.event_rx.recv().await; // SlotsUpdated
        assert!(matches!(
            rig.event_rx.recv().await,
            Some(LinkEvent::NotificationRaised(_))
        ));
        assert!(rig.state_rx.borrow().notification.visible);

        rig.command_tx
            .send(LinkCommand::DismissNotification)
            .await
            .unwrap();
        assert_eq!(
            rig.event_rx.recv().await,
            Some(LinkEvent::NotificationCleared)
        );
        assert!(!rig.state_rx.borrow().notification.visible);

        // Dismissing again does nothing; the session keeps running.
        rig.command_tx
            .send(LinkCommand::DismissNotification)
            .await
            .unwrap();
        rig.handle.send(vec![DeviceMessage::Alignment("OK".to_string())]);
        assert_eq!(
            rig.event_rx.recv().await,
            Some(LinkEvent::AlignmentChanged(AlignmentStatus::Aligned))
        );

        rig.shutdown.cancel();
        let _ = rig.task.await;
    }

    #[tokio::test]
    async fn connect_rejects_invalid_target_without_spawning() {
        let (event_tx, _event_rx) = mpsc::channel(8);
        let mut link = DeviceLink::new(event_tx);

        let result = link
            .connect(ConnectTarget::Http {
                host: "esp32.local".to_string(),
            })
            .await;
        assert!(matches!(result, Err(LinkError::InvalidAddress(_))));
        assert!(!link.is_active());

        // State never left Disconnected.
        assert_eq!(
            link.subscribe().borrow().connection,
            ConnectionState::Disconnected
        );
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (event_tx, _event_rx) = mpsc::channel(8);
        let mut link = DeviceLink::new(event_tx);

        // No session: both calls are no-ops.
        link.disconnect().await;
        link.disconnect().await;
        assert!(!link.is_active());
        link.dismiss_notification().await; // also a no-op
    }
}
