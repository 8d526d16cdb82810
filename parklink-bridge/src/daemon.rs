//! Daemon lifecycle management for parkd.
//!
//! This module handles initialization, the bridge session, signal
//! handling, and graceful shutdown. The daemon is a thin consumer of the
//! device link: it subscribes to the event stream and logs state
//! transitions where a UI would render them.

use std::env;

use tokio::signal::unix::{self, SignalKind};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::device_link::{ConnectTarget, DeviceLink, LinkEvent};
use crate::error::{Error, Result};
use crate::tracing::prelude::*;

/// The main daemon that runs one device-link session.
pub struct Daemon {
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    /// Create a new daemon instance.
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Run the daemon until shutdown is requested or the session ends.
    pub async fn run(self) -> anyhow::Result<()> {
        let target = target_from_env()?;

        let (event_tx, event_rx) = mpsc::channel::<LinkEvent>(100);
        let mut link = DeviceLink::new(event_tx);

        // Fails fast on a target that can never connect (bad IP, empty
        // device path). Transport-level failures arrive as events.
        link.connect(target.clone()).await?;

        self.tracker.spawn({
            let shutdown = self.shutdown.clone();
            async move { log_events(event_rx, shutdown).await }
        });
        self.tracker.close();

        info!(device = %target, "Started.");
        info!("Set RUST_LOG=parklink_bridge=trace to see raw device traffic");

        // Install signal handlers
        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        // Wait for a shutdown signal, or for the session to end on its
        // own (connection loss is session-fatal; there is no auto
        // reconnect).
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            },
            _ = self.shutdown.cancelled() => {},
        }

        trace!("Shutting down.");
        let session_result = link.disconnect().await;
        self.shutdown.cancel();

        // Wait for all tasks to complete
        self.tracker.wait().await;
        info!("Exiting.");

        // A session that ended on its own (connect failure, connection
        // loss) is an abnormal exit; a signal-initiated disconnect is not.
        if let Some(Err(e)) = session_result {
            return Err(e.into());
        }
        Ok(())
    }
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

/// Read the connect target from the environment.
fn target_from_env() -> Result<ConnectTarget> {
    target_from_vars(
        env::var("PARKLINK_PORT").ok(),
        env::var("PARKLINK_HOST").ok(),
    )
}

fn target_from_vars(port: Option<String>, host: Option<String>) -> Result<ConnectTarget> {
    match (port, host) {
        (Some(path), None) => Ok(ConnectTarget::Serial { path }),
        (None, Some(host)) => Ok(ConnectTarget::Http { host }),
        (Some(_), Some(_)) => Err(Error::Config(
            "set only one of PARKLINK_PORT and PARKLINK_HOST".to_string(),
        )),
        (None, None) => Err(Error::Config(
            "set PARKLINK_PORT=/dev/ttyUSB0 (serial) or PARKLINK_HOST=<ipv4> (HTTP)".to_string(),
        )),
    }
}

/// Log bridge events where a UI would render them.
///
/// Ends the daemon when the session does: connect failure and connection
/// loss are session-fatal, and the user re-runs the daemon to reconnect.
async fn log_events(mut event_rx: mpsc::Receiver<LinkEvent>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            maybe_event = event_rx.recv() => match maybe_event {
                Some(event) => handle_event(event, &shutdown),
                None => break,
            },
            _ = shutdown.cancelled() => {
                // Drain anything the teardown already emitted.
                while let Ok(event) = event_rx.try_recv() {
                    handle_event(event, &shutdown);
                }
                break;
            }
        }
    }
}

fn handle_event(event: LinkEvent, shutdown: &CancellationToken) {
    match event {
        LinkEvent::Connected => info!("Device link established"),
        LinkEvent::AlignmentChanged(status) => {
            info!(severity = ?status.severity(), "Alignment: {}", status);
        }
        LinkEvent::SlotsUpdated(snapshot) => {
            info!(
                available = snapshot.available_count,
                occupied = ?snapshot.occupied,
                "Slots updated"
            );
        }
        LinkEvent::NotificationRaised(kind) => {
            warn!(title = kind.title(), "{}", kind.message());
        }
        LinkEvent::NotificationCleared => info!("Notification cleared"),
        LinkEvent::ConnectFailed(reason) => {
            error!(reason = %reason, "Could not connect to the device");
            shutdown.cancel();
        }
        LinkEvent::ConnectionLost(reason) => {
            error!(reason = %reason, "Connection to the device was lost; reconnect to resume");
            shutdown.cancel();
        }
        LinkEvent::Disconnected => shutdown.cancel(),
    }
}
