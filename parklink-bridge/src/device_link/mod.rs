//! Device-link bridge for the parking sensor.
//!
//! This module connects to the physical sensor device, ingests its
//! semi-structured stream, and reduces it into a small consistent
//! UI-facing state: slot availability, per-slot occupancy, alignment
//! guidance, and the parking-full notification.
//!
//! # Transports
//!
//! Two transports reach the same device family:
//!
//! - **Serial**: newline-delimited ASCII at 115200 baud
//!   (`ALIGNMENT:<TOKEN>`, `SLOTS:<n>`, `OCCUPIED:<id>`, `RELEASED:<id>`)
//! - **HTTP**: `GET http://<ipv4>/data` returning
//!   `{"slots": <n>, "alignment": "<TOKEN>"}`, polled at 1 s intervals
//!
//! Both implement [`Transport`]; the session loop and reducers are
//! transport-agnostic and written once.
//!
//! # Architecture
//!
//! The bridge runs as an active async task that owns the transport and
//! pushes [`LinkEvent`]s to a consumer via channel, alongside a `watch`
//! channel carrying the latest [`UiState`] snapshot. This mirrors how the
//! rest of the system consumes device state: subscribe, react to changes,
//! never poll the bridge.
//!
//! # Usage
//!
//! ```rust,ignore
//! let (event_tx, mut event_rx) = mpsc::channel(100);
//! let mut link = DeviceLink::new(event_tx);
//! let mut ui = link.subscribe();
//!
//! link.connect(ConnectTarget::Http { host: "192.168.4.1".into() }).await?;
//!
//! while let Some(event) = event_rx.recv().await {
//!     match event {
//!         LinkEvent::SlotsUpdated(snapshot) => { /* redraw bays */ }
//!         LinkEvent::NotificationRaised(kind) => { /* show alert */ }
//!         // ...
//!     }
//! }
//! ```

mod client;
mod connection;
mod error;
mod framer;
mod messages;
mod state;

pub use client::{ConnectTarget, DeviceLink, DeviceLinkClient};
pub use connection::{HttpTransport, SerialTransport, Transport, is_dotted_quad};
pub use error::{LinkError, LinkResult};
pub use framer::LineFramer;
pub use messages::{DataSnapshot, DeviceMessage, LinkCommand, LinkEvent, classify_chunk, classify_line};
pub use state::{
    AlignmentSeverity, AlignmentStatus, ConnectionState, NotificationKind, NotificationState,
    SessionState, SlotMode, SlotSnapshot, TOTAL_SLOTS, UiState,
};
