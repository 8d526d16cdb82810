//! Device message types, classification, and the bridge event surface.
//!
//! The sensor device speaks a small fixed vocabulary. Over serial it sends
//! newline-delimited ASCII lines; over HTTP it serves one JSON object per
//! poll. Both transports classify their raw input into [`DeviceMessage`]
//! values, which the session reducers consume.

use serde::Deserialize;

use super::state::{AlignmentStatus, NotificationKind, SlotSnapshot};

/// One classified message from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    /// Vehicle alignment token (`ALIGNMENT:<TOKEN>` or the JSON `alignment`
    /// field). Carries the raw token; mapping to a status happens in the
    /// alignment reducer.
    Alignment(String),

    /// Available-slot count (`SLOTS:<n>` or the JSON `slots` field)
    SlotCount(u8),

    /// A specific slot became occupied (`OCCUPIED:<id>`, serial only)
    SlotOccupied(u8),

    /// A specific slot was released (`RELEASED:<id>`, serial only)
    SlotReleased(u8),
}

/// Classify one complete serial line.
///
/// Prefixes are matched case-sensitively in priority order; the first match
/// wins. Anything else, including blank lines and lines whose numeric
/// payload fails to parse, yields `None`. Line noise must never interrupt
/// the stream, so there is no error path here.
pub fn classify_line(line: &str) -> Option<DeviceMessage> {
    if let Some(token) = line.strip_prefix("ALIGNMENT:") {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        return Some(DeviceMessage::Alignment(token.to_string()));
    }
    if let Some(rest) = line.strip_prefix("SLOTS:") {
        return rest.trim().parse().ok().map(DeviceMessage::SlotCount);
    }
    if let Some(rest) = line.strip_prefix("OCCUPIED:") {
        return rest.trim().parse().ok().map(DeviceMessage::SlotOccupied);
    }
    if let Some(rest) = line.strip_prefix("RELEASED:") {
        return rest.trim().parse().ok().map(DeviceMessage::SlotReleased);
    }
    None
}

/// Classify a chunk's worth of complete lines, alignment messages first.
///
/// Alignment is the latency-sensitive signal: within one ingested chunk it
/// is delivered ahead of slot bookkeeping so the guidance display never
/// waits behind count updates. Relative order within each group is kept.
pub fn classify_chunk<I, S>(lines: I) -> Vec<DeviceMessage>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut messages = Vec::new();
    let mut deferred = Vec::new();
    for line in lines {
        match classify_line(line.as_ref()) {
            Some(msg @ DeviceMessage::Alignment(_)) => messages.push(msg),
            Some(msg) => deferred.push(msg),
            None => {}
        }
    }
    messages.append(&mut deferred);
    messages
}

/// JSON payload served by the HTTP device at `GET /data`.
#[derive(Debug, Clone, Deserialize)]
pub struct DataSnapshot {
    /// Available-slot count
    pub slots: Option<u8>,

    /// Raw alignment token
    pub alignment: Option<String>,
}

impl DataSnapshot {
    /// Classify one poll result, alignment first.
    ///
    /// `last_slots` is the count the transport saw on the previous poll;
    /// an unchanged count is suppressed here so a steady-state device does
    /// not generate redundant reducer work every second. Alignment is
    /// always forwarded; change detection for it happens downstream.
    pub fn messages(&self, last_slots: Option<u8>) -> Vec<DeviceMessage> {
        let mut messages = Vec::new();
        if let Some(token) = &self.alignment {
            let token = token.trim();
            if !token.is_empty() {
                messages.push(DeviceMessage::Alignment(token.to_string()));
            }
        }
        if let Some(n) = self.slots
            && last_slots != Some(n)
        {
            messages.push(DeviceMessage::SlotCount(n));
        }
        messages
    }
}

/// Events emitted by the device link.
///
/// Sent via channel to the consumer (the rendering layer, or the daemon's
/// log subscriber) to notify about connection and state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Session established; all state entities are at their initial values
    Connected,

    /// Alignment status changed (suppressed for repeated identical tokens)
    AlignmentChanged(AlignmentStatus),

    /// Slot availability or occupancy changed
    SlotsUpdated(SlotSnapshot),

    /// The parking-full notification was raised
    NotificationRaised(NotificationKind),

    /// The notification was cleared (full availability restored, or the
    /// user dismissed it)
    NotificationCleared,

    /// Connect attempt failed; state stays Disconnected
    ConnectFailed(String),

    /// Mid-session transport failure. The session is torn down and the
    /// user must reconnect explicitly.
    ConnectionLost(String),

    /// Session ended; all state entities were reset
    Disconnected,
}

/// Commands sent to a running device-link session.
#[derive(Debug, Clone)]
pub enum LinkCommand {
    /// Dismiss the visible notification immediately
    DismissNotification,
}
