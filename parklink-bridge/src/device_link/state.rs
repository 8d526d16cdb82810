//! Session state and the pure reducers over it.
//!
//! All mutation of the four session entities (connection state, slot
//! snapshot, alignment status, notification state) happens through the
//! reducers here, invoked synchronously by the connection manager as each
//! message arrives. The reducers are pure transformations over small
//! fixed-size state; nothing here blocks or performs I/O.

use std::collections::BTreeSet;
use std::fmt;

use super::messages::{DeviceMessage, LinkEvent};

/// Number of physical parking bays tracked by the device.
pub const TOTAL_SLOTS: u8 = 4;

/// Connection lifecycle state. Owned exclusively by the connection
/// manager; transitions only on explicit connect/disconnect or on a
/// transport-level failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Vehicle alignment guidance derived from the sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignmentStatus {
    Aligned,
    MoveLeft,
    MoveRight,
    OverTheLane,
    NotOccupied,
    /// Token outside the known vocabulary; the raw token is kept for
    /// diagnostics and forward compatibility.
    Unknown(String),
}

/// Display weight of an alignment status, as the UI renders it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentSeverity {
    Ok,
    Warning,
    Neutral,
}

impl AlignmentStatus {
    /// Map a raw wire token to a status.
    pub fn from_token(token: &str) -> Self {
        match token {
            "OK" => Self::Aligned,
            "MOVE_LEFT" => Self::MoveLeft,
            "MOVE_RIGHT" => Self::MoveRight,
            "OVER_THE_LANE" => Self::OverTheLane,
            "NOT_OCCUPIED" => Self::NotOccupied,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Compare by tag only; the payload of `Unknown` is not significant
    /// for change detection.
    pub fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn severity(&self) -> AlignmentSeverity {
        match self {
            Self::Aligned => AlignmentSeverity::Ok,
            Self::MoveLeft | Self::MoveRight | Self::OverTheLane => AlignmentSeverity::Warning,
            Self::NotOccupied | Self::Unknown(_) => AlignmentSeverity::Neutral,
        }
    }
}

impl fmt::Display for AlignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aligned => write!(f, "Properly Aligned"),
            Self::MoveLeft => write!(f, "Move Left"),
            Self::MoveRight => write!(f, "Move Right"),
            Self::OverTheLane => write!(f, "Over The Lane"),
            Self::NotOccupied => write!(f, "Not Yet Occupied"),
            Self::Unknown(raw) => write!(f, "{}", raw),
        }
    }
}

/// Slot availability and per-slot occupancy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSnapshot {
    /// Fixed bay count
    pub total_slots: u8,

    /// Available bays as reported by the device
    pub available_count: u8,

    /// Occupied bay ids, 1-based
    pub occupied: BTreeSet<u8>,
}

impl Default for SlotSnapshot {
    fn default() -> Self {
        Self {
            total_slots: TOTAL_SLOTS,
            available_count: TOTAL_SLOTS,
            occupied: BTreeSet::new(),
        }
    }
}

/// How slot-count messages are interpreted, selected by transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotMode {
    /// Serial: `SLOTS`/`OCCUPIED`/`RELEASED` deltas against tracked state
    Event,
    /// HTTP: whole-state count per poll, occupancy synthesized
    Snapshot,
}

impl SlotSnapshot {
    /// Apply a `SLOTS:<n>` count in event (serial) mode.
    ///
    /// An unchanged count is a no-op. A full count is authoritative ground
    /// truth and clears the tracked occupied set. A drop below full marks
    /// slot 2 occupied if it is not already; that models "a car just
    /// entered" for single-sensor demo rigs and is a display heuristic,
    /// not derived from per-slot sensing.
    pub fn apply_count(&mut self, n: u8) -> bool {
        let n = n.min(self.total_slots);
        if n == self.available_count {
            return false;
        }
        self.available_count = n;
        if n == self.total_slots {
            self.occupied.clear();
        } else if !self.occupied.contains(&2) {
            self.occupied.insert(2);
        }
        true
    }

    /// Mark a slot occupied. Idempotent; out-of-range ids are ignored.
    pub fn apply_occupied(&mut self, id: u8) -> bool {
        if id == 0 || id > self.total_slots {
            return false;
        }
        self.occupied.insert(id)
    }

    /// Mark a slot released. A no-op if the slot was not occupied.
    pub fn apply_released(&mut self, id: u8) -> bool {
        self.occupied.remove(&id)
    }

    /// Apply a whole-state count in snapshot (HTTP) mode.
    ///
    /// There is no per-slot ground truth on this transport, so the
    /// occupied set is synthesized from scratch every poll, filling from
    /// the highest-numbered bay downward. A rendering approximation only.
    pub fn apply_poll_count(&mut self, n: u8) -> bool {
        let n = n.min(self.total_slots);
        if n == self.available_count {
            return false;
        }
        self.available_count = n;
        self.occupied = (n + 1..=self.total_slots).collect();
        true
    }

    pub fn is_full(&self) -> bool {
        self.available_count == 0
    }
}

/// What the user is being alerted about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// All bays occupied
    Full,
}

impl NotificationKind {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Full => "Parking Status",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Full => {
                "We apologize for the inconvenience. All parking slots are \
                 currently occupied. Please wait for an available slot or \
                 try an alternative parking location."
            }
        }
    }
}

/// Current alert state. UI-session-scoped; discarded when the bridge
/// session ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationState {
    pub visible: bool,
    pub kind: Option<NotificationKind>,
}

/// A gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTransition {
    Raised(NotificationKind),
    Cleared,
}

/// Edge-triggered emitter for the parking-full alert.
///
/// Raises exactly on the availability transition `>0 -> 0` and clears when
/// full availability returns or the user dismisses. Idempotent against
/// repeated identical snapshots: while visible, further zero-availability
/// reports do not re-raise.
#[derive(Debug, Default)]
pub struct NotificationGate {
    state: NotificationState,
}

impl NotificationGate {
    pub fn state(&self) -> &NotificationState {
        &self.state
    }

    /// React to an availability change.
    pub fn on_count_change(
        &mut self,
        prev_available: u8,
        next: &SlotSnapshot,
    ) -> Option<GateTransition> {
        if next.available_count == 0 && prev_available > 0 && !self.state.visible {
            self.state.visible = true;
            self.state.kind = Some(NotificationKind::Full);
            return Some(GateTransition::Raised(NotificationKind::Full));
        }
        if next.available_count == next.total_slots && self.state.visible {
            self.state = NotificationState::default();
            return Some(GateTransition::Cleared);
        }
        None
    }

    /// React to an occupancy change. Secondary raise path: per-slot
    /// tracking can reach all-occupied without the count moving.
    pub fn on_occupancy(&mut self, next: &SlotSnapshot) -> Option<GateTransition> {
        if next.occupied.len() == next.total_slots as usize
            && next.available_count == 0
            && !self.state.visible
        {
            self.state.visible = true;
            self.state.kind = Some(NotificationKind::Full);
            return Some(GateTransition::Raised(NotificationKind::Full));
        }
        None
    }

    /// Explicit user dismissal. Takes effect immediately, independent of
    /// any hide animation in the UI layer. Returns false when nothing was
    /// visible.
    pub fn dismiss(&mut self) -> bool {
        if self.state.visible {
            self.state = NotificationState::default();
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.state = NotificationState::default();
    }
}

/// The per-session data-model entities, created on connect and reset on
/// disconnect. Nothing here outlives one connection session.
#[derive(Debug, Default)]
pub struct SessionState {
    pub slots: SlotSnapshot,
    pub alignment: Option<AlignmentStatus>,
    gate: NotificationGate,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notification(&self) -> &NotificationState {
        self.gate.state()
    }

    /// Reduce one device message into the session state.
    ///
    /// Returns the events the change produced, in emission order; an empty
    /// vec means the message was a no-op and downstream consumers must not
    /// be disturbed.
    pub fn apply(&mut self, msg: &DeviceMessage, mode: SlotMode) -> Vec<LinkEvent> {
        match msg {
            DeviceMessage::Alignment(token) => {
                let next = AlignmentStatus::from_token(token);
                let changed = self
                    .alignment
                    .as_ref()
                    .is_none_or(|prev| !prev.same_kind(&next));
                if !changed {
                    return Vec::new();
                }
                self.alignment = Some(next.clone());
                vec![LinkEvent::AlignmentChanged(next)]
            }
            DeviceMessage::SlotCount(n) => {
                let prev_available = self.slots.available_count;
                let changed = match mode {
                    SlotMode::Event => self.slots.apply_count(*n),
                    SlotMode::Snapshot => self.slots.apply_poll_count(*n),
                };
                if !changed {
                    return Vec::new();
                }
                let mut events = vec![LinkEvent::SlotsUpdated(self.slots.clone())];
                match self.gate.on_count_change(prev_available, &self.slots) {
                    Some(GateTransition::Raised(kind)) => {
                        events.push(LinkEvent::NotificationRaised(kind));
                    }
                    Some(GateTransition::Cleared) => events.push(LinkEvent::NotificationCleared),
                    None => {}
                }
                events
            }
            DeviceMessage::SlotOccupied(id) => {
                if !self.slots.apply_occupied(*id) {
                    return Vec::new();
                }
                let mut events = vec![LinkEvent::SlotsUpdated(self.slots.clone())];
                if let Some(GateTransition::Raised(kind)) = self.gate.on_occupancy(&self.slots) {
                    events.push(LinkEvent::NotificationRaised(kind));
                }
                events
            }
            DeviceMessage::SlotReleased(id) => {
                if !self.slots.apply_released(*id) {
                    return Vec::new();
                }
                vec![LinkEvent::SlotsUpdated(self.slots.clone())]
            }
        }
    }

    /// Dismiss the visible notification, if any.
    pub fn dismiss_notification(&mut self) -> bool {
        self.gate.dismiss()
    }

    /// Return every entity to its initial value. Called on session start
    /// and on disconnect.
    pub fn reset(&mut self) {
        self.slots = SlotSnapshot::default();
        self.alignment = None;
        self.gate.reset();
    }
}

/// The UI-facing state snapshot, updated synchronously after each
/// processed message and consumed by the rendering layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiState {
    pub connection: ConnectionState,
    pub slots: SlotSnapshot,
    pub alignment: Option<AlignmentStatus>,
    pub notification: NotificationState,
}
