//! Bridge between parking-guidance sensor devices and UI-facing state.
//!
//! The library core is [`device_link`]: a transport-agnostic session that
//! connects to a sensor device over serial or HTTP, classifies its message
//! stream, and reduces it into slot availability, alignment guidance, and
//! a parking-full notification. The [`daemon`] module wraps one session in
//! a long-running process with signal handling.

pub mod daemon;
pub mod device_link;
pub mod error;
pub mod tracing;
