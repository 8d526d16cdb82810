//! Device transports.
//!
//! The sensor device is reachable two ways: a serial line streaming
//! newline-delimited ASCII, or an HTTP endpoint polled for whole-state JSON
//! snapshots. The [`Transport`] trait abstracts both behind "give me the
//! next batch of classified messages", so the session loop and reducers are
//! written once. A channel-backed mock makes the session loop testable
//! without hardware.

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::time::{Duration, Instant, Interval, interval_at};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::trace;

use super::error::{LinkError, LinkResult};
use super::framer::LineFramer;
use super::messages::{DataSnapshot, DeviceMessage, classify_chunk};

/// Message-level ingestion for a device session.
///
/// One call corresponds to one suspension point of the ingestion loop: a
/// blocking read for serial, a timer tick plus fetch for HTTP. Returns
/// `None` on clean end-of-stream. A batch may be empty (serial chunk with
/// no complete line, poll with nothing new); that is not an error.
#[async_trait]
pub trait Transport: Send {
    /// Read the next batch of classified messages, alignment first.
    async fn next_messages(&mut self) -> LinkResult<Option<Vec<DeviceMessage>>>;

    /// Release transport resources. Called once during session teardown.
    async fn shutdown(&mut self) -> LinkResult<()>;
}

/// Serial connection to the sensor device.
///
/// Reads raw chunks at whatever boundaries the OS delivers them, runs them
/// through the line framer, and classifies the completed lines. Partial
/// lines stay buffered across reads.
pub struct SerialTransport {
    port: SerialStream,
    framer: LineFramer,
}

impl SerialTransport {
    /// Fixed device baud rate.
    pub const BAUD_RATE: u32 = 115_200;

    /// Open the serial device at `path` (e.g. `/dev/ttyUSB0`), 8N1 at
    /// [`BAUD_RATE`](Self::BAUD_RATE).
    pub fn open(path: &str) -> LinkResult<Self> {
        if path.is_empty() {
            return Err(LinkError::InvalidAddress(
                "empty serial device path".to_string(),
            ));
        }
        let port = tokio_serial::new(path, Self::BAUD_RATE)
            .open_native_async()
            .map_err(|source| LinkError::OpenFailed {
                path: path.to_string(),
                source,
            })?;
        Ok(Self {
            port,
            framer: LineFramer::new(),
        })
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn next_messages(&mut self) -> LinkResult<Option<Vec<DeviceMessage>>> {
        let mut buf = [0u8; 512];
        let n = self.port.read(&mut buf).await?;
        if n == 0 {
            // EOF - device went away
            return Ok(None);
        }

        let chunk = String::from_utf8_lossy(&buf[..n]);
        trace!(rx = %chunk.escape_debug(), "Received chunk");

        let lines = self.framer.feed(&chunk);
        Ok(Some(classify_chunk(&lines)))
    }

    async fn shutdown(&mut self) -> LinkResult<()> {
        // The port itself closes on drop.
        self.framer.reset();
        Ok(())
    }
}

/// Validate the dotted-quad IPv4 form the device prompt accepts
/// (`xxx.xxx.xxx.xxx`, 1-3 digits per group).
pub fn is_dotted_quad(addr: &str) -> bool {
    let mut groups = 0;
    for part in addr.split('.') {
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        groups += 1;
    }
    groups == 4
}

/// HTTP polling connection to the sensor device.
///
/// The device serves its whole state as JSON at `GET /data`. Connecting
/// performs a probe request that must succeed; its body is kept and
/// processed as the first poll result. Thereafter one poll fires per
/// interval tick.
pub struct HttpTransport {
    http: reqwest::Client,
    url: String,
    interval: Interval,
    /// Count seen on the previous poll, for change suppression.
    last_slots: Option<u8>,
    /// Probe response body, consumed by the first `next_messages` call.
    pending: Option<DataSnapshot>,
}

impl HttpTransport {
    /// Fixed poll cadence once connected.
    pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);

    /// Validate `ip` and probe the device before declaring the connection
    /// up. A malformed address, an unreachable device, a non-2xx response,
    /// or an unparseable probe body all fail the connect.
    pub async fn connect(ip: &str) -> LinkResult<Self> {
        if !is_dotted_quad(ip) {
            return Err(LinkError::InvalidAddress(format!(
                "{} is not a dotted-quad IPv4 address",
                ip
            )));
        }
        Self::connect_url(format!("http://{}/data", ip)).await
    }

    pub(crate) async fn connect_url(url: String) -> LinkResult<Self> {
        let http = reqwest::Client::new();

        let response = http
            .get(&url)
            .send()
            .await
            .map_err(|e| LinkError::ProbeFailed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(LinkError::ProbeFailed(format!("HTTP {}", status)));
        }
        let first: DataSnapshot = response
            .json()
            .await
            .map_err(|e| LinkError::ProbeFailed(e.to_string()))?;

        Ok(Self {
            http,
            url,
            // First tick one full interval from now; the probe body stands
            // in for the poll at t=0.
            interval: interval_at(Instant::now() + Self::POLL_INTERVAL, Self::POLL_INTERVAL),
            last_slots: None,
            pending: Some(first),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn next_messages(&mut self) -> LinkResult<Option<Vec<DeviceMessage>>> {
        let snapshot = match self.pending.take() {
            Some(snapshot) => snapshot,
            None => {
                self.interval.tick().await;
                let response = self
                    .http
                    .get(&self.url)
                    .send()
                    .await
                    .map_err(|e| LinkError::ConnectionLost(e.to_string()))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(LinkError::ConnectionLost(format!("HTTP {}", status)));
                }
                response
                    .json()
                    .await
                    .map_err(|e| LinkError::ConnectionLost(e.to_string()))?
            }
        };

        trace!(?snapshot, "Polled device");
        let messages = snapshot.messages(self.last_slots);
        if let Some(n) = snapshot.slots {
            self.last_slots = Some(n);
        }
        Ok(Some(messages))
    }

    async fn shutdown(&mut self) -> LinkResult<()> {
        // Dropping the interval unschedules further polls; an in-flight
        // fetch was already abandoned with the session loop.
        Ok(())
    }
}

/// Channel-based transport for deterministic testing.
///
/// Backed by an unbounded channel rather than real I/O, so session-loop
/// tests control exactly what arrives and when. Create a pair with
/// [`MockTransport::pair()`]; the transport is the session's side, the
/// handle is the test's side.
#[cfg(test)]
pub(crate) struct MockTransport {
    rx: tokio::sync::mpsc::UnboundedReceiver<LinkResult<Vec<DeviceMessage>>>,
}

/// Test-side handle for a [`MockTransport`].
#[cfg(test)]
pub(crate) struct MockTransportHandle {
    tx: tokio::sync::mpsc::UnboundedSender<LinkResult<Vec<DeviceMessage>>>,
}

#[cfg(test)]
impl MockTransport {
    /// Create a linked (transport, handle) pair.
    pub fn pair() -> (Self, MockTransportHandle) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (MockTransport { rx }, MockTransportHandle { tx })
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for MockTransport {
    async fn next_messages(&mut self) -> LinkResult<Option<Vec<DeviceMessage>>> {
        match self.rx.recv().await {
            Some(Ok(messages)) => Ok(Some(messages)),
            Some(Err(e)) => Err(e),
            // Handle dropped: clean end-of-stream.
            None => Ok(None),
        }
    }

    async fn shutdown(&mut self) -> LinkResult<()> {
        Ok(())
    }
}

#[cfg(test)]
impl MockTransportHandle {
    /// Deliver a batch of messages to the session.
    pub fn send(&self, messages: Vec<DeviceMessage>) {
        self.tx.send(Ok(messages)).expect("transport dropped");
    }

    /// Deliver a transport failure to the session.
    pub fn fail(&self, err: LinkError) {
        self.tx.send(Err(err)).expect("transport dropped");
    }
}
