//! Signal head hardware
//!
//! [`SignalHead`] is the outbound seam to the physical lights. Two
//! implementations ship with the crate: a simulated head that only records
//! commands, and a TCP line link speaking the rig's `<head><color>`
//! protocol. [`SignalDriver`] sits in front of either one and owns the
//! retry and degraded-mode rules.
//!
//! Once a command fails twice the driver is offline. While offline it
//! skips commands without touching the head, except for one reconnect attempt
//! per reconnect interval; the first one that succeeds brings it back.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info, warn};

use crate::error::HardwareError;
use crate::observability::events::{Event, EventEmitter};
use crate::observability::metrics;

use super::lane::{HeadMap, Lane, LaneColor};
use super::state::SharedTrafficState;

/// Longest acknowledgement line accepted from the rig.
const MAX_ACK_LINE: usize = 256;

/// Default gap between reconnect attempts while the head is offline.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// One color command for one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LaneCommand {
    /// Target lane.
    pub lane: Lane,
    /// Color to show.
    pub color: LaneColor,
}

impl LaneCommand {
    /// Convenience constructor.
    #[must_use]
    pub const fn new(lane: Lane, color: LaneColor) -> Self {
        Self { lane, color }
    }
}

/// Hardware sink accepting per-lane color commands.
#[async_trait]
pub trait SignalHead: Send + Sync {
    /// Shows `color` on the head wired to `lane`.
    async fn set_lane_color(&self, lane: Lane, color: LaneColor) -> Result<(), HardwareError>;

    /// Short name for logs.
    fn describe(&self) -> String;
}

/// A command as seen by the simulated head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedCommand {
    /// Target lane.
    pub lane: Lane,
    /// Commanded color.
    pub color: LaneColor,
    /// When the command arrived.
    pub at: Instant,
}

/// Head that accepts every command and keeps a log of them.
#[derive(Debug, Default)]
pub struct SimulatedSignalHead {
    log: Mutex<Vec<RecordedCommand>>,
}

impl SimulatedSignalHead {
    /// Creates an empty simulated head.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command received so far.
    #[must_use]
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SignalHead for SimulatedSignalHead {
    async fn set_lane_color(&self, lane: Lane, color: LaneColor) -> Result<(), HardwareError> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCommand {
                lane,
                color,
                at: Instant::now(),
            });
        Ok(())
    }

    fn describe(&self) -> String {
        "simulated".to_string()
    }
}

/// Connection settings for [`TcpSignalLink`].
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// `host:port` of the rig controller.
    pub addr: String,
    /// Lane to head letter wiring.
    pub head_map: HeadMap,
    /// Bound on establishing the connection.
    pub connect_timeout: Duration,
    /// How long to wait for an optional acknowledgement line. `None`
    /// disables acknowledgement reads.
    pub ack_timeout: Option<Duration>,
}

/// Line-oriented TCP link to the rig's signal controller.
///
/// The connection is opened lazily and dropped after any failure so the
/// next command reconnects. Commands are serialized through an async mutex
/// held across the write and the acknowledgement read.
pub struct TcpSignalLink {
    settings: LinkSettings,
    conn: tokio::sync::Mutex<Option<Framed<TcpStream, LinesCodec>>>,
}

impl std::fmt::Debug for TcpSignalLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSignalLink")
            .field("addr", &self.settings.addr)
            .finish_non_exhaustive()
    }
}

impl TcpSignalLink {
    /// Creates a link; no connection is attempted until the first command.
    #[must_use]
    pub fn new(settings: LinkSettings) -> Self {
        Self {
            settings,
            conn: tokio::sync::Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<Framed<TcpStream, LinesCodec>, HardwareError> {
        let addr = &self.settings.addr;
        let stream = tokio::time::timeout(self.settings.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| HardwareError::ConnectionFailed {
                addr: addr.clone(),
                reason: format!("timed out after {:?}", self.settings.connect_timeout),
            })?
            .map_err(|e| HardwareError::ConnectionFailed {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;
        let _ = stream.set_nodelay(true);
        debug!(%addr, "hardware link connected");
        Ok(Framed::new(
            stream,
            LinesCodec::new_with_max_length(MAX_ACK_LINE),
        ))
    }
}

#[async_trait]
impl SignalHead for TcpSignalLink {
    async fn set_lane_color(&self, lane: Lane, color: LaneColor) -> Result<(), HardwareError> {
        let mut guard = self.conn.lock().await;
        let framed = match guard.as_mut() {
            Some(framed) => framed,
            None => guard.insert(self.connect().await?),
        };

        let line = format!("{}{}", self.settings.head_map.head(lane), color.code());
        let failed = |reason: String| HardwareError::CommandFailed {
            lane,
            color,
            reason,
        };

        if let Err(e) = framed.send(line.as_str()).await {
            *guard = None;
            return Err(failed(e.to_string()));
        }

        let Some(ack_timeout) = self.settings.ack_timeout else {
            return Ok(());
        };
        match tokio::time::timeout(ack_timeout, framed.next()).await {
            Ok(Some(Ok(reply))) if reply.trim_start().starts_with("ERR") => {
                Err(HardwareError::Rejected {
                    lane,
                    color,
                    reply: reply.trim().to_string(),
                })
            }
            Ok(Some(Ok(reply))) => {
                debug!(command = %line, reply = %reply.trim(), "rig acknowledged");
                Ok(())
            }
            Ok(Some(Err(e))) => {
                *guard = None;
                Err(failed(e.to_string()))
            }
            Ok(None) => {
                *guard = None;
                Err(failed("link closed by rig".to_string()))
            }
            // no acknowledgement is not an error
            Err(_) => Ok(()),
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.settings.addr)
    }
}

/// Delivers lane commands with retry, stale marking and degraded mode.
///
/// The shared light state always receives the commanded color, whether or
/// not the hardware accepted it.
pub struct SignalDriver {
    head: Arc<dyn SignalHead>,
    state: Arc<SharedTrafficState>,
    events: Arc<EventEmitter>,
    reconnect_interval: Duration,
    last_failure: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for SignalDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalDriver")
            .field("head", &self.head.describe())
            .finish_non_exhaustive()
    }
}

impl SignalDriver {
    /// Wraps `head`.
    #[must_use]
    pub fn new(
        head: Arc<dyn SignalHead>,
        state: Arc<SharedTrafficState>,
        events: Arc<EventEmitter>,
    ) -> Self {
        Self {
            head,
            state,
            events,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            last_failure: Mutex::new(None),
        }
    }

    /// Sets the gap between reconnect attempts while offline.
    #[must_use]
    pub const fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Description of the wrapped head.
    #[must_use]
    pub fn describe(&self) -> String {
        self.head.describe()
    }

    /// Sends one command, retrying once. Returns `true` when delivered.
    ///
    /// While offline the command gets a single attempt, and only when a
    /// reconnect is due; otherwise it is skipped at once.
    pub async fn command(&self, lane: Lane, color: LaneColor) -> bool {
        if !self.state.is_hardware_online() {
            return self.command_offline(lane, color).await;
        }
        let first = match self.head.set_lane_color(lane, color).await {
            Ok(()) => return self.delivered(lane, color),
            Err(e) => e,
        };
        warn!(%lane, %color, error = %first, "lane command failed, retrying");

        match self.head.set_lane_color(lane, color).await {
            Ok(()) => self.delivered(lane, color),
            Err(e) => {
                warn!(%lane, %color, error = %e, "lane command skipped after retry");
                self.failed(lane, color, &e)
            }
        }
    }

    async fn command_offline(&self, lane: Lane, color: LaneColor) -> bool {
        if !self.claim_reconnect() {
            debug!(%lane, %color, "hardware offline, lane command skipped");
            self.state.set_lane_light(lane, color, true);
            metrics::record_hardware_failure(lane);
            return false;
        }
        debug!(%lane, %color, "retrying offline hardware");
        match self.head.set_lane_color(lane, color).await {
            Ok(()) => self.delivered(lane, color),
            Err(e) => self.failed(lane, color, &e),
        }
    }

    /// Takes the reconnect slot if the interval since the last failure is up.
    fn claim_reconnect(&self) -> bool {
        let mut last = self
            .last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if last.is_some_and(|at| now < at + self.reconnect_interval) {
            return false;
        }
        *last = Some(now);
        true
    }

    fn failed(&self, lane: Lane, color: LaneColor, error: &HardwareError) -> bool {
        *self
            .last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        self.state.set_lane_light(lane, color, true);
        if self.state.set_hardware_online(false) {
            warn!(head = %self.head.describe(), "hardware unreachable, continuing in simulation mode");
        }
        metrics::record_hardware_failure(lane);
        self.events.emit(Event::LaneCommandFailed {
            timestamp: Utc::now(),
            lane: u8::from(lane),
            color,
            error: error.to_string(),
        });
        false
    }

    fn delivered(&self, lane: Lane, color: LaneColor) -> bool {
        debug!(%lane, %color, "lane command delivered");
        self.state.set_lane_light(lane, color, false);
        if !self.state.set_hardware_online(true) {
            info!(head = %self.head.describe(), "hardware link restored");
        }
        true
    }

    /// Sends a batch in order with `stagger` between consecutive commands.
    ///
    /// Returns how many commands were skipped.
    pub async fn apply(&self, commands: &[LaneCommand], stagger: Duration) -> usize {
        let mut failed = 0;
        for (i, cmd) in commands.iter().enumerate() {
            if i > 0 && !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }
            if !self.command(cmd.lane, cmd.color).await {
                failed += 1;
            }
        }
        failed
    }

    /// Commands every lane red, ignoring any sequence in progress.
    pub async fn all_red(&self) -> usize {
        self.apply(&all_red_commands(), Duration::ZERO).await
    }
}

/// Red for every lane, in lane order.
#[must_use]
pub fn all_red_commands() -> Vec<LaneCommand> {
    Lane::ALL
        .iter()
        .map(|lane| LaneCommand::new(*lane, LaneColor::Red))
        .collect()
}
