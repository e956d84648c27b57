use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;
use firesight_common::frame::{FrameSource, LiveFrame, StreamUpdate};
use firesight_common::models::CameraId;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::meter::FrameRateMeter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Error,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Error => "error",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Something a socket task observed, tagged with the socket's generation.
#[derive(Debug)]
pub struct SocketEvent {
    pub generation: u64,
    pub kind: SocketEventKind,
}

/// Frames never travel through the event queue. They are parked in the
/// socket's [`FrameSlot`] and announced with `FrameReady`.
#[derive(Debug)]
pub enum SocketEventKind {
    Opened,
    Stats {
        detections: Option<u32>,
        fps: Option<f64>,
    },
    FrameReady,
    Failed(String),
    Closed,
}

/// Newest frame of one socket that the consumer has not picked up yet.
///
/// A newer frame overwrites an untaken one, so a slow consumer skips frames
/// instead of queueing them. Arrival rate is measured here, on the socket
/// side, so it reflects the stream rather than how fast frames are taken.
#[derive(Default)]
struct FrameSlot {
    latest: Option<LiveFrame>,
    arrived: u64,
    meter: FrameRateMeter,
}

type SharedSlot = Arc<Mutex<FrameSlot>>;

fn lock_slot(slot: &SharedSlot) -> std::sync::MutexGuard<'_, FrameSlot> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// Handle a socket task uses to report back to its consumer.
///
/// Every send returns `false` once the consumer is gone, which tells the
/// task to stop.
#[derive(Clone)]
pub struct SocketEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<SocketEvent>,
    frames: SharedSlot,
}

impl SocketEvents {
    fn send(&self, kind: SocketEventKind) -> bool {
        self.tx
            .send(SocketEvent {
                generation: self.generation,
                kind,
            })
            .is_ok()
    }

    pub fn opened(&self) -> bool {
        self.send(SocketEventKind::Opened)
    }

    pub fn update(&self, update: StreamUpdate) -> bool {
        self.update_at(update, Instant::now())
    }

    /// Hand over a decoded message that came off the wire at `arrived`.
    pub fn update_at(&self, update: StreamUpdate, arrived: Instant) -> bool {
        let (frame, detections, fps) = match update {
            StreamUpdate::Structured {
                frame,
                detections,
                fps,
            } => (frame.map(|f| (f, FrameSource::Inline)), detections, fps),
            StreamUpdate::RawFrame(data) => (Some((data, FrameSource::Binary)), None, None),
        };

        if (detections.is_some() || fps.is_some())
            && !self.send(SocketEventKind::Stats { detections, fps })
        {
            return false;
        }
        match frame {
            Some((data, source)) => self.offer_frame(data, source, arrived),
            None => !self.tx.is_closed(),
        }
    }

    fn offer_frame(&self, data: Bytes, source: FrameSource, arrived: Instant) -> bool {
        let was_empty = {
            let mut slot = lock_slot(&self.frames);
            slot.arrived += 1;
            slot.meter.record(arrived);
            let seq = slot.arrived;
            slot.latest.replace(LiveFrame::new(data, source, seq)).is_none()
        };
        // One announcement per empty-to-full transition.
        if was_empty {
            self.send(SocketEventKind::FrameReady)
        } else {
            !self.tx.is_closed()
        }
    }

    pub fn failed(&self, reason: impl Into<String>) -> bool {
        self.send(SocketEventKind::Failed(reason.into()))
    }

    pub fn closed(&self) -> bool {
        self.send(SocketEventKind::Closed)
    }
}

/// Opens per-camera sockets. `connect` must not block: it starts the
/// connection in the background and reports through `events`.
pub trait Connector {
    type Socket: Socket;

    fn connect(&self, camera_id: CameraId, events: SocketEvents) -> Self::Socket;
}

pub trait Socket {
    /// Stop the socket. Calling this more than once is harmless.
    fn close(&mut self);
}

/// What changed after a socket event was applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedChange {
    State(ConnectionState),
    Updated { frame: bool, stats: bool },
}

/// Point-in-time view of a consumer, cheap to clone and publish.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedStatus {
    pub camera_id: CameraId,
    pub state: ConnectionState,
    pub detection_count: u32,
    pub fps: f64,
    pub measured_fps: f64,
    pub frames_received: u64,
    pub last_frame_bytes: Option<usize>,
}

/// Live feed of one camera tile.
///
/// Owns at most one socket at a time. Each socket gets a fresh generation
/// number and a fresh frame slot; events carrying any other generation are
/// dropped, so nothing from a closed or replaced socket can touch the state.
/// Frames are not queued: only the newest untaken frame is kept.
///
/// Failures move the feed to `Error` and stay there until the owner calls
/// [`StreamConsumer::reconnect`]; there is no automatic retry.
pub struct StreamConsumer<C: Connector> {
    connector: C,
    camera_id: CameraId,
    state: ConnectionState,
    last_frame: Option<LiveFrame>,
    detection_count: u32,
    fps: f64,
    measured_fps: f64,
    /// Frames shown, which is fewer than frames arrived when some were skipped.
    frames_received: u64,
    socket: Option<C::Socket>,
    frames: SharedSlot,
    generation: u64,
    events_tx: mpsc::UnboundedSender<SocketEvent>,
    events_rx: mpsc::UnboundedReceiver<SocketEvent>,
}

impl<C: Connector> StreamConsumer<C> {
    /// A consumer bound to `camera_id`, not yet connected (`Closed`).
    pub fn new(connector: C, camera_id: CameraId) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            camera_id,
            state: ConnectionState::Closed,
            last_frame: None,
            detection_count: 0,
            fps: 0.0,
            measured_fps: 0.0,
            frames_received: 0,
            socket: None,
            frames: SharedSlot::default(),
            generation: 0,
            events_tx,
            events_rx,
        }
    }

    /// Connect to `camera_id`, closing any socket that is already open.
    ///
    /// Returns immediately in `Connecting`. Switching to a different camera
    /// resets the reported stats; re-opening the same camera keeps them.
    pub fn open(&mut self, camera_id: CameraId) {
        self.release_socket();

        if camera_id != self.camera_id {
            info!(from = %self.camera_id, to = %camera_id, "switching camera");
            self.camera_id = camera_id;
            self.detection_count = 0;
            self.fps = 0.0;
            self.frames_received = 0;
        }

        let events = SocketEvents {
            generation: self.generation,
            tx: self.events_tx.clone(),
            frames: Arc::clone(&self.frames),
        };
        info!(camera_id = %self.camera_id, generation = self.generation, "opening stream");
        self.socket = Some(self.connector.connect(self.camera_id, events));
        self.state = ConnectionState::Connecting;
    }

    /// Manual retry after a failure or close.
    pub fn reconnect(&mut self) {
        self.open(self.camera_id);
    }

    /// Close the socket and drop the last frame. Idempotent.
    pub fn close(&mut self) {
        if self.socket.is_some() {
            info!(camera_id = %self.camera_id, "closing stream");
        }
        self.release_socket();
        self.state = ConnectionState::Closed;
    }

    fn release_socket(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            socket.close();
        }
        self.last_frame = None;
        self.measured_fps = 0.0;
        // The old task keeps its own slot; nothing it writes is read again.
        self.frames = SharedSlot::default();
        // Anything still in flight from the old socket is now stale.
        self.generation += 1;
    }

    /// Apply one socket event. Returns what changed, if anything.
    pub fn apply(&mut self, event: SocketEvent) -> Option<FeedChange> {
        if event.generation != self.generation || self.socket.is_none() {
            debug!(
                camera_id = %self.camera_id,
                event_generation = event.generation,
                generation = self.generation,
                "ignoring event from stale socket"
            );
            return None;
        }

        match event.kind {
            SocketEventKind::Opened => {
                if self.state != ConnectionState::Connecting {
                    return None;
                }
                info!(camera_id = %self.camera_id, "stream open");
                self.state = ConnectionState::Open;
                Some(FeedChange::State(ConnectionState::Open))
            }
            SocketEventKind::Stats { detections, fps } => self.apply_stats(detections, fps),
            SocketEventKind::FrameReady => self.take_frame(),
            SocketEventKind::Failed(reason) => {
                warn!(camera_id = %self.camera_id, reason = %reason, "stream connection lost");
                self.release_socket();
                self.state = ConnectionState::Error;
                Some(FeedChange::State(ConnectionState::Error))
            }
            SocketEventKind::Closed => {
                info!(camera_id = %self.camera_id, "stream closed by server");
                self.release_socket();
                self.state = ConnectionState::Closed;
                Some(FeedChange::State(ConnectionState::Closed))
            }
        }
    }

    fn apply_stats(&mut self, detections: Option<u32>, fps: Option<f64>) -> Option<FeedChange> {
        if let Some(count) = detections {
            self.detection_count = count;
        }
        if let Some(fps) = fps {
            self.fps = fps;
        }
        (detections.is_some() || fps.is_some()).then_some(FeedChange::Updated {
            frame: false,
            stats: true,
        })
    }

    fn take_frame(&mut self) -> Option<FeedChange> {
        let (frame, measured_fps) = {
            let mut slot = lock_slot(&self.frames);
            let frame = slot.latest.take()?;
            (frame, slot.meter.fps())
        };
        self.frames_received += 1;
        self.measured_fps = measured_fps;
        self.last_frame = Some(frame);
        Some(FeedChange::Updated {
            frame: true,
            stats: false,
        })
    }

    /// Wait for the next event that changes something and apply it.
    pub async fn next_change(&mut self) -> Option<FeedChange> {
        loop {
            let event = self.events_rx.recv().await?;
            if let Some(change) = self.apply(event) {
                return Some(change);
            }
        }
    }

    /// Apply every event already queued, without waiting.
    pub fn process_pending(&mut self) -> Vec<FeedChange> {
        let mut changes = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            if let Some(change) = self.apply(event) {
                changes.push(change);
            }
        }
        changes
    }

    pub fn camera_id(&self) -> CameraId {
        self.camera_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn detection_count(&self) -> u32 {
        self.detection_count
    }

    /// Throughput as last reported by the backend.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Frame arrival rate measured on this side.
    pub fn measured_fps(&self) -> f64 {
        self.measured_fps
    }

    pub fn last_frame(&self) -> Option<&LiveFrame> {
        self.last_frame.as_ref()
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn status(&self) -> FeedStatus {
        FeedStatus {
            camera_id: self.camera_id,
            state: self.state,
            detection_count: self.detection_count,
            fps: self.fps,
            measured_fps: self.measured_fps,
            frames_received: self.frames_received,
            last_frame_bytes: self.last_frame.as_ref().map(LiveFrame::len),
        }
    }
}

impl<C: Connector> Drop for StreamConsumer<C> {
    fn drop(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            socket.close();
        }
    }
}
