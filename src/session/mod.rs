//! Client sessions
//!
//! One [`Session`] per connected browser. A session owns two SSRCs on the
//! daemon: its even primary for audio and tuning, and `primary + 1` for its
//! spectrum channel. The companion is never allocated on its own.
//!
//! The locks inside a session are never nested: frames are built under
//! `render`, then sent under `sink`, and `tuning` is only held for short
//! copies or updates.

pub mod registry;
pub mod sink;
pub mod state;
pub mod zoom;

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tracing::{debug, warn};

pub use registry::{Registry, SessionGuard};
pub use sink::ClientSink;
pub use state::{RenderState, Tuning};

/// Opaque handle the transport uses for a connection
pub type ConnectionId = uuid::Uuid;

/// A running spectrum poller.
///
/// Dropping `stop` closes the poller's cancel channel; it notices within one
/// poll period at most.
#[derive(Debug)]
pub struct SpectrumTask {
    pub stop: Sender<()>,
    pub thread: JoinHandle<()>,
}

impl SpectrumTask {
    /// Cancel and wait for the poller to finish its stop burst
    pub fn shutdown(self) {
        drop(self.stop);
        if self.thread.join().is_err() {
            warn!("spectrum poller panicked");
        }
    }
}

/// One connected client
pub struct Session {
    pub ssrc: u32,
    pub connection: ConnectionId,
    /// Peer address and user agent, for the status page
    pub client: String,
    pub connected_at: DateTime<Utc>,
    audio_active: AtomicBool,
    spectrum_active: AtomicBool,
    sink: Mutex<Box<dyn ClientSink>>,
    tuning: Mutex<Tuning>,
    render: Mutex<RenderState>,
    poller: Mutex<Option<SpectrumTask>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("ssrc", &self.ssrc)
            .field("connection", &self.connection)
            .field("client", &self.client)
            .field("audio_active", &self.audio_active())
            .field("spectrum_active", &self.spectrum_active())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(
        ssrc: u32,
        connection: ConnectionId,
        client: String,
        sink: Box<dyn ClientSink>,
    ) -> Self {
        Self {
            ssrc,
            connection,
            client,
            connected_at: Utc::now(),
            audio_active: AtomicBool::new(false),
            spectrum_active: AtomicBool::new(true),
            sink: Mutex::new(sink),
            tuning: Mutex::new(Tuning::default()),
            render: Mutex::new(RenderState::default()),
            poller: Mutex::new(None),
        }
    }

    /// SSRC of this session's spectrum channel
    pub fn companion_ssrc(&self) -> u32 {
        self.ssrc + 1
    }

    pub fn audio_active(&self) -> bool {
        self.audio_active.load(Ordering::Acquire)
    }

    pub fn set_audio_active(&self, active: bool) {
        self.audio_active.store(active, Ordering::Release);
    }

    pub fn spectrum_active(&self) -> bool {
        self.spectrum_active.load(Ordering::Acquire)
    }

    pub fn set_spectrum_active(&self, active: bool) {
        self.spectrum_active.store(active, Ordering::Release);
    }

    /// Spectrum parameters; held while zoom or frequency changes
    pub fn tuning(&self) -> MutexGuard<'_, Tuning> {
        self.tuning.lock()
    }

    pub fn render(&self) -> MutexGuard<'_, RenderState> {
        self.render.lock()
    }

    /// Exclusive access to the connection, for a multi-step send
    pub fn sink(&self) -> MutexGuard<'_, Box<dyn ClientSink>> {
        self.sink.lock()
    }

    /// Send a binary frame; failures are logged and dropped
    pub fn send_binary(&self, frame: Bytes) {
        if let Err(e) = self.sink.lock().send_binary(frame) {
            debug!(ssrc = self.ssrc, error = %e, "binary frame dropped");
        }
    }

    pub fn send_text(&self, text: String) {
        if let Err(e) = self.sink.lock().send_text(text) {
            debug!(ssrc = self.ssrc, error = %e, "text frame dropped");
        }
    }

    pub fn has_poller(&self) -> bool {
        self.poller.lock().is_some()
    }

    pub(crate) fn set_poller(&self, task: SpectrumTask) {
        *self.poller.lock() = Some(task);
    }

    pub(crate) fn take_poller(&self) -> Option<SpectrumTask> {
        self.poller.lock().take()
    }

    /// Status page row
    pub fn info(&self) -> SessionInfo {
        let tuning = self.tuning().clone();
        let (low, high) = tuning.range();
        SessionInfo {
            client: self.client.clone(),
            ssrc: self.ssrc,
            connected_at: self.connected_at,
            low_frequency: low,
            high_frequency: high,
            frequency: tuning.frequency,
            center_frequency: tuning.center_frequency,
            bins: tuning.bins,
            bin_width: tuning.bin_width,
            preset: tuning.requested_preset,
            audio_active: self.audio_active(),
            spectrum_active: self.spectrum_active(),
        }
    }
}

/// Serializable view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub client: String,
    pub ssrc: u32,
    pub connected_at: DateTime<Utc>,
    pub low_frequency: i64,
    pub high_frequency: i64,
    pub frequency: u32,
    pub center_frequency: u32,
    pub bins: u32,
    pub bin_width: u32,
    pub preset: String,
    pub audio_active: bool,
    pub spectrum_active: bool,
}
