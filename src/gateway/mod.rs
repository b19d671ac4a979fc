//! Gateway core
//!
//! [`Gateway`] ties the session registry to the daemon. Three kinds of
//! threads drive it:
//!
//! - the status loop ([`bridge`]) routes daemon status to sessions and
//!   builds their status and spectrum frames
//! - the audio loop ([`audio`]) forwards RTP audio to listening sessions
//! - one spectrum poller per session ([`poller`]) keeps its spectrum
//!   channel asking for bins
//!
//! Client commands arrive from the transport and are applied by
//! [`commands`]. Lock order is registry, then control; the pollers never
//! take the registry lock.

pub mod audio;
pub mod bridge;
pub mod commands;
pub mod control;
pub mod poller;
pub mod snapshot;
pub mod spectrum;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::info;

use crate::config::GatewayConfig;
use crate::error::SessionError;
use crate::protocol::DaemonState;
use crate::session::state::{DEFAULT_FREQUENCY, DEFAULT_PRESET};
use crate::session::{ClientSink, ConnectionId, Registry, Session};

pub use commands::ClientCommand;
pub use control::Control;
pub use snapshot::SnapshotCell;
pub use spectrum::BinPrecision;

/// Runtime knobs taken from the configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub precision: BinPrecision,
    /// Sent instead of the daemon's description when set
    pub description_override: Option<String>,
    pub poll_interval: Duration,
    /// Stop commands sent when a spectrum channel is torn down
    pub stop_repeats: u32,
    pub stop_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            precision: BinPrecision::Float,
            description_override: None,
            poll_interval: Duration::from_millis(100),
            stop_repeats: 3,
            stop_interval: Duration::from_millis(100),
        }
    }
}

impl From<&GatewayConfig> for Settings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            precision: BinPrecision::from(config.spectrum.bin_precision_bytes),
            description_override: config.description_override.clone(),
            poll_interval: Duration::from_millis(config.spectrum.poll_interval_ms),
            stop_repeats: config.spectrum.stop_repeats,
            stop_interval: Duration::from_millis(config.spectrum.stop_interval_ms),
        }
    }
}

pub struct Gateway {
    registry: Registry,
    snapshot: SnapshotCell,
    control: Control,
    settings: Settings,
    /// Sequence shared by every status and spectrum frame
    seq: AtomicU16,
    /// Taken the first time the daemon reports its audio group
    audio_dest: Mutex<Option<Sender<SocketAddr>>>,
    running: AtomicBool,
}

impl Gateway {
    /// Build the gateway. The receiver yields the daemon's audio group once
    /// a channel status has reported it.
    pub fn new(control: Control, settings: Settings) -> (Arc<Self>, Receiver<SocketAddr>) {
        let (tx, rx) = bounded(1);
        let gateway = Arc::new(Self {
            registry: Registry::new(),
            snapshot: SnapshotCell::new(),
            control,
            settings,
            seq: AtomicU16::new(0),
            audio_dest: Mutex::new(Some(tx)),
            running: AtomicBool::new(true),
        });
        (gateway, rx)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn control(&self) -> &Control {
        &self.control
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Latest published daemon state
    pub fn daemon(&self) -> Arc<DaemonState> {
        self.snapshot.load()
    }

    pub fn snapshot(&self) -> &SnapshotCell {
        &self.snapshot
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the receive loops to exit; they notice within one read timeout
    pub fn shutdown(&self) {
        info!("gateway shutting down");
        self.running.store(false, Ordering::Release);
    }

    fn next_seq(&self) -> u16 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a new client and bring up its daemon channels
    pub fn open_session(
        &self,
        connection: ConnectionId,
        client: String,
        sink: Box<dyn ClientSink>,
    ) -> Result<Arc<Session>, SessionError> {
        let session = self.registry.insert(connection, client, sink)?;
        self.control
            .create_channels(session.ssrc, DEFAULT_FREQUENCY as f64, DEFAULT_PRESET);
        Ok(session)
    }

    /// Tear down the session owned by `connection`.
    ///
    /// The session leaves the registry first, so overlapping closes tear it
    /// down once. Then the primary channel is tuned to 0 Hz to release it
    /// and the spectrum poller is stopped. Blocks while the poller finishes.
    pub fn close_session(&self, connection: &ConnectionId) {
        let Some(session) = self.registry.take(connection) else {
            return;
        };
        info!(ssrc = session.ssrc, "closing session");

        self.control.set_frequency(session.ssrc, 0.0);
        session.set_audio_active(false);
        let spectrum_was_active = session.spectrum_active();
        session.set_spectrum_active(false);
        match session.take_poller() {
            Some(task) => task.shutdown(),
            None if spectrum_was_active => self.stop_burst(session.companion_ssrc()),
            None => {}
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::session::sink::MemorySink;
    use std::net::UdpSocket;

    /// A gateway whose control socket points at a local socket standing in
    /// for the daemon
    pub fn gateway(settings: Settings) -> (Arc<Gateway>, Receiver<SocketAddr>, UdpSocket) {
        let daemon = UdpSocket::bind("127.0.0.1:0").unwrap();
        daemon
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let tx = UdpSocket::bind("127.0.0.1:0").unwrap();
        tx.connect(daemon.local_addr().unwrap()).unwrap();
        let (gateway, rx) = Gateway::new(Control::new(tx), settings);
        (gateway, rx, daemon)
    }

    pub fn fast_settings() -> Settings {
        Settings {
            poll_interval: Duration::from_millis(10),
            stop_interval: Duration::from_millis(1),
            ..Settings::default()
        }
    }

    pub fn open(gateway: &Gateway) -> (Arc<Session>, MemorySink) {
        let sink = MemorySink::new();
        let session = gateway
            .open_session(
                ConnectionId::new_v4(),
                "127.0.0.1:50000".to_string(),
                Box::new(sink.clone()),
            )
            .unwrap();
        (session, sink)
    }

    /// Drain everything the daemon side has received
    pub fn drain(daemon: &UdpSocket) -> Vec<Vec<u8>> {
        daemon
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 2048];
        while let Ok(n) = daemon.recv(&mut buf) {
            out.push(buf[..n].to_vec());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::protocol::tlv::{decode_double, find_field, get_ssrc};
    use crate::protocol::StatusType;

    #[test]
    fn test_open_session_creates_both_channels() {
        let (gateway, _rx, daemon) = gateway(fast_settings());
        let (session, _sink) = open(&gateway);
        assert_eq!(session.ssrc, 1000);

        let sent = drain(&daemon);
        let ssrcs: Vec<_> = sent.iter().map(|c| get_ssrc(&c[1..])).collect();
        assert_eq!(ssrcs, [Some(1000), Some(1001)]);
    }

    #[test]
    fn test_close_session_releases_channel() {
        let (gateway, _rx, daemon) = gateway(fast_settings());
        let (session, _sink) = open(&gateway);
        drain(&daemon);

        gateway.close_session(&session.connection);
        assert!(gateway.registry().is_empty());
        assert!(!session.spectrum_active());

        let sent = drain(&daemon);
        // tune to 0 on the primary, then the stop burst on the companion
        assert_eq!(get_ssrc(&sent[0][1..]), Some(1000));
        let freq = find_field(&sent[0][1..], StatusType::RadioFrequency).unwrap();
        assert_eq!(decode_double(freq), 0.0);
        assert_eq!(sent.len(), 1 + 3);
        assert!(sent[1..].iter().all(|c| get_ssrc(&c[1..]) == Some(1001)));
    }

    #[test]
    fn test_overlapping_closes_tear_down_once() {
        let (gateway, _rx, daemon) = gateway(fast_settings());
        let (session, _sink) = open(&gateway);
        drain(&daemon);

        let closers: Vec<_> = (0..4)
            .map(|_| {
                let gateway = gateway.clone();
                let connection = session.connection;
                std::thread::spawn(move || gateway.close_session(&connection))
            })
            .collect();
        for closer in closers {
            closer.join().unwrap();
        }

        assert!(gateway.registry().is_empty());
        // one tune to 0 and one stop burst
        assert_eq!(drain(&daemon).len(), 1 + 3);
    }

    #[test]
    fn test_close_unknown_connection_is_noop() {
        let (gateway, _rx, daemon) = gateway(fast_settings());
        gateway.close_session(&ConnectionId::new_v4());
        assert!(drain(&daemon).is_empty());
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = GatewayConfig::default();
        config.spectrum.bin_precision_bytes = 1;
        config.description_override = Some("40m loop".into());
        let settings = Settings::from(&config);
        assert_eq!(settings.precision, BinPrecision::Byte);
        assert_eq!(settings.description_override.as_deref(), Some("40m loop"));
        assert_eq!(settings.stop_repeats, 3);
    }
}
