//! Audio relay
//!
//! The daemon's audio is RTP on one multicast group shared by every
//! channel. Packets are routed by SSRC and forwarded untouched to sessions
//! that have audio turned on.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{info, trace, warn};

use super::Gateway;
use crate::constants::MAX_DATAGRAM;
use crate::error::NetworkError;
use crate::network::multicast::{listen_mcast, RECV_TIMEOUT};
use crate::protocol::rtp::{RtpPacket, RTP_MIN_SIZE};

impl Gateway {
    /// Forward one audio packet. Returns true if a session took it.
    pub fn relay_audio(&self, packet: &[u8]) -> bool {
        if packet.len() <= RTP_MIN_SIZE {
            return false;
        }
        let parsed = match RtpPacket::parse(packet) {
            Ok(parsed) => parsed,
            Err(e) => {
                trace!(error = %e, "audio packet dropped");
                return false;
            }
        };
        if parsed.payload.is_empty() {
            return false;
        }
        let Some(session) = self.registry.lookup(parsed.header.ssrc) else {
            return false;
        };
        if !session.audio_active() {
            return false;
        }
        session.send_binary(Bytes::copy_from_slice(packet));
        true
    }
}

/// Wait for the status loop to learn the daemon's audio group.
///
/// Returns `None` if the gateway shuts down first.
pub fn wait_for_audio_group(gateway: &Gateway, announced: &Receiver<SocketAddr>) -> Option<SocketAddr> {
    loop {
        match announced.recv_timeout(RECV_TIMEOUT) {
            Ok(group) => return Some(group),
            Err(RecvTimeoutError::Timeout) if gateway.is_running() => {}
            Err(_) => return None,
        }
    }
}

/// Join `group` and relay audio until the gateway shuts down
pub fn run_audio_loop(gateway: Arc<Gateway>, group: SocketAddr) -> Result<(), NetworkError> {
    let socket = listen_mcast(None, &group, None)?;
    info!(group = %group, "audio relay started");
    relay_from(&gateway, &socket);
    info!("audio relay stopped");
    Ok(())
}

fn relay_from(gateway: &Gateway, socket: &UdpSocket) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    while gateway.is_running() {
        match socket.recv(&mut buf) {
            Ok(len) => {
                gateway.relay_audio(&buf[..len]);
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                warn!(error = %e, "audio receive failed");
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
}
