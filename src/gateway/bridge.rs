//! Status loop
//!
//! Every daemon status datagram is routed by its output SSRC before it is
//! decoded. An odd SSRC is a spectrum reply for the session one below it;
//! an even SSRC is that session's own channel status. Datagrams for SSRCs
//! with no session are dropped undecoded.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info, trace, warn};

use super::spectrum::{extract_powers, spectrum_frame, update_autorange, BinPrecision};
use super::Gateway;
use crate::constants::{MAX_DATAGRAM, PT_STATUS};
use crate::protocol::tlv::{decode_float, encode_float, encode_string, find_field, get_ssrc};
use crate::protocol::{split_packet, DaemonState, PacketKind, RtpHeader, StatusType};
use crate::session::Session;

impl Gateway {
    /// Handle one datagram from the daemon's status group
    pub fn handle_status(&self, datagram: &[u8]) {
        let Some((kind, record)) = split_packet(datagram) else {
            trace!(len = datagram.len(), "unrecognised datagram");
            return;
        };
        if kind != PacketKind::Status {
            // our own commands, looped back
            return;
        }
        let Some(ssrc) = get_ssrc(record) else {
            return;
        };
        if ssrc % 2 == 1 {
            self.handle_spectrum(ssrc - 1, record);
        } else {
            self.handle_channel(ssrc, record);
        }
    }

    fn handle_spectrum(&self, primary: u32, record: &[u8]) {
        let Some(session) = self.registry.lookup(primary) else {
            return;
        };
        let daemon = self.snapshot.apply(record);
        let powers = match extract_powers(record, session.companion_ssrc(), daemon.frontend.fft_size()) {
            Ok(powers) => powers,
            Err(e) => {
                trace!(ssrc = primary, error = %e, "spectrum reply discarded");
                return;
            }
        };

        let tuning = session.tuning().clone();
        let precision = self.settings.precision;
        let frame = {
            let mut render = session.render();
            render.min_db = powers.min_db;
            render.max_db = powers.max_db;
            if let Some(if_power) = powers.if_power {
                render.if_power = if_power;
            }
            if precision == BinPrecision::Byte && update_autorange(&mut render) {
                trace!(
                    ssrc = primary,
                    offset = render.autorange_offset,
                    gain = render.autorange_gain,
                    "spectrum rescaled"
                );
            }
            spectrum_frame(
                session.ssrc,
                self.next_seq(),
                &tuning,
                &daemon,
                &render,
                precision,
                &powers.bins,
            )
        };
        session.send_binary(frame);
    }

    fn handle_channel(&self, ssrc: u32, record: &[u8]) {
        let Some(session) = self.registry.lookup(ssrc) else {
            return;
        };
        let daemon = self.snapshot.apply(record);
        if let Some(n0) = find_field(record, StatusType::NoiseDensity) {
            session.render().noise_density = decode_float(n0);
        }

        self.reconcile(&session, &daemon);
        if let Some(dest) = daemon.channel.output.dest_socket {
            self.signal_audio_dest(dest);
        }
        let frame = self.status_frame(&session, &daemon);
        session.send_binary(frame);
    }

    /// Re-send whatever the daemon has not applied yet
    fn reconcile(&self, session: &Session, daemon: &DaemonState) {
        let (preset, frequency) = {
            let tuning = session.tuning();
            (tuning.requested_preset.clone(), tuning.frequency)
        };
        if daemon.channel.preset != preset {
            debug!(
                ssrc = session.ssrc,
                requested = %preset,
                reported = %daemon.channel.preset,
                "preset mismatch, retrying"
            );
            self.control.set_preset(session.ssrc, &preset);
        }
        if daemon.channel.tune.freq != frequency as f64 {
            debug!(
                ssrc = session.ssrc,
                requested = frequency,
                reported = daemon.channel.tune.freq,
                "frequency mismatch, retrying"
            );
            self.control.set_frequency(session.ssrc, frequency as f64);
        }
    }

    pub(crate) fn signal_audio_dest(&self, dest: SocketAddr) {
        if let Some(tx) = self.audio_dest.lock().take() {
            info!(group = %dest, "daemon audio group known");
            // the relay may already be gone at shutdown
            let _ = tx.try_send(dest);
        }
    }

    /// Baseband power and filter edges, plus the description once per session
    fn status_frame(&self, session: &Session, daemon: &DaemonState) -> Bytes {
        let header = RtpHeader::new(PT_STATUS, self.next_seq(), 0, session.ssrc).with_marker(true);
        let mut buf = BytesMut::with_capacity(256);
        header.encode(&mut buf);
        encode_float(&mut buf, StatusType::BasebandPower, daemon.channel.bb_power);
        encode_float(&mut buf, StatusType::LowEdge, daemon.channel.min_if);
        encode_float(&mut buf, StatusType::HighEdge, daemon.channel.max_if);

        let mut render = session.render();
        if !render.description_sent {
            render.description_sent = true;
            let description = self
                .settings
                .description_override
                .as_deref()
                .unwrap_or(&daemon.frontend.description);
            encode_string(&mut buf, StatusType::Description, description);
        }
        buf.freeze()
    }
}

/// Receive daemon status until the gateway shuts down
pub fn run_status_loop(gateway: Arc<Gateway>, socket: UdpSocket) {
    info!("status loop started");
    let mut buf = vec![0u8; MAX_DATAGRAM];
    while gateway.is_running() {
        match socket.recv(&mut buf) {
            Ok(len) => gateway.handle_status(&buf[..len]),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                warn!(error = %e, "status receive failed");
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
    info!("status loop stopped");
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::Settings;
    use super::*;
    use crate::constants::PT_SPECTRUM;
    use crate::protocol::tlv::{
        decode_string, encode_double, encode_eol, encode_int, encode_int32, encode_socket,
        encode_vector, Fields,
    };
    use crate::protocol::RtpPacket;

    fn channel_status(ssrc: u32, freq: f64, preset: &str) -> Vec<u8> {
        let mut buf = vec![PacketKind::Status as u8];
        encode_int32(&mut buf, StatusType::OutputSsrc, ssrc);
        encode_string(&mut buf, StatusType::Description, "hf rx");
        encode_double(&mut buf, StatusType::RadioFrequency, freq);
        encode_string(&mut buf, StatusType::Preset, preset);
        encode_float(&mut buf, StatusType::BasebandPower, -40.0);
        encode_float(&mut buf, StatusType::LowEdge, -5000.0);
        encode_float(&mut buf, StatusType::HighEdge, 5000.0);
        encode_float(&mut buf, StatusType::NoiseDensity, -160.0);
        encode_socket(
            &mut buf,
            StatusType::OutputDataDestSocket,
            &"239.1.2.3:5004".parse().unwrap(),
        );
        encode_eol(&mut buf);
        buf
    }

    fn spectrum_reply(ssrc: u32, bins: &[f32]) -> Vec<u8> {
        let mut buf = vec![PacketKind::Status as u8];
        encode_int32(&mut buf, StatusType::OutputSsrc, ssrc);
        encode_int(&mut buf, StatusType::FilterBlocksize, 960);
        encode_int(&mut buf, StatusType::FilterFirLength, 241);
        encode_int(&mut buf, StatusType::DemodType, 3);
        encode_int(&mut buf, StatusType::BinCount, bins.len() as i32);
        encode_float(&mut buf, StatusType::IfPower, -15.0);
        encode_vector(&mut buf, StatusType::BinData, bins);
        encode_eol(&mut buf);
        buf
    }

    fn fields(frame: &[u8]) -> Vec<(u8, Vec<u8>)> {
        let packet = RtpPacket::parse(frame).unwrap();
        Fields::new(packet.payload)
            .map(|f| (f.code, f.value.to_vec()))
            .collect()
    }

    #[test]
    fn test_channel_status_frame_and_description_once() {
        let (gateway, rx, daemon) = gateway(fast_settings());
        let (session, sink) = open(&gateway);
        drain(&daemon);

        gateway.handle_status(&channel_status(1000, 10_000_000.0, "am"));
        gateway.handle_status(&channel_status(1000, 10_000_000.0, "am"));

        let frames = sink.binaries();
        assert_eq!(frames.len(), 2);
        let first = RtpPacket::parse(&frames[0]).unwrap();
        assert_eq!(first.header.payload_type, PT_STATUS);
        assert_eq!(first.header.ssrc, 1000);
        assert!(first.header.marker);

        let codes: Vec<u8> = fields(&frames[0]).iter().map(|f| f.0).collect();
        assert_eq!(
            codes,
            [
                StatusType::BasebandPower as u8,
                StatusType::LowEdge as u8,
                StatusType::HighEdge as u8,
                StatusType::Description as u8
            ]
        );
        assert_eq!(decode_string(&fields(&frames[0])[3].1), "hf rx");
        assert_eq!(fields(&frames[1]).len(), 3);

        // matching state, so nothing was re-sent
        assert!(drain(&daemon).is_empty());
        assert_eq!(session.render().noise_density, -160.0);
        assert_eq!(rx.try_recv().unwrap(), "239.1.2.3:5004".parse::<SocketAddr>().unwrap());
        // signalled once only
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_description_override() {
        let settings = Settings {
            description_override: Some("club station".into()),
            ..fast_settings()
        };
        let (gateway, _rx, _daemon) = gateway(settings);
        let (_session, sink) = open(&gateway);
        gateway.handle_status(&channel_status(1000, 10_000_000.0, "am"));
        let frame = &sink.binaries()[0];
        assert_eq!(decode_string(&fields(frame)[3].1), "club station");
    }

    #[test]
    fn test_mismatch_reissues_commands() {
        let (gateway, _rx, daemon) = gateway(fast_settings());
        let (_session, _sink) = open(&gateway);
        drain(&daemon);

        gateway.handle_status(&channel_status(1000, 7_000_000.0, "usb"));
        let sent = drain(&daemon);
        assert_eq!(sent.len(), 2);
        let preset = find_field(&sent[0][1..], StatusType::Preset).unwrap();
        assert_eq!(decode_string(preset), "am");
        assert!(find_field(&sent[1][1..], StatusType::RadioFrequency).is_some());
    }

    #[test]
    fn test_unknown_ssrc_and_commands_ignored() {
        let (gateway, _rx, daemon) = gateway(fast_settings());
        let (_session, sink) = open(&gateway);
        drain(&daemon);

        gateway.handle_status(&channel_status(2000, 0.0, "fm"));
        let mut command = channel_status(1000, 0.0, "fm");
        command[0] = PacketKind::Command as u8;
        gateway.handle_status(&command);
        gateway.handle_status(&[]);

        assert!(sink.binaries().is_empty());
        assert_eq!(gateway.snapshot().version(), 0);
    }

    #[test]
    fn test_spectrum_reply_builds_frame() {
        let (gateway, _rx, _daemon) = gateway(fast_settings());
        let (session, sink) = open(&gateway);

        gateway.handle_status(&spectrum_reply(1001, &[1.0, 0.0, 0.5, 0.25]));
        let frames = sink.binaries();
        assert_eq!(frames.len(), 1);
        let packet = RtpPacket::parse(&frames[0]).unwrap();
        assert_eq!(packet.header.payload_type, PT_SPECTRUM);
        assert_eq!(packet.header.ssrc, 1000);
        assert_eq!(packet.payload.len(), super::super::spectrum::SPECTRUM_HEADER_LEN + 16);

        let render = session.render();
        assert_eq!(render.if_power, -15.0);
        assert_eq!(render.min_db, -120.0);
        assert_eq!(render.max_db, 0.0);
    }

    #[test]
    fn test_spectrum_for_other_companion_dropped() {
        let (gateway, _rx, _daemon) = gateway(fast_settings());
        let (_session, sink) = open(&gateway);

        let record = |ssrcs: &[u32], count: i32| {
            let mut buf = vec![PacketKind::Status as u8];
            for &ssrc in ssrcs {
                encode_int32(&mut buf, StatusType::OutputSsrc, ssrc);
            }
            encode_int(&mut buf, StatusType::FilterBlocksize, 960);
            encode_int(&mut buf, StatusType::FilterFirLength, 241);
            encode_int(&mut buf, StatusType::BinCount, count);
            encode_vector(&mut buf, StatusType::BinData, &[1.0; 4]);
            encode_eol(&mut buf);
            buf
        };
        // routed to 1000 by its first SSRC, but also claims 1003
        gateway.handle_status(&record(&[1001, 1003], 4));
        // bin count disagrees with the data
        gateway.handle_status(&record(&[1001], 8));
        assert!(sink.binaries().is_empty());

        gateway.handle_status(&record(&[1001], 4));
        assert_eq!(sink.binaries().len(), 1);
    }

    #[test]
    fn test_byte_precision_rescales() {
        let settings = Settings {
            precision: BinPrecision::Byte,
            ..fast_settings()
        };
        let (gateway, _rx, _daemon) = gateway(settings);
        let (session, sink) = open(&gateway);
        gateway.handle_status(&spectrum_reply(1001, &[2e-13, 2e-13, 0.05, 0.05]));
        assert_eq!(sink.binaries().len(), 1);
        let render = session.render();
        assert_eq!(render.autorange_offset, -140.0);
        assert!((render.autorange_gain - 140.0 / 255.0).abs() < 1e-4);
    }
}
