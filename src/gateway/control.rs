//! Commands to the daemon
//!
//! Every session shares one control socket, so sends are serialized by a
//! lock. Commands are fire-and-forget: nothing waits for the daemon to
//! acknowledge, and mismatches are corrected when the next status arrives.

use std::net::UdpSocket;

use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::NetworkError;
use crate::protocol::tlv::{
    encode_double, encode_eol, encode_float, encode_int, encode_int32, encode_string,
};
use crate::protocol::{DemodType, PacketKind, StatusType};

/// Start of a command record
fn command(ssrc: u32, tag: u32) -> BytesMut {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_u8(PacketKind::Command as u8);
    encode_int32(&mut buf, StatusType::OutputSsrc, ssrc);
    encode_int32(&mut buf, StatusType::CommandTag, tag);
    buf
}

/// Tune `ssrc` to `frequency` Hz. Zero releases the daemon's channel.
pub fn tune_command(ssrc: u32, frequency: f64, tag: u32) -> BytesMut {
    let mut buf = command(ssrc, tag);
    encode_double(&mut buf, StatusType::RadioFrequency, frequency);
    encode_eol(&mut buf);
    buf
}

/// Select a demodulator preset for `ssrc`
pub fn preset_command(ssrc: u32, preset: &str, tag: u32) -> BytesMut {
    let mut buf = command(ssrc, tag);
    encode_string(&mut buf, StatusType::Preset, preset);
    encode_eol(&mut buf);
    buf
}

/// Tune and pick a preset in one command, as a new channel needs
pub fn create_command(ssrc: u32, frequency: f64, preset: &str, tag: u32) -> BytesMut {
    let mut buf = command(ssrc, tag);
    encode_double(&mut buf, StatusType::RadioFrequency, frequency);
    encode_string(&mut buf, StatusType::Preset, preset);
    encode_eol(&mut buf);
    buf
}

/// Ask for a status report from `ssrc`
pub fn poll_command(ssrc: u32, tag: u32) -> BytesMut {
    let mut buf = command(ssrc, tag);
    encode_eol(&mut buf);
    buf
}

/// Configure a spectrum channel and request its bins
pub fn spectrum_command(ssrc: u32, center: u32, bins: u32, bin_width: u32, tag: u32) -> BytesMut {
    let mut buf = command(ssrc, tag);
    encode_int(&mut buf, StatusType::DemodType, DemodType::Spectrum as i32);
    encode_double(&mut buf, StatusType::RadioFrequency, center as f64);
    encode_int(&mut buf, StatusType::BinCount, bins as i32);
    encode_float(&mut buf, StatusType::NoncoherentBinBw, bin_width as f32);
    encode_eol(&mut buf);
    buf
}

/// Tear down a spectrum channel by tuning it to zero
pub fn stop_spectrum_command(ssrc: u32, tag: u32) -> BytesMut {
    let mut buf = command(ssrc, tag);
    encode_int(&mut buf, StatusType::DemodType, DemodType::Spectrum as i32);
    encode_double(&mut buf, StatusType::RadioFrequency, 0.0);
    encode_eol(&mut buf);
    buf
}

/// The shared control socket
#[derive(Debug)]
pub struct Control {
    socket: Mutex<UdpSocket>,
}

impl Control {
    /// `socket` must already be connected to the daemon's control group
    pub fn new(socket: UdpSocket) -> Self {
        Self {
            socket: Mutex::new(socket),
        }
    }

    pub fn send(&self, command: &[u8]) -> Result<(), NetworkError> {
        let sent = self
            .socket
            .lock()
            .send(command)
            .map_err(|e| NetworkError::SendFailed(e.to_string()))?;
        trace!(bytes = sent, "command sent");
        Ok(())
    }

    fn send_logged(&self, what: &'static str, ssrc: u32, command: &[u8]) {
        if let Err(e) = self.send(command) {
            debug!(ssrc, command = what, error = %e, "command not sent");
        }
    }

    pub fn set_frequency(&self, ssrc: u32, frequency: f64) {
        self.send_logged("tune", ssrc, &tune_command(ssrc, frequency, rand::random()));
    }

    pub fn set_preset(&self, ssrc: u32, preset: &str) {
        self.send_logged("preset", ssrc, &preset_command(ssrc, preset, rand::random()));
    }

    pub fn poll(&self, ssrc: u32) {
        self.send_logged("poll", ssrc, &poll_command(ssrc, rand::random()));
    }

    pub fn request_spectrum(&self, ssrc: u32, center: u32, bins: u32, bin_width: u32) {
        let cmd = spectrum_command(ssrc, center, bins, bin_width, rand::random());
        self.send_logged("spectrum", ssrc, &cmd);
    }

    pub fn stop_spectrum(&self, ssrc: u32) {
        self.send_logged("stop spectrum", ssrc, &stop_spectrum_command(ssrc, rand::random()));
    }

    /// Bring up the daemon channels for a new session
    pub fn create_channels(&self, ssrc: u32, frequency: f64, preset: &str) {
        let tag = rand::random();
        self.send_logged("create", ssrc, &create_command(ssrc, frequency, preset, tag));
        self.send_logged("create", ssrc + 1, &tune_command(ssrc + 1, frequency, tag));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tlv::{decode_double, decode_float, decode_int, find_field, get_ssrc, get_tag};
    use crate::protocol::{split_packet, tlv::decode_string};
    use std::time::Duration;

    fn loopback_pair() -> (Control, UdpSocket) {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        rx.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let tx = UdpSocket::bind("127.0.0.1:0").unwrap();
        tx.connect(rx.local_addr().unwrap()).unwrap();
        (Control::new(tx), rx)
    }

    fn recv(rx: &UdpSocket) -> Vec<u8> {
        let mut buf = [0u8; 1500];
        let n = rx.recv(&mut buf).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn test_tune_command_layout() {
        let cmd = tune_command(1000, 7_074_000.0, 42);
        let (kind, record) = split_packet(&cmd).unwrap();
        assert_eq!(kind, PacketKind::Command);
        assert_eq!(get_ssrc(record), Some(1000));
        assert_eq!(get_tag(record), Some(42));
        let freq = find_field(record, StatusType::RadioFrequency).unwrap();
        assert_eq!(decode_double(freq), 7_074_000.0);
        assert_eq!(*cmd.last().unwrap(), StatusType::Eol as u8);
    }

    #[test]
    fn test_zero_frequency_is_present_but_empty() {
        let cmd = stop_spectrum_command(1001, 1);
        let record = &cmd[1..];
        assert_eq!(find_field(record, StatusType::RadioFrequency), Some(&[][..]));
        let demod = find_field(record, StatusType::DemodType).unwrap();
        assert_eq!(decode_int(demod), 3);
    }

    #[test]
    fn test_spectrum_command_fields() {
        let cmd = spectrum_command(1001, 14_100_000, 1620, 200, 7);
        let record = &cmd[1..];
        assert_eq!(get_ssrc(record), Some(1001));
        assert_eq!(decode_double(find_field(record, StatusType::RadioFrequency).unwrap()), 14_100_000.0);
        assert_eq!(decode_int(find_field(record, StatusType::BinCount).unwrap()), 1620);
        assert_eq!(decode_float(find_field(record, StatusType::NoncoherentBinBw).unwrap()), 200.0);
    }

    #[test]
    fn test_create_channels_sends_both() {
        let (control, rx) = loopback_pair();
        control.create_channels(1000, 10_000_000.0, "am");

        let first = recv(&rx);
        let record = &first[1..];
        assert_eq!(get_ssrc(record), Some(1000));
        assert_eq!(decode_string(find_field(record, StatusType::Preset).unwrap()), "am");

        let second = recv(&rx);
        let record = &second[1..];
        assert_eq!(get_ssrc(record), Some(1001));
        assert_eq!(find_field(record, StatusType::Preset), None);
        assert_eq!(get_tag(record), get_tag(&first[1..]));
    }

    #[test]
    fn test_poll_over_socket() {
        let (control, rx) = loopback_pair();
        control.poll(1002);
        let got = recv(&rx);
        assert_eq!(got[0], PacketKind::Command as u8);
        assert_eq!(get_ssrc(&got[1..]), Some(1002));
    }
}
