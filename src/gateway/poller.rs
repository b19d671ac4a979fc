//! Per-session spectrum poller
//!
//! While a session's spectrum is active its poller asks the daemon for bins
//! on the companion SSRC and polls the primary channel once per period.
//! The replies come back through the status loop. When the poller ends it
//! tunes the companion to 0 Hz a few times so the daemon drops the
//! spectrum demodulator even if some commands are lost.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tracing::{debug, info};

use super::Gateway;
use crate::error::SessionError;
use crate::session::{Session, SpectrumTask};

impl Gateway {
    /// Start the session's poller; a no-op if it is already running
    pub fn start_spectrum(self: &Arc<Self>, session: &Arc<Session>) -> Result<(), SessionError> {
        if session.has_poller() {
            debug!(ssrc = session.ssrc, "spectrum poller already running");
            return Ok(());
        }
        let (stop, cancel) = bounded::<()>(0);
        let gateway = self.clone();
        let polled = session.clone();
        let thread = thread::Builder::new()
            .name(format!("spec_{}", session.companion_ssrc()))
            .spawn(move || gateway.poll_spectrum(&polled, cancel))
            .map_err(|e| SessionError::PollerSpawn(e.to_string()))?;
        session.set_poller(SpectrumTask { stop, thread });
        info!(ssrc = session.ssrc, "spectrum poller started");
        Ok(())
    }

    fn poll_spectrum(&self, session: &Session, cancel: Receiver<()>) {
        let companion = session.companion_ssrc();
        while session.spectrum_active() {
            let (center, bins, bin_width) = {
                let tuning = session.tuning();
                (tuning.center_frequency, tuning.bins, tuning.bin_width)
            };
            self.control
                .request_spectrum(companion, center, bins, bin_width);
            self.control.poll(session.ssrc);

            match cancel.recv_timeout(self.settings.poll_interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.stop_burst(companion);
        debug!(ssrc = session.ssrc, "spectrum poller exited");
    }

    /// Tune a spectrum channel to zero, repeated to survive packet loss
    pub(crate) fn stop_burst(&self, companion: u32) {
        for i in 0..self.settings.stop_repeats {
            self.control.stop_spectrum(companion);
            if i + 1 < self.settings.stop_repeats {
                thread::sleep(self.settings.stop_interval);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::protocol::tlv::{decode_int, find_field, get_ssrc};
    use crate::protocol::StatusType;
    use std::time::Duration;

    #[test]
    fn test_poller_requests_then_stops() {
        let (gateway, _rx, daemon) = gateway(fast_settings());
        let (session, _sink) = open(&gateway);
        drain(&daemon);

        gateway.start_spectrum(&session).unwrap();
        assert!(session.has_poller());
        // a second start is ignored
        gateway.start_spectrum(&session).unwrap();
        std::thread::sleep(Duration::from_millis(35));
        gateway.close_session(&session.connection);
        assert!(!session.has_poller());

        let sent = drain(&daemon);
        let requests: Vec<_> = sent
            .iter()
            .filter(|c| find_field(&c[1..], StatusType::BinCount).is_some())
            .collect();
        assert!(!requests.is_empty());
        for request in &requests {
            assert_eq!(get_ssrc(&request[1..]), Some(1001));
            let bins = find_field(&request[1..], StatusType::BinCount).unwrap();
            assert_eq!(decode_int(bins), 1620);
        }
        assert!(sent
            .iter()
            .any(|c| get_ssrc(&c[1..]) == Some(1000) && c.len() < 16));

        // the last three commands are the stop burst
        let tail = &sent[sent.len() - 3..];
        for stop in tail {
            assert_eq!(get_ssrc(&stop[1..]), Some(1001));
            assert_eq!(find_field(&stop[1..], StatusType::RadioFrequency), Some(&[][..]));
        }
    }
}
