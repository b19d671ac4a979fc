//! Client text commands
//!
//! Each transport message carries one `KEY:ARG` command. The key is a
//! single case-insensitive character:
//!
//! | message        | effect                                   |
//! |----------------|------------------------------------------|
//! | `S`            | reply `S:<ssrc>` and start the spectrum  |
//! | `A:START/STOP` | toggle audio forwarding                  |
//! | `F:<kHz>`      | tune                                     |
//! | `M:<preset>`   | change the demodulator preset            |
//! | `Z:+` / `Z:-`  | zoom in or out one step                  |
//! | `Z:<n>`        | zoom to level `n`                        |
//! | `Z:c[:<kHz>]`  | centre the display                       |

use std::sync::Arc;

use tracing::{debug, warn};

use super::Gateway;
use crate::session::{ConnectionId, Session, Tuning};

#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    StartSpectrum,
    Audio(bool),
    /// Tuned frequency in kHz
    Frequency(f64),
    Mode(String),
    ZoomIn,
    ZoomOut,
    ZoomTo(i32),
    /// Centre in kHz, or the tuned frequency when absent
    Center(Option<f64>),
}

impl ClientCommand {
    /// Parse one message; `None` for anything unknown or malformed
    pub fn parse(message: &str) -> Option<Self> {
        let message = message.trim_end_matches(['\r', '\n', '\0']);
        let (key, arg) = match message.split_once(':') {
            Some((key, arg)) => (key, arg),
            None => (message, ""),
        };
        let mut chars = key.chars();
        let key = chars.next()?.to_ascii_uppercase();
        if chars.next().is_some() {
            return None;
        }

        match key {
            'S' => Some(Self::StartSpectrum),
            'A' if arg.eq_ignore_ascii_case("START") => Some(Self::Audio(true)),
            'A' if arg.eq_ignore_ascii_case("STOP") => Some(Self::Audio(false)),
            'F' => arg.trim().parse().ok().map(Self::Frequency),
            'M' if !arg.is_empty() => Some(Self::Mode(arg.to_string())),
            'Z' => parse_zoom(arg),
            _ => None,
        }
    }
}

fn parse_zoom(arg: &str) -> Option<ClientCommand> {
    match arg {
        "+" => Some(ClientCommand::ZoomIn),
        "-" => Some(ClientCommand::ZoomOut),
        "c" => Some(ClientCommand::Center(None)),
        _ => match arg.strip_prefix("c:") {
            Some(khz) => Some(ClientCommand::Center(khz.trim().parse().ok())),
            None => arg.trim().parse().ok().map(ClientCommand::ZoomTo),
        },
    }
}

impl Gateway {
    /// Apply a message received from `connection`
    pub fn handle_client_message(self: &Arc<Self>, connection: &ConnectionId, message: &str) {
        let Some(session) = self.registry.session_for(connection) else {
            debug!(%connection, "message for unknown connection");
            return;
        };
        match ClientCommand::parse(message) {
            Some(command) => self.execute(&session, command),
            None => debug!(ssrc = session.ssrc, message, "ignoring client command"),
        }
    }

    pub fn execute(self: &Arc<Self>, session: &Arc<Session>, command: ClientCommand) {
        debug!(ssrc = session.ssrc, ?command, "client command");
        match command {
            ClientCommand::StartSpectrum => {
                session.send_text(format!("S:{}", session.ssrc));
                if let Err(e) = self.start_spectrum(session) {
                    warn!(ssrc = session.ssrc, error = %e, "spectrum not started");
                }
            }
            ClientCommand::Audio(on) => session.set_audio_active(on),
            ClientCommand::Frequency(khz) => {
                let samprate = self.daemon().frontend.samprate;
                let frequency = {
                    let mut tuning = session.tuning();
                    let frequency = tuning.set_frequency_khz(khz);
                    tuning.check_frequency(samprate);
                    frequency
                };
                self.control.set_frequency(session.ssrc, frequency as f64);
            }
            ClientCommand::Mode(preset) => {
                self.control.set_preset(session.ssrc, &preset);
                session.tuning().requested_preset = preset;
                self.control.poll(session.ssrc);
            }
            ClientCommand::ZoomIn => self.rezoom(session, |tuning, rate| tuning.zoom(1, rate)),
            ClientCommand::ZoomOut => self.rezoom(session, |tuning, rate| tuning.zoom(-1, rate)),
            ClientCommand::ZoomTo(level) => {
                self.rezoom(session, |tuning, rate| tuning.zoom_to(level, rate))
            }
            ClientCommand::Center(khz) => {
                let mut tuning = session.tuning();
                tuning.center_frequency = match khz {
                    Some(khz) => (khz * 1000.0).max(0.0) as u32,
                    None => tuning.frequency,
                };
            }
        }
    }

    fn rezoom(&self, session: &Session, apply: impl FnOnce(&mut Tuning, i32)) {
        let samprate = self.daemon().frontend.samprate;
        let mut tuning = session.tuning();
        apply(&mut tuning, samprate);
        tuning.check_frequency(samprate);
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::protocol::tlv::{decode_double, decode_string, find_field, get_ssrc};
    use crate::protocol::StatusType;
    use crate::session::sink::Sent;

    #[test]
    fn test_parse_commands() {
        use ClientCommand::*;
        assert_eq!(ClientCommand::parse("S"), Some(StartSpectrum));
        assert_eq!(ClientCommand::parse("s:"), Some(StartSpectrum));
        assert_eq!(ClientCommand::parse("A:START"), Some(Audio(true)));
        assert_eq!(ClientCommand::parse("a:stop"), Some(Audio(false)));
        assert_eq!(ClientCommand::parse("F:7074.5"), Some(Frequency(7074.5)));
        assert_eq!(ClientCommand::parse("M:usb"), Some(Mode("usb".into())));
        assert_eq!(ClientCommand::parse("Z:+"), Some(ZoomIn));
        assert_eq!(ClientCommand::parse("z:-"), Some(ZoomOut));
        assert_eq!(ClientCommand::parse("Z:12"), Some(ZoomTo(12)));
        assert_eq!(ClientCommand::parse("Z:c"), Some(Center(None)));
        assert_eq!(ClientCommand::parse("Z:c:14200"), Some(Center(Some(14200.0))));
        assert_eq!(ClientCommand::parse("Z:c:abc"), Some(Center(None)));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for message in ["", "X:1", "FF:100", "F:", "F:abc", "A:PAUSE", "M:", "Z:", "Z:big"] {
            assert_eq!(ClientCommand::parse(message), None, "{message:?}");
        }
    }

    #[test]
    fn test_start_spectrum_replies_with_ssrc() {
        let (gateway, _rx, _daemon) = gateway(fast_settings());
        let (session, sink) = open(&gateway);

        gateway.handle_client_message(&session.connection, "S");
        assert_eq!(sink.texts(), ["S:1000"]);
        assert!(session.has_poller());
        gateway.close_session(&session.connection);
        assert!(matches!(sink.sent.lock()[0], Sent::Text(_)));
    }

    #[test]
    fn test_frequency_command_tunes_and_recentres() {
        let (gateway, _rx, daemon) = gateway(fast_settings());
        let (session, _sink) = open(&gateway);
        drain(&daemon);

        gateway.handle_client_message(&session.connection, "F:-50000");
        {
            let tuning = session.tuning();
            assert_eq!(tuning.frequency, 50_000_000);
            assert_eq!(tuning.center_frequency, 50_000_000);
        }
        let sent = drain(&daemon);
        assert_eq!(sent.len(), 1);
        let freq = find_field(&sent[0][1..], StatusType::RadioFrequency).unwrap();
        assert_eq!(decode_double(freq), 50_000_000.0);
    }

    #[test]
    fn test_mode_command_sets_preset_then_polls() {
        let (gateway, _rx, daemon) = gateway(fast_settings());
        let (session, _sink) = open(&gateway);
        drain(&daemon);

        gateway.handle_client_message(&session.connection, "M:usb");
        assert_eq!(session.tuning().requested_preset, "usb");
        let sent = drain(&daemon);
        assert_eq!(sent.len(), 2);
        let preset = find_field(&sent[0][1..], StatusType::Preset).unwrap();
        assert_eq!(decode_string(preset), "usb");
        assert_eq!(get_ssrc(&sent[1][1..]), Some(1000));
        assert!(find_field(&sent[1][1..], StatusType::Preset).is_none());
    }

    #[test]
    fn test_audio_toggle() {
        let (gateway, _rx, _daemon) = gateway(fast_settings());
        let (session, _sink) = open(&gateway);
        gateway.handle_client_message(&session.connection, "A:START");
        assert!(session.audio_active());
        gateway.handle_client_message(&session.connection, "A:STOP");
        assert!(!session.audio_active());
    }

    #[test]
    fn test_zoom_changes_span() {
        let (gateway, _rx, _daemon) = gateway(fast_settings());
        let (session, _sink) = open(&gateway);
        let before = session.tuning().span();

        gateway.handle_client_message(&session.connection, "Z:+");
        assert_eq!(session.tuning().zoom_index, 2);
        assert!(session.tuning().span() < before);
        gateway.handle_client_message(&session.connection, "Z:-");
        assert_eq!(session.tuning().span(), before);
    }

    #[test]
    fn test_center_commands_do_not_clamp() {
        let (gateway, _rx, _daemon) = gateway(fast_settings());
        let (session, _sink) = open(&gateway);

        gateway.handle_client_message(&session.connection, "Z:c");
        assert_eq!(session.tuning().center_frequency, 10_000_000);
        gateway.handle_client_message(&session.connection, "Z:c:100");
        assert_eq!(session.tuning().center_frequency, 100_000);
        gateway.handle_client_message(&session.connection, "Z:c:-5");
        assert_eq!(session.tuning().center_frequency, 0);
    }

    #[test]
    fn test_unknown_command_changes_nothing() {
        let (gateway, _rx, daemon) = gateway(fast_settings());
        let (session, sink) = open(&gateway);
        drain(&daemon);
        let before = session.tuning().clone();

        gateway.handle_client_message(&session.connection, "Q:1");
        gateway.handle_client_message(&ConnectionId::new_v4(), "F:7000");
        assert_eq!(*session.tuning(), before);
        assert!(drain(&daemon).is_empty());
        assert!(sink.texts().is_empty());
    }
}
