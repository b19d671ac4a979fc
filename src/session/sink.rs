//! Outbound side of a client connection

use bytes::Bytes;

use crate::error::TransportError;

/// Where a session's frames go.
///
/// Implementations must not block: the receive loops call these from their
/// own threads and a slow client must only lose frames.
pub trait ClientSink: Send {
    fn send_binary(&mut self, frame: Bytes) -> Result<(), TransportError>;

    fn send_text(&mut self, text: String) -> Result<(), TransportError>;
}

/// A frame captured by [`MemorySink`]
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Binary(Bytes),
    Text(String),
}

/// Test sink recording everything sent through it
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub sent: std::sync::Arc<parking_lot::Mutex<Vec<Sent>>>,
    pub closed: bool,
}

#[cfg(test)]
impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binaries(&self) -> Vec<Bytes> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Binary(b) => Some(b.clone()),
                Sent::Text(_) => None,
            })
            .collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Text(t) => Some(t.clone()),
                Sent::Binary(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl ClientSink for MemorySink {
    fn send_binary(&mut self, frame: Bytes) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push(Sent::Binary(frame));
        Ok(())
    }

    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push(Sent::Text(text));
        Ok(())
    }
}
