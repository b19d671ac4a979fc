//! WebSocket transport
//!
//! Each socket owns one gateway session. Frames produced by the real-time
//! loops go through a bounded queue to a forwarder task, so a slow browser
//! loses frames instead of stalling the daemon side.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::{headers::UserAgent, TypedHeader};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::session::{ClientSink, ConnectionId};
use crate::ui::server::AppState;

/// Page served to plain HTTP requests for `/`
pub const HOME_PAGE: &str = "/radio.html";

/// Outbound frame queued for a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Binary(Bytes),
    Text(String),
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Binary(data) => Message::Binary(data.to_vec()),
            Frame::Text(text) => Message::Text(text),
        }
    }
}

/// [`ClientSink`] feeding a socket's outbound queue
pub struct WsSink {
    tx: mpsc::Sender<Frame>,
}

impl WsSink {
    pub fn new(tx: mpsc::Sender<Frame>) -> Self {
        Self { tx }
    }

    fn push(&self, frame: Frame) -> Result<(), TransportError> {
        // never wait on a slow client
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::QueueFull,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}

impl ClientSink for WsSink {
    fn send_binary(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.push(Frame::Binary(frame))
    }

    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.push(Frame::Text(text))
    }
}

/// `GET /`: upgrade to a WebSocket, or send plain requests to the radio page
pub async fn index(
    ws: Option<WebSocketUpgrade>,
    peer: Option<ConnectInfo<SocketAddr>>,
    user_agent: Option<TypedHeader<UserAgent>>,
    State(state): State<AppState>,
) -> Response {
    let Some(ws) = ws else {
        return Redirect::to(HOME_PAGE).into_response();
    };
    let client = peer
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    if let Some(TypedHeader(agent)) = user_agent {
        debug!(%client, agent = agent.as_str(), "websocket upgrade");
    }
    ws.max_message_size(64 * 1024)
        .on_upgrade(move |socket| handle_socket(socket, state, client))
}

async fn handle_socket(socket: WebSocket, state: AppState, client: String) {
    let gateway = state.gateway.clone();
    let connection = ConnectionId::new_v4();
    let (tx, mut rx) = mpsc::channel::<Frame>(state.client_queue);

    // channel creation talks to the daemon; keep it off the async workers
    let opened = tokio::task::spawn_blocking({
        let gateway = gateway.clone();
        let client = client.clone();
        move || gateway.open_session(connection, client, Box::new(WsSink::new(tx)))
    })
    .await;
    let ssrc = match opened {
        Ok(Ok(session)) => session.ssrc,
        Ok(Err(e)) => {
            warn!(%client, error = %e, "session refused");
            return;
        }
        Err(e) => {
            error!(%client, error = %e, "session setup panicked");
            return;
        }
    };
    info!(%client, ssrc, "client connected");

    let (mut sender, mut receiver) = socket.split();
    let forward = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::from(frame)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => gateway.handle_client_message(&connection, &text),
            Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => gateway.handle_client_message(&connection, text),
                Err(_) => debug!(ssrc, "ignoring non-text binary message"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(ssrc, error = %e, "websocket read failed");
                break;
            }
        }
    }

    // teardown joins the spectrum poller
    let closing = gateway.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || closing.close_session(&connection)).await {
        error!(ssrc, error = %e, "session teardown panicked");
    }
    forward.abort();
    info!(%client, ssrc, "client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_reports_full_and_closed() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut sink = WsSink::new(tx);

        sink.send_text("S:1000".into()).unwrap();
        assert_eq!(
            sink.send_binary(Bytes::from_static(b"\x80")),
            Err(TransportError::QueueFull)
        );
        assert_eq!(rx.try_recv().unwrap(), Frame::Text("S:1000".into()));

        drop(rx);
        assert_eq!(sink.send_text("x".into()), Err(TransportError::Closed));
    }

    #[test]
    fn test_frame_to_message() {
        assert_eq!(
            Message::from(Frame::Binary(Bytes::from_static(&[1, 2]))),
            Message::Binary(vec![1, 2])
        );
        assert_eq!(Message::from(Frame::Text("hi".into())), Message::Text("hi".into()));
    }
}
