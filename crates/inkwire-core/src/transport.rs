//! Sync transport: an ordered, bidirectional event channel to the relay.
//!
//! The engine only relies on the [`Transport`] contract. Delivery is
//! assumed ordered per sender with no cross-sender ordering and no
//! delivery guarantee.

use crate::protocol::{ClientMessage, ServerMessage};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Not connected")]
    NotConnected,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Send failed: {0}")]
    Send(String),
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Connected to the relay
    Connected,
    /// Disconnected from the relay
    Disconnected,
    /// A message arrived from the relay.
    Message(ServerMessage),
    /// Error occurred
    Error { message: String },
}

/// Bidirectional channel to the relay.
pub trait Transport {
    /// Queue a message for the relay (fire-and-forget).
    fn send(&mut self, msg: &ClientMessage) -> Result<(), TransportError>;

    /// Drain events received since the last poll (non-blocking).
    fn poll_events(&mut self) -> Vec<SyncEvent>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

fn track_state(state: &mut ConnectionState, event: &SyncEvent) {
    match event {
        SyncEvent::Connected => *state = ConnectionState::Connected,
        SyncEvent::Disconnected => *state = ConnectionState::Disconnected,
        SyncEvent::Error { .. } => *state = ConnectionState::Error,
        SyncEvent::Message(_) => {}
    }
}

// ============================================================================
// In-memory transport
// ============================================================================

/// In-memory transport for tests and local loopback.
///
/// Sent messages are recorded; inbound events are injected with
/// [`MemoryTransport::push_event`].
#[derive(Debug)]
pub struct MemoryTransport {
    state: ConnectionState,
    sent: Vec<ClientMessage>,
    inbound: Vec<SyncEvent>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Create a disconnected transport.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            sent: Vec::new(),
            inbound: Vec::new(),
        }
    }

    /// Queue an inbound event for the next poll.
    pub fn push_event(&mut self, event: SyncEvent) {
        self.inbound.push(event);
    }

    /// Queue an inbound relay message for the next poll.
    pub fn push_message(&mut self, msg: ServerMessage) {
        self.inbound.push(SyncEvent::Message(msg));
    }

    /// Messages sent so far.
    pub fn sent(&self) -> &[ClientMessage] {
        &self.sent
    }

    /// Take the messages sent so far.
    pub fn take_sent(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.sent)
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, msg: &ClientMessage) -> Result<(), TransportError> {
        if self.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        self.sent.push(msg.clone());
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<SyncEvent> {
        let events = std::mem::take(&mut self.inbound);
        for event in &events {
            track_state(&mut self.state, event);
        }
        events
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}

// ============================================================================
// Native WebSocket Client
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
mod native_client {
    use super::*;
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::{Message, connect};
    use url::Url;

    /// Commands sent to the WebSocket thread.
    enum WsCommand {
        Send(String),
        Close,
    }

    /// WebSocket client for native platforms.
    ///
    /// Uses a background thread for non-blocking operation.
    pub struct NativeWebSocket {
        state: ConnectionState,
        /// Channel to send commands to the WebSocket thread.
        cmd_tx: Option<Sender<WsCommand>>,
        /// Channel to receive events from the WebSocket thread.
        event_rx: Option<Receiver<SyncEvent>>,
        _thread: Option<JoinHandle<()>>,
    }

    impl NativeWebSocket {
        /// Create a new disconnected WebSocket client.
        pub fn new() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                cmd_tx: None,
                event_rx: None,
                _thread: None,
            }
        }

        /// Connect to a relay at a `ws://` or `wss://` URL.
        pub fn connect(&mut self, url: &str) -> Result<(), TransportError> {
            if self.cmd_tx.is_some() {
                return Err(TransportError::AlreadyConnected);
            }

            let parsed_url = Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
            if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
                return Err(TransportError::InvalidUrl(format!(
                    "unsupported scheme: {}",
                    parsed_url.scheme()
                )));
            }

            self.state = ConnectionState::Connecting;

            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<SyncEvent>();
            let url = url.to_string();

            let handle = thread::spawn(move || run_socket(&url, cmd_rx, event_tx));

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);

            Ok(())
        }

        /// Disconnect from the relay.
        pub fn disconnect(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            self.event_rx = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }
    }

    /// First 100 characters of a frame; never splits a UTF-8 character.
    pub(super) fn log_preview(msg: &str) -> String {
        msg.chars().take(100).collect()
    }

    fn run_socket(url: &str, cmd_rx: Receiver<WsCommand>, event_tx: Sender<SyncEvent>) {
        log::info!("WebSocket thread: connecting to {}", url);

        let mut socket = match connect(url) {
            Ok((socket, response)) => {
                log::info!("WebSocket connected, status: {}", response.status());
                socket
            }
            Err(e) => {
                log::error!("WebSocket connection failed: {}", e);
                let _ = event_tx.send(SyncEvent::Error {
                    message: format!("Connection failed: {}", e),
                });
                return;
            }
        };
        let _ = event_tx.send(SyncEvent::Connected);

        // Short read timeout so outgoing commands are not starved.
        match socket.get_mut() {
            tungstenite::stream::MaybeTlsStream::Plain(tcp) => {
                let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
            }
            #[allow(unreachable_patterns)]
            _ => {
                log::debug!("TLS or other stream - using default timeout handling");
            }
        }

        loop {
            match cmd_rx.try_recv() {
                Ok(WsCommand::Send(msg)) => {
                    log::debug!("WebSocket sending: {}", log_preview(&msg));
                    if let Err(e) = socket.send(Message::Text(msg)) {
                        log::error!("WebSocket send error: {}", e);
                        break;
                    }
                }
                Ok(WsCommand::Close) => {
                    log::info!("WebSocket close requested");
                    let _ = socket.close(None);
                    break;
                }
                Err(TryRecvError::Disconnected) => {
                    log::info!("WebSocket command channel disconnected");
                    break;
                }
                Err(TryRecvError::Empty) => {}
            }

            match socket.read() {
                Ok(Message::Text(txt)) => match ServerMessage::from_json(&txt) {
                    Ok(msg) => {
                        let _ = event_tx.send(SyncEvent::Message(msg));
                    }
                    Err(e) => log::debug!("dropping malformed relay frame: {}", e),
                },
                Ok(Message::Ping(data)) => {
                    let _ = socket.send(Message::Pong(data));
                }
                Ok(Message::Close(_)) => {
                    log::info!("WebSocket received close frame");
                    break;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    log::error!("WebSocket read error: {}", e);
                    break;
                }
            }
        }

        log::info!("WebSocket thread exiting");
        let _ = event_tx.send(SyncEvent::Disconnected);
    }

    impl Transport for NativeWebSocket {
        fn send(&mut self, msg: &ClientMessage) -> Result<(), TransportError> {
            let Some(ref tx) = self.cmd_tx else {
                return Err(TransportError::NotConnected);
            };
            let json = msg.to_json().map_err(|e| TransportError::Send(e.to_string()))?;
            tx.send(WsCommand::Send(json))
                .map_err(|e| TransportError::Send(e.to_string()))
        }

        fn poll_events(&mut self) -> Vec<SyncEvent> {
            let mut events = Vec::new();
            if let Some(ref rx) = self.event_rx {
                while let Ok(event) = rx.try_recv() {
                    track_state(&mut self.state, &event);
                    events.push(event);
                }
            }
            // The socket thread exits after either event; allow a new `connect`.
            if events
                .iter()
                .any(|e| matches!(e, SyncEvent::Disconnected | SyncEvent::Error { .. }))
            {
                self.cmd_tx = None;
                self.event_rx = None;
                self._thread = None;
            }
            events
        }

        fn state(&self) -> ConnectionState {
            self.state
        }
    }

    impl Default for NativeWebSocket {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native_client::NativeWebSocket;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_transport_requires_connection() {
        let mut transport = MemoryTransport::new();
        assert_eq!(transport.send(&ClientMessage::DrawEnd), Err(TransportError::NotConnected));

        transport.push_event(SyncEvent::Connected);
        assert_eq!(transport.poll_events(), vec![SyncEvent::Connected]);
        assert!(transport.is_connected());

        transport.send(&ClientMessage::DrawEnd).unwrap();
        assert_eq!(transport.sent(), &[ClientMessage::DrawEnd]);
    }

    #[test]
    fn test_memory_transport_tracks_disconnect() {
        let mut transport = MemoryTransport::new();
        transport.push_event(SyncEvent::Connected);
        transport.push_event(SyncEvent::Disconnected);
        transport.poll_events();
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_native_rejects_bad_scheme() {
        let mut ws = NativeWebSocket::new();
        assert!(matches!(ws.connect("http://localhost:3030/ws"), Err(TransportError::InvalidUrl(_))));
        assert_eq!(ws.send(&ClientMessage::DrawEnd), Err(TransportError::NotConnected));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_log_preview_respects_char_boundaries() {
        let frame = format!(r#"{{"type":"join","room":"{}"}}"#, "é".repeat(80));
        let preview = native_client::log_preview(&frame);
        assert_eq!(preview.chars().count(), 100);
        assert!(frame.starts_with(&preview));
        assert_eq!(native_client::log_preview("short"), "short");
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_native_can_reconnect_after_thread_exits() {
        use std::time::{Duration, Instant};

        // Nothing listens on a freshly released port, so the thread fails and exits.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = format!("ws://127.0.0.1:{}/ws", port);

        let mut ws = NativeWebSocket::new();
        ws.connect(&url).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut events = Vec::new();
        while events.is_empty() && Instant::now() < deadline {
            events = ws.poll_events();
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(matches!(events.as_slice(), [SyncEvent::Error { .. }]));
        assert_eq!(ws.state(), ConnectionState::Error);
        assert_eq!(ws.send(&ClientMessage::DrawEnd), Err(TransportError::NotConnected));

        assert!(ws.connect(&url).is_ok());
        ws.disconnect();
    }
}
