//! # Recognizer Wire Client
//!
//! Blocking WebSocket transport for the streaming recognizer session, behind
//! the `RecognizerConnector`/`RecognizerStream` traits so the adapter can be
//! driven by a scripted stream in tests.
//!
//! The client is intentionally synchronous: the recognizer feeder runs on its
//! own worker thread and alternates between sending audio and polling for
//! events, so a plain socket with a short read timeout is all it needs.

use crate::config::RecognizerConfig;
use crate::error::RecognizerError;
use crate::recognizer::events::{RecognizerCommand, RecognizerMessage};

use std::io::ErrorKind;
use std::net::TcpStream;
use std::time::Duration;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::stream::MaybeTlsStream;
use tokio_tungstenite::tungstenite::{connect, Error as WsError, Message, WebSocket};
use tracing::debug;

/// One live streaming session with the recognizer service.
pub trait RecognizerStream: Send {
    /// Send one PCM frame to the session.
    fn send_audio(&mut self, frame: &[u8]) -> Result<(), RecognizerError>;

    /// Send a control command to the session.
    fn send_command(&mut self, command: &RecognizerCommand) -> Result<(), RecognizerError>;

    /// Wait up to `wait` for the next recognizer message.
    ///
    /// Returns `Ok(None)` when nothing (or nothing parseable) arrived in the
    /// window; `Err(RecognizerError::Closed)` once the remote side is gone.
    fn poll_message(&mut self, wait: Duration) -> Result<Option<RecognizerMessage>, RecognizerError>;

    /// Best-effort close of the underlying transport.
    fn close(&mut self);
}

/// Factory for recognizer sessions; one `connect` per recording session.
pub trait RecognizerConnector: Send + Sync + 'static {
    fn connect(&self, sample_rate: u32) -> Result<Box<dyn RecognizerStream>, RecognizerError>;
}

/// Connector for the real WebSocket streaming endpoint.
pub struct WsRecognizerConnector {
    config: RecognizerConfig,
}

impl WsRecognizerConnector {
    pub fn new(config: RecognizerConfig) -> Self {
        Self { config }
    }

    fn session_url(&self, sample_rate: u32) -> String {
        format!(
            "{}?sample_rate={}",
            self.config.endpoint.trim_end_matches('/'),
            sample_rate
        )
    }
}

impl RecognizerConnector for WsRecognizerConnector {
    fn connect(&self, sample_rate: u32) -> Result<Box<dyn RecognizerStream>, RecognizerError> {
        let url = self.session_url(sample_rate);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| RecognizerError::Handshake(err.to_string()))?;

        let credential = HeaderValue::from_str(&self.config.api_key)
            .map_err(|err| RecognizerError::Handshake(err.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, credential);

        let (socket, response) =
            connect(request).map_err(|err| RecognizerError::Handshake(err.to_string()))?;
        debug!(status = %response.status(), url = %url, "recognizer session connected");

        Ok(Box::new(WsRecognizerStream { socket }))
    }
}

/// Blocking WebSocket stream with per-poll read timeouts.
pub struct WsRecognizerStream {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
}

impl WsRecognizerStream {
    fn set_read_timeout(&mut self, wait: Duration) -> Result<(), RecognizerError> {
        // A zero timeout would mean "block forever" to the socket layer.
        let timeout = Some(wait.max(Duration::from_millis(1)));
        let result = match self.socket.get_mut() {
            MaybeTlsStream::Plain(stream) => stream.set_read_timeout(timeout),
            MaybeTlsStream::NativeTls(stream) => stream.get_mut().set_read_timeout(timeout),
            _ => Ok(()),
        };
        result.map_err(|err| RecognizerError::Transport(err.to_string()))
    }
}

impl RecognizerStream for WsRecognizerStream {
    fn send_audio(&mut self, frame: &[u8]) -> Result<(), RecognizerError> {
        self.socket
            .send(Message::Binary(frame.to_vec()))
            .map_err(ws_error)
    }

    fn send_command(&mut self, command: &RecognizerCommand) -> Result<(), RecognizerError> {
        let json = serde_json::to_string(command)
            .map_err(|err| RecognizerError::Transport(err.to_string()))?;
        self.socket.send(Message::Text(json)).map_err(ws_error)
    }

    fn poll_message(&mut self, wait: Duration) -> Result<Option<RecognizerMessage>, RecognizerError> {
        self.set_read_timeout(wait)?;
        match self.socket.read() {
            Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                Ok(message) => Ok(Some(message)),
                Err(err) => {
                    // Unknown or malformed service message: skip it.
                    debug!(error = %err, "ignoring unrecognized recognizer message");
                    Ok(None)
                }
            },
            Ok(Message::Close(_)) => Err(RecognizerError::Closed),
            Ok(_) => Ok(None),
            Err(WsError::Io(err))
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(err) => Err(ws_error(err)),
        }
    }

    fn close(&mut self) {
        let _ = self.socket.close(None);
        let _ = self.socket.flush();
    }
}

fn ws_error(err: WsError) -> RecognizerError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => RecognizerError::Closed,
        other => RecognizerError::Transport(other.to_string()),
    }
}
