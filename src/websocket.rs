//! # WebSocket Audio Streaming Handler
//!
//! The session controller for real-time audio streaming. Clients connect to
//! `/ws/audio/{session_id}` and stream compressed audio in binary frames;
//! the server archives the raw stream, pipes it through the transcoder into
//! the streaming recognizer, and relays transcript events back on the same
//! connection.
//!
//! ## WebSocket Protocol:
//! - **Client → Server**: binary frames carry raw audio chunks; text frames
//!   carry JSON control messages (`{"type":"end_recording"}` is the only
//!   recognized command, everything else is logged and ignored)
//! - **Server → Client**: `{"type":"transcript","text":...,"final":...}`
//!   while streaming, one `{"type":"recording_complete",...}` summary when
//!   the session closes, and `{"type":"error",...}` only when the pipeline
//!   cannot start
//!
//! ## Actor Model:
//! Each connection is an independent actor; its mailbox is the single-writer
//! send path for the socket. Pipeline workers hand events to the mailbox via
//! the event relay and never write to the connection themselves.

use crate::recognizer::client::RecognizerConnector;
use crate::relay::{EventRelay, Outbound, SocketRelay};
use crate::session::RecordingSession;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often the server pings an idle connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long a connection may go silent before it is dropped.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Control messages accepted from the client as JSON text frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Stop recording: exits the receive loop and runs the shutdown sequence.
    #[serde(rename = "end_recording")]
    EndRecording,
}

/// Messages the server sends to the client as JSON text frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// An incremental or final transcript for the current turn.
    #[serde(rename = "transcript")]
    Transcript {
        text: String,
        #[serde(rename = "final")]
        is_final: bool,
    },

    /// Final summary, sent exactly once when the session closes.
    #[serde(rename = "recording_complete")]
    RecordingComplete {
        filename: String,
        chunks_received: u64,
        total_bytes: u64,
    },

    /// The pipeline could not be started; the connection closes after this.
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

/// Actor-internal signal: close the socket once queued frames are written.
#[derive(Message)]
#[rtype(result = "()")]
struct CloseConnection;

/// WebSocket actor owning one recording session.
pub struct AudioStreamSocket {
    app_state: web::Data<AppState>,
    session_id: String,
    connector: Arc<dyn RecognizerConnector>,
    /// The live pipeline; `None` before start, after a start failure, and
    /// after the shutdown sequence has run.
    session: Option<RecordingSession>,
    last_heartbeat: Instant,
}

impl AudioStreamSocket {
    pub fn new(
        app_state: web::Data<AppState>,
        session_id: String,
        connector: Arc<dyn RecognizerConnector>,
    ) -> Self {
        Self {
            app_state,
            session_id,
            connector,
            session: None,
            last_heartbeat: Instant::now(),
        }
    }

    fn send_message(&self, ctx: &mut ws::WebsocketContext<Self>, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(json) => ctx.text(json),
            Err(err) => error!(session_id = %self.session_id, error = %err, "failed to serialize server message"),
        }
    }

    /// Run the shutdown sequence, then queue the summary frame and the close.
    ///
    /// Both go through the actor's own mailbox: transcript events relayed
    /// while the recognizer drained are already queued there, so the client
    /// sees every transcript before the summary, and the close lands last.
    ///
    /// Taking the session out of the actor makes this safe to reach from
    /// both `end_recording` and the client-close path: whichever comes first
    /// does the work, the other finds nothing left.
    fn finish_recording(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if let Some(mut session) = self.session.take() {
            let summary = session.shutdown();
            self.app_state
                .record_session_totals(summary.chunks_received, summary.total_bytes);

            let addr = ctx.address();
            addr.do_send(Outbound(ServerMessage::RecordingComplete {
                filename: summary.filename,
                chunks_received: summary.chunks_received,
                total_bytes: summary.total_bytes,
            }));
            addr.do_send(CloseConnection);
        }
    }

    fn handle_control(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::EndRecording) => {
                info!(session_id = %self.session_id, "end_recording received");
                self.finish_recording(ctx);
            }
            Err(err) => {
                // Unknown or malformed control payloads are never fatal.
                debug!(session_id = %self.session_id, error = %err, "ignoring unrecognized text frame");
            }
        }
    }
}

impl Actor for AudioStreamSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(session_id = %self.session_id, "audio stream connected");
        self.app_state.session_started();

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(session_id = %act.session_id, "heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });

        let relay: Arc<dyn EventRelay> =
            Arc::new(SocketRelay::new(ctx.address().recipient::<Outbound>()));
        let config = self.app_state.get_config();

        match RecordingSession::start(
            self.session_id.clone(),
            &config,
            self.connector.clone(),
            relay,
        ) {
            Ok(session) => self.session = Some(session),
            Err(err) => {
                // Fatal to the session: close immediately, no pipeline runs
                // and no summary will ever be sent.
                error!(session_id = %self.session_id, error = %err, "failed to start pipeline");
                self.send_message(
                    ctx,
                    &ServerMessage::Error {
                        code: "pipeline_start_failed".to_string(),
                        message: err.to_string(),
                    },
                );
                ctx.close(Some(ws::CloseReason {
                    code: ws::CloseCode::Error,
                    description: None,
                }));
                ctx.stop();
            }
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Disconnects and receive-loop errors land here with the session
        // still alive; clean up without a client to report to.
        if let Some(mut session) = self.session.take() {
            let summary = session.shutdown();
            self.app_state
                .record_session_totals(summary.chunks_received, summary.total_bytes);
        }
        self.app_state.session_ended();
        info!(session_id = %self.session_id, "audio stream disconnected");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for AudioStreamSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                if let Some(session) = self.session.as_mut() {
                    session.ingest(&data);
                }
            }
            Ok(ws::Message::Text(text)) => {
                self.handle_control(&text, ctx);
            }
            Ok(ws::Message::Close(reason)) => {
                info!(session_id = %self.session_id, ?reason, "client closed connection");
                if self.session.is_some() {
                    self.finish_recording(ctx);
                } else {
                    ctx.close(reason);
                    ctx.stop();
                }
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(_) => {
                debug!(session_id = %self.session_id, "ignoring unexpected frame type");
            }
            Err(err) => {
                error!(session_id = %self.session_id, error = %err, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// Transcript and summary frames arriving from the pipeline workers.
impl Handler<Outbound> for AudioStreamSocket {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        if matches!(msg.0, ServerMessage::Transcript { .. }) {
            self.app_state.record_transcript_event();
        }
        self.send_message(ctx, &msg.0);
    }
}

impl Handler<CloseConnection> for AudioStreamSocket {
    type Result = ();

    fn handle(&mut self, _msg: CloseConnection, ctx: &mut Self::Context) {
        ctx.close(None);
        ctx.stop();
    }
}

/// HTTP → WebSocket upgrade for `/ws/audio/{session_id}`.
///
/// The session identifier is taken from the path verbatim; it is opaque and
/// not checked for uniqueness.
pub async fn audio_websocket(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let session_id = path.into_inner();
    info!(
        session_id = %session_id,
        peer = ?req.connection_info().peer_addr(),
        "new audio stream connection request"
    );

    let config = app_state.get_config();
    let connector = Arc::new(crate::recognizer::client::WsRecognizerConnector::new(
        config.recognizer.clone(),
    ));

    ws::start(
        AudioStreamSocket::new(app_state, session_id, connector),
        &req,
        stream,
    )
}
