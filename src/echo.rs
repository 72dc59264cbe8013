//! # Echo WebSocket
//!
//! Generic text echo socket at `/ws/echo`. Each connection registers itself
//! in the process-wide [`ConnectionRegistry`] on start and deregisters on
//! stop; text frames are echoed straight back. Unrelated to the audio
//! pipeline; it shares nothing with recording sessions beyond the registry.

use crate::registry::{BroadcastText, ConnectionRegistry};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub struct EchoSocket {
    registry: Arc<ConnectionRegistry>,
    conn_id: String,
}

impl EchoSocket {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            conn_id: Uuid::new_v4().to_string(),
        }
    }
}

impl Actor for EchoSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(conn_id = %self.conn_id, "echo connection opened");
        self.registry
            .add(self.conn_id.clone(), ctx.address().recipient());
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.registry.remove(&self.conn_id);
        info!(conn_id = %self.conn_id, "echo connection closed");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for EchoSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => ctx.text(text),
            Ok(ws::Message::Ping(data)) => ctx.pong(&data),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => debug!(conn_id = %self.conn_id, "ignoring non-text frame"),
            Err(_) => ctx.stop(),
        }
    }
}

impl Handler<BroadcastText> for EchoSocket {
    type Result = ();

    fn handle(&mut self, msg: BroadcastText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

/// HTTP → WebSocket upgrade for `/ws/echo`.
pub async fn echo_websocket(
    req: HttpRequest,
    stream: web::Payload,
    registry: web::Data<ConnectionRegistry>,
) -> ActixResult<HttpResponse> {
    ws::start(EchoSocket::new(registry.into_inner()), &req, stream)
}
