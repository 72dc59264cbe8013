//! # Streaming Recognizer Module
//!
//! The recognize half of the streaming pipeline: a blocking wire client for
//! the remote streaming speech service and the worker that feeds it PCM
//! frames and turns its callbacks into client-facing transcript events.
//!
//! The adapter is generic over `RecognizerConnector`, so tests drive it with
//! scripted sessions instead of a live endpoint.

pub mod adapter; // Worker thread: queue → remote session → event relay
pub mod client;  // Connector/stream traits and the WebSocket implementation
pub mod events;  // Wire message vocabulary of the remote service
