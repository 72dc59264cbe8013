//! Wire vocabulary of the streaming recognizer session.
//!
//! The remote endpoint speaks JSON text frames tagged by `type`. Inbound
//! messages are deserialized leniently (missing fields default) because the
//! service adds fields between releases; unknown message types are skipped by
//! the client, not errors.

use serde::{Deserialize, Serialize};

/// Messages the recognizer service sends during a streaming session.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum RecognizerMessage {
    /// The remote session is open and ready for audio.
    Begin {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        expires_at: Option<u64>,
    },

    /// An incremental or end-of-turn transcript for the current turn.
    Turn {
        #[serde(default)]
        transcript: String,
        #[serde(default)]
        end_of_turn: bool,
        #[serde(default)]
        turn_is_formatted: bool,
        #[serde(default)]
        end_of_turn_confidence: Option<f64>,
    },

    /// The remote session is over; no further turns will arrive.
    Termination {
        #[serde(default)]
        audio_duration_seconds: Option<f64>,
        #[serde(default)]
        session_duration_seconds: Option<f64>,
    },
}

/// Messages the adapter sends to the recognizer service.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum RecognizerCommand {
    /// Switch the session to fully formatted turn output.
    UpdateConfiguration { format_turns: bool },

    /// Ask the service to flush and close the session.
    Terminate,
}
