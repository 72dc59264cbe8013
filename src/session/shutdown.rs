//! # Session Shutdown Sequence
//!
//! The ordered teardown of a recording session, run exactly once per session
//! whatever ended it (an `end_recording` control message, a client
//! disconnect, or a receive-loop error).
//!
//! ## States:
//! `Active → Draining → StoppingTranscoder → StoppingRecognizer → Closed`
//!
//! Each transition is guarded by the current state, so a second `shutdown`
//! call walks through without repeating any work. Every wait is bounded: a
//! stage that misses its grace period is abandoned (and the transcoder
//! killed), never allowed to block the remaining stages. `Closed` is always
//! reached.

use crate::session::{RecordingSession, RecordingSummary};
use tracing::{debug, info, warn};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Receive loop running, pipeline flowing.
    Active,
    /// Transcoder input closed; the process is flushing its last output.
    Draining,
    /// Waiting out (or killing) the transcoder process.
    StoppingTranscoder,
    /// Sentinel guaranteed; waiting out the recognizer worker.
    StoppingRecognizer,
    /// Archive flushed; nothing left to clean up.
    Closed,
}

impl RecordingSession {
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the shutdown sequence to completion and return the final counts.
    ///
    /// Idempotent: the state guards make repeated calls (end_recording
    /// followed immediately by disconnect) clean up exactly once.
    pub fn shutdown(&mut self) -> RecordingSummary {
        if self.state == SessionState::Active {
            // Closing the input pipe is the end-of-input signal; the process
            // flushes remaining frames and exits on its own.
            self.transcoder.close_input();
            self.state = SessionState::Draining;
        }

        if self.state == SessionState::Draining {
            match self
                .transcoder
                .wait_with_grace(self.transcoder_grace, self.transcoder_kill_grace)
            {
                Some(status) => debug!(session_id = %self.session_id, %status, "transcoder exited"),
                None => warn!(session_id = %self.session_id, "transcoder not reaped, continuing shutdown"),
            }
            self.state = SessionState::StoppingTranscoder;
        }

        if self.state == SessionState::StoppingTranscoder {
            // The reader thread enqueues the sentinel when it sees
            // end-of-output; this covers the case where it died first.
            self.sentinel.finish();
            self.transcoder.join_reader();

            if !self.recognizer.wait(self.recognizer_grace) {
                warn!(session_id = %self.session_id, "recognizer worker left detached");
            }
            self.state = SessionState::StoppingRecognizer;
        }

        if self.state == SessionState::StoppingRecognizer {
            self.archive.finish();
            self.state = SessionState::Closed;
            info!(
                session_id = %self.session_id,
                chunks = self.chunks_received,
                bytes = self.bytes_received,
                file = %self.archive.filename(),
                "recording session closed"
            );
        }

        self.summary()
    }
}
