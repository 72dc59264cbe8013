//! # Recording Session
//!
//! State and resources for one audio-streaming connection: the archival file,
//! the transcoder subprocess, the frame queue, and the recognizer worker.
//! Owned exclusively by the connection's WebSocket actor; none of it is
//! shared across sessions.
//!
//! ## Lifecycle:
//! 1. **start**: open the archival file, spawn the transcoder, spawn the
//!    recognizer worker. Any failure here is fatal to the session and leaves
//!    no pipeline running.
//! 2. **ingest**: for each binary chunk, append to the archive, bump the
//!    counters, and forward to the transcoder input (best-effort).
//! 3. **shutdown** (see [`shutdown`]): drain and stop every stage exactly
//!    once, in order, with bounded grace periods.

pub mod archive;
pub mod shutdown;

use crate::audio::queue::{frame_queue, FrameProducer};
use crate::audio::transcoder::Transcoder;
use crate::config::AppConfig;
use crate::error::SessionError;
use crate::recognizer::adapter::{self, RecognizerHandle};
use crate::recognizer::client::RecognizerConnector;
use crate::relay::EventRelay;
use crate::session::archive::ArchiveWriter;
use crate::session::shutdown::SessionState;

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Final counts reported to the client when a session closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    pub filename: String,
    pub chunks_received: u64,
    pub total_bytes: u64,
}

/// One live recording session and everything it owns.
pub struct RecordingSession {
    session_id: String,
    archive: ArchiveWriter,
    transcoder: Transcoder,
    /// Clone of the queue's producing half, kept so the shutdown sequence
    /// can guarantee the sentinel even if the reader thread is stuck.
    sentinel: FrameProducer,
    recognizer: RecognizerHandle,
    chunks_received: u64,
    bytes_received: u64,
    state: SessionState,
    transcoder_grace: Duration,
    transcoder_kill_grace: Duration,
    recognizer_grace: Duration,
}

impl RecordingSession {
    /// Open the archival file and start the full pipeline.
    ///
    /// The recognizer worker connects on its own thread, so a slow or failing
    /// recognizer endpoint never delays session start; only archival or
    /// transcoder-spawn failures are fatal here.
    pub fn start(
        session_id: String,
        config: &AppConfig,
        connector: Arc<dyn RecognizerConnector>,
        relay: Arc<dyn EventRelay>,
    ) -> Result<Self, SessionError> {
        let created_at = Utc::now();
        let archive = ArchiveWriter::create(
            Path::new(&config.storage.recordings_dir),
            &session_id,
            created_at,
        )
        .map_err(SessionError::Archive)?;

        let (producer, consumer) = frame_queue(config.audio.queue_capacity);

        let transcoder = Transcoder::spawn(
            &config.transcoder,
            config.audio.sample_rate,
            config.audio.frame_bytes,
            producer.clone(),
        )?;

        let recognizer = adapter::spawn(
            connector,
            config.audio.sample_rate,
            consumer,
            relay,
            Duration::from_millis(config.recognizer.poll_interval_ms),
        );

        debug!(session_id = %session_id, file = %archive.filename(), "recording session started");

        Ok(Self {
            session_id,
            archive,
            transcoder,
            sentinel: producer,
            recognizer,
            chunks_received: 0,
            bytes_received: 0,
            state: SessionState::Active,
            transcoder_grace: Duration::from_secs(config.transcoder.shutdown_grace_secs),
            transcoder_kill_grace: Duration::from_secs(config.transcoder.kill_grace_secs),
            recognizer_grace: Duration::from_secs(config.recognizer.shutdown_grace_secs),
        })
    }

    /// Handle one inbound binary audio chunk.
    ///
    /// Archival and the counters always advance together; forwarding to the
    /// transcoder is best-effort: a dead process loses transcription, not
    /// the recording.
    pub fn ingest(&mut self, chunk: &[u8]) {
        if self.state != SessionState::Active {
            debug!(session_id = %self.session_id, "dropping chunk received after shutdown began");
            return;
        }

        if let Err(err) = self.archive.append(chunk) {
            warn!(session_id = %self.session_id, error = %err, "archival write failed");
        }
        self.chunks_received += 1;
        self.bytes_received += chunk.len() as u64;

        if let Err(err) = self.transcoder.write(chunk) {
            warn!(session_id = %self.session_id, error = %err, "dropping chunk: transcoder input unavailable");
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn chunks_received(&self) -> u64 {
        self.chunks_received
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn summary(&self) -> RecordingSummary {
        RecordingSummary {
            filename: self.archive.filename().to_string(),
            chunks_received: self.chunks_received,
            total_bytes: self.bytes_received,
        }
    }
}
