//! # Transcoder Process Adapter
//!
//! Owns one external transcoding subprocess per session. Raw compressed audio
//! chunks are written to the process input; a dedicated reader thread pulls
//! fixed-size PCM frames from the process output and pushes them into the
//! frame queue.
//!
//! ## Lifecycle:
//! - `spawn` launches the process and the reader thread. A spawn failure is
//!   fatal to the session: nothing else is started.
//! - `write` forwards one chunk, best-effort. After the process dies, writes
//!   fail and the caller logs and drops the chunk.
//! - `close_input` signals end-of-input so the process can flush and exit.
//! - `wait_with_grace` waits for exit, then escalates to a kill with its own
//!   short grace. Shutdown never blocks indefinitely on this process.
//!
//! A mid-session crash of the process surfaces as end-of-stream on the frame
//! queue; the session keeps archiving, transcription just stops.

use crate::audio::queue::{FrameProducer, PcmFrame};
use crate::config::TranscoderConfig;
use crate::error::TranscoderError;

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Interval between exit polls while waiting out a grace period.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Handle to the transcoding subprocess and its reader thread.
pub struct Transcoder {
    child: Child,
    stdin: Option<ChildStdin>,
    reader: Option<JoinHandle<()>>,
}

impl Transcoder {
    /// Launch the configured transcoder and its output reader thread.
    ///
    /// The reader thread owns the process stdout and the given producer; it
    /// pushes one `PcmFrame` per `frame_bytes` read and enqueues the sentinel
    /// on any short or failed read.
    pub fn spawn(
        config: &TranscoderConfig,
        sample_rate: u32,
        frame_bytes: usize,
        producer: FrameProducer,
    ) -> Result<Self, TranscoderError> {
        let mut command = build_command(config, sample_rate);
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(TranscoderError::Spawn)?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TranscoderError::Spawn(std::io::Error::other("missing stdout pipe")))?;

        let reader = match thread::Builder::new()
            .name("transcoder-reader".to_string())
            .spawn(move || read_frames(stdout, frame_bytes, producer))
        {
            Ok(handle) => handle,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TranscoderError::Spawn(err));
            }
        };

        debug!(binary = %config.binary, "transcoder process started");

        Ok(Self {
            child,
            stdin,
            reader: Some(reader),
        })
    }

    /// Forward one raw audio chunk to the process input.
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), TranscoderError> {
        let stdin = self.stdin.as_mut().ok_or(TranscoderError::InputClosed)?;
        stdin.write_all(chunk).map_err(TranscoderError::Write)
    }

    /// Close the process input stream, signalling end-of-input.
    ///
    /// Idempotent. Dropping the handle closes the pipe, which lets the
    /// process flush remaining output and exit on its own.
    pub fn close_input(&mut self) {
        if self.stdin.take().is_some() {
            debug!("transcoder input closed");
        }
    }

    /// Wait for the process to exit within `grace`; on timeout, kill it and
    /// wait up to `kill_grace` more.
    ///
    /// Returns the exit status if the process was reaped.
    pub fn wait_with_grace(&mut self, grace: Duration, kill_grace: Duration) -> Option<ExitStatus> {
        if let Some(status) = self.poll_exit(grace) {
            return Some(status);
        }

        warn!("transcoder did not exit within grace period, killing it");
        if let Err(err) = self.child.kill() {
            warn!(error = %err, "failed to kill transcoder process");
        }

        let status = self.poll_exit(kill_grace);
        if status.is_none() {
            warn!("transcoder process still running after kill; leaving it to drop cleanup");
        }
        status
    }

    /// Join the reader thread.
    ///
    /// Safe to call after the process has exited (or been killed): the
    /// reader's next read returns end-of-file and the thread finishes.
    pub fn join_reader(&mut self) {
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                warn!("transcoder reader thread panicked");
            }
        }
    }

    fn poll_exit(&mut self, window: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + window;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "failed to poll transcoder exit status");
                    return None;
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}

impl Drop for Transcoder {
    fn drop(&mut self) {
        self.stdin.take();
        // Reap the process if the shutdown sequence never got to it.
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        self.join_reader();
    }
}

/// Assemble the subprocess command line from the configured template,
/// substituting the `{sample_rate}` token.
fn build_command(config: &TranscoderConfig, sample_rate: u32) -> Command {
    let mut command = Command::new(&config.binary);
    for arg in &config.args {
        if arg == "{sample_rate}" {
            command.arg(sample_rate.to_string());
        } else {
            command.arg(arg);
        }
    }
    command
}

/// Reader loop: blocking fixed-size reads on the process output.
///
/// A partial frame at end-of-output is discarded; the sentinel marks the end
/// of the stream either way. A closed queue (consumer gone) ends the loop
/// without a sentinel; the consumer already stopped listening.
fn read_frames(mut stdout: ChildStdout, frame_bytes: usize, producer: FrameProducer) {
    let mut buf = vec![0u8; frame_bytes];
    loop {
        let mut filled = 0;
        while filled < frame_bytes {
            match stdout.read(&mut buf[filled..]) {
                Ok(0) => {
                    if filled > 0 {
                        debug!(bytes = filled, "discarding partial trailing frame");
                    }
                    producer.finish();
                    return;
                }
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(error = %err, "transcoder output read failed");
                    producer.finish();
                    return;
                }
            }
        }
        if producer.push(PcmFrame::new(buf.clone())).is_err() {
            debug!("frame queue closed, stopping transcoder reader");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::{frame_queue, FramePull};

    const WAIT: Duration = Duration::from_secs(2);

    /// A pass-through "transcoder" for tests: copies stdin to stdout.
    fn cat_config() -> TranscoderConfig {
        TranscoderConfig {
            binary: "cat".to_string(),
            args: Vec::new(),
            shutdown_grace_secs: 2,
            kill_grace_secs: 1,
        }
    }

    #[test]
    fn test_spawn_failure_for_missing_binary() {
        let config = TranscoderConfig {
            binary: "definitely-not-a-real-transcoder".to_string(),
            args: Vec::new(),
            shutdown_grace_secs: 1,
            kill_grace_secs: 1,
        };
        let (producer, _consumer) = frame_queue(4);
        let result = Transcoder::spawn(&config, 16_000, 4, producer);
        assert!(matches!(result, Err(TranscoderError::Spawn(_))));
    }

    #[test]
    fn test_frames_flow_from_input_to_queue() {
        let (producer, mut consumer) = frame_queue(8);
        let mut transcoder = Transcoder::spawn(&cat_config(), 16_000, 4, producer).unwrap();

        transcoder.write(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        transcoder.close_input();

        assert_eq!(
            consumer.recv_timeout(WAIT),
            FramePull::Frame(PcmFrame::new(vec![1, 2, 3, 4]))
        );
        assert_eq!(
            consumer.recv_timeout(WAIT),
            FramePull::Frame(PcmFrame::new(vec![5, 6, 7, 8]))
        );
        assert_eq!(consumer.recv_timeout(WAIT), FramePull::Ended);

        let status = transcoder.wait_with_grace(WAIT, WAIT);
        assert!(status.map(|s| s.success()).unwrap_or(false));
        transcoder.join_reader();
    }

    #[test]
    fn test_partial_trailing_frame_is_discarded() {
        let (producer, mut consumer) = frame_queue(8);
        let mut transcoder = Transcoder::spawn(&cat_config(), 16_000, 4, producer).unwrap();

        transcoder.write(&[1, 2, 3, 4, 5, 6]).unwrap();
        transcoder.close_input();

        assert_eq!(
            consumer.recv_timeout(WAIT),
            FramePull::Frame(PcmFrame::new(vec![1, 2, 3, 4]))
        );
        // The two leftover bytes never form a frame.
        assert_eq!(consumer.recv_timeout(WAIT), FramePull::Ended);

        transcoder.wait_with_grace(WAIT, WAIT);
    }

    #[test]
    fn test_write_after_close_input_fails() {
        let (producer, _consumer) = frame_queue(8);
        let mut transcoder = Transcoder::spawn(&cat_config(), 16_000, 4, producer).unwrap();

        transcoder.close_input();
        assert!(matches!(
            transcoder.write(&[0, 0]),
            Err(TranscoderError::InputClosed)
        ));
        transcoder.wait_with_grace(WAIT, WAIT);
    }

    #[test]
    fn test_kill_escalation_reaps_stubborn_process() {
        // `sleep` ignores its closed stdin and would outlive any grace period.
        let config = TranscoderConfig {
            binary: "sleep".to_string(),
            args: vec!["30".to_string()],
            shutdown_grace_secs: 1,
            kill_grace_secs: 1,
        };
        let (producer, _consumer) = frame_queue(4);
        let mut transcoder = Transcoder::spawn(&config, 16_000, 4, producer).unwrap();

        transcoder.close_input();
        let started = Instant::now();
        let status = transcoder.wait_with_grace(Duration::from_millis(200), WAIT);
        assert!(status.is_some(), "kill escalation should reap the process");
        assert!(!status.unwrap().success());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_command_substitutes_sample_rate() {
        let mut config = cat_config();
        config.args = vec!["-ar".to_string(), "{sample_rate}".to_string()];
        let command = build_command(&config, 16_000);
        let args: Vec<_> = command
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(args, vec!["-ar", "16000"]);
    }
}
