//! # Streaming Recognizer Adapter
//!
//! Drives one remote streaming recognition session per recording session.
//! Runs on its own worker thread because the wire client's send loop and
//! message polling are blocking.
//!
//! The worker alternates between polling the session for events and pulling
//! PCM frames from the frame queue until the sentinel arrives, then asks the
//! remote session to terminate and drains late turn events for a short
//! window.
//!
//! ## Event rules:
//! - A turn is relayed only when its text is non-empty; an end-of-turn with
//!   empty text is a no-op, so clients never see a final empty transcript.
//! - `final` is set exactly when the service signalled end-of-turn.
//! - The first end-of-turn that arrives unformatted triggers a one-time
//!   switch of the session to fully formatted output.
//!
//! A failed connection or a mid-stream transport error degrades the session:
//! the worker exits, the frame queue consumer is dropped, and transcription
//! simply stops while archival continues.

use crate::audio::queue::{FrameConsumer, FramePull};
use crate::recognizer::client::{RecognizerConnector, RecognizerStream};
use crate::recognizer::events::{RecognizerCommand, RecognizerMessage};
use crate::relay::EventRelay;
use crate::websocket::ServerMessage;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long to wait for the service's termination acknowledgement after the
/// last frame has been sent.
const TERMINATE_DRAIN: Duration = Duration::from_secs(2);

/// Handle to the recognizer worker thread.
pub struct RecognizerHandle {
    join: Option<JoinHandle<()>>,
    done: Receiver<()>,
}

impl RecognizerHandle {
    /// Wait up to `grace` for the worker to finish, then join it.
    ///
    /// Returns false on timeout; the worker is left detached and will exit
    /// on its own once its transport unblocks. Shutdown proceeds regardless.
    pub fn wait(&mut self, grace: Duration) -> bool {
        match self.done.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.join.take() {
                    if handle.join().is_err() {
                        warn!("recognizer worker thread panicked");
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("recognizer worker did not stop within grace period");
                false
            }
        }
    }
}

/// Spawn the recognizer worker for one session.
///
/// The worker owns the frame queue consumer; the caller keeps only the
/// returned handle.
pub fn spawn(
    connector: Arc<dyn RecognizerConnector>,
    sample_rate: u32,
    frames: FrameConsumer,
    relay: Arc<dyn EventRelay>,
    poll_interval: Duration,
) -> RecognizerHandle {
    // The sender is dropped when the worker returns, which wakes `wait`.
    let (done_tx, done_rx) = bounded::<()>(0);

    let join = thread::Builder::new()
        .name("recognizer-feeder".to_string())
        .spawn(move || {
            let _done = done_tx;
            run(connector, sample_rate, frames, relay, poll_interval);
        })
        .ok();

    if join.is_none() {
        warn!("failed to spawn recognizer worker thread");
    }

    RecognizerHandle {
        join,
        done: done_rx,
    }
}

enum Flow {
    Continue,
    Stop,
}

fn run(
    connector: Arc<dyn RecognizerConnector>,
    sample_rate: u32,
    mut frames: FrameConsumer,
    relay: Arc<dyn EventRelay>,
    poll_interval: Duration,
) {
    let mut stream = match connector.connect(sample_rate) {
        Ok(stream) => stream,
        Err(err) => {
            // Degraded session: no transcripts, archival continues. Dropping
            // the consumer unblocks the transcoder reader.
            warn!(error = %err, "recognizer connection failed, transcription disabled");
            return;
        }
    };

    let mut format_requested = false;
    let mut remote_terminated = false;

    loop {
        match stream.poll_message(poll_interval) {
            Ok(Some(message)) => {
                if let Flow::Stop =
                    handle_message(message, relay.as_ref(), stream.as_mut(), &mut format_requested)
                {
                    remote_terminated = true;
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "recognizer session lost mid-stream");
                remote_terminated = true;
                break;
            }
        }

        match frames.recv_timeout(poll_interval) {
            FramePull::Frame(frame) => {
                if let Err(err) = stream.send_audio(&frame.bytes) {
                    warn!(error = %err, "failed to feed frame to recognizer");
                    remote_terminated = true;
                    break;
                }
            }
            FramePull::Idle => {}
            FramePull::Ended => break,
        }
    }

    if !remote_terminated {
        finish_session(stream.as_mut(), relay.as_ref(), &mut format_requested, poll_interval);
    }
    stream.close();
    debug!("recognizer worker finished");
}

/// Ask the remote session to terminate and relay any late turns until the
/// acknowledgement (or a bounded drain window) arrives.
fn finish_session(
    stream: &mut dyn RecognizerStream,
    relay: &dyn EventRelay,
    format_requested: &mut bool,
    poll_interval: Duration,
) {
    if let Err(err) = stream.send_command(&RecognizerCommand::Terminate) {
        warn!(error = %err, "failed to send terminate command");
        return;
    }

    let deadline = Instant::now() + TERMINATE_DRAIN;
    while Instant::now() < deadline {
        match stream.poll_message(poll_interval) {
            Ok(Some(message)) => {
                if let Flow::Stop = handle_message(message, relay, stream, format_requested) {
                    return;
                }
            }
            Ok(None) => {}
            Err(_) => return,
        }
    }
    debug!("recognizer termination not acknowledged within drain window");
}

fn handle_message(
    message: RecognizerMessage,
    relay: &dyn EventRelay,
    stream: &mut dyn RecognizerStream,
    format_requested: &mut bool,
) -> Flow {
    match message {
        RecognizerMessage::Begin { id, .. } => {
            info!(session = ?id, "recognizer session began");
            Flow::Continue
        }
        RecognizerMessage::Turn {
            transcript,
            end_of_turn,
            turn_is_formatted,
            ..
        } => {
            if end_of_turn && !turn_is_formatted && !*format_requested {
                // One-time upgrade: later turns arrive fully formatted.
                *format_requested = true;
                if let Err(err) =
                    stream.send_command(&RecognizerCommand::UpdateConfiguration { format_turns: true })
                {
                    warn!(error = %err, "failed to request formatted turns");
                }
            }

            // An end-of-turn with no text is a no-op, never a final event.
            if !transcript.trim().is_empty() {
                relay.deliver(ServerMessage::Transcript {
                    text: transcript,
                    is_final: end_of_turn,
                });
            }
            Flow::Continue
        }
        RecognizerMessage::Termination {
            audio_duration_seconds,
            ..
        } => {
            info!(audio_seconds = ?audio_duration_seconds, "recognizer session terminated");
            Flow::Stop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::{frame_queue, PcmFrame};
    use crate::error::RecognizerError;
    use crate::relay::testing::CollectingRelay;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const POLL: Duration = Duration::from_millis(5);
    const WAIT: Duration = Duration::from_secs(5);

    /// Everything the scripted stream observed, shared with the test body.
    #[derive(Default)]
    struct StreamLog {
        audio: Mutex<Vec<Vec<u8>>>,
        commands: Mutex<Vec<RecognizerCommand>>,
        closed: Mutex<bool>,
    }

    /// Stream that replays a fixed script of inbound messages, one per poll.
    struct ScriptedStream {
        incoming: VecDeque<Result<Option<RecognizerMessage>, RecognizerError>>,
        log: Arc<StreamLog>,
    }

    impl RecognizerStream for ScriptedStream {
        fn send_audio(&mut self, frame: &[u8]) -> Result<(), RecognizerError> {
            self.log.audio.lock().unwrap().push(frame.to_vec());
            Ok(())
        }

        fn send_command(&mut self, command: &RecognizerCommand) -> Result<(), RecognizerError> {
            self.log.commands.lock().unwrap().push(command.clone());
            Ok(())
        }

        fn poll_message(
            &mut self,
            _wait: Duration,
        ) -> Result<Option<RecognizerMessage>, RecognizerError> {
            self.incoming.pop_front().unwrap_or(Ok(None))
        }

        fn close(&mut self) {
            *self.log.closed.lock().unwrap() = true;
        }
    }

    struct ScriptedConnector {
        script: Mutex<Option<ScriptedStream>>,
    }

    impl ScriptedConnector {
        fn new(
            incoming: Vec<Result<Option<RecognizerMessage>, RecognizerError>>,
            log: Arc<StreamLog>,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(Some(ScriptedStream {
                    incoming: incoming.into(),
                    log,
                })),
            })
        }
    }

    impl RecognizerConnector for ScriptedConnector {
        fn connect(&self, _sample_rate: u32) -> Result<Box<dyn RecognizerStream>, RecognizerError> {
            match self.script.lock().unwrap().take() {
                Some(stream) => Ok(Box::new(stream)),
                None => Err(RecognizerError::Handshake("already connected".to_string())),
            }
        }
    }

    struct FailingConnector;

    impl RecognizerConnector for FailingConnector {
        fn connect(&self, _sample_rate: u32) -> Result<Box<dyn RecognizerStream>, RecognizerError> {
            Err(RecognizerError::Handshake("no credentials".to_string()))
        }
    }

    fn turn(text: &str, end_of_turn: bool, formatted: bool) -> RecognizerMessage {
        RecognizerMessage::Turn {
            transcript: text.to_string(),
            end_of_turn,
            turn_is_formatted: formatted,
            end_of_turn_confidence: None,
        }
    }

    #[test]
    fn test_partial_then_final_turns_relayed_in_order() {
        let log = Arc::new(StreamLog::default());
        let connector = ScriptedConnector::new(
            vec![
                Ok(Some(RecognizerMessage::Begin {
                    id: Some("s1".to_string()),
                    expires_at: None,
                })),
                Ok(Some(turn("hel", false, false))),
                Ok(Some(turn("hello world", true, true))),
                Ok(Some(RecognizerMessage::Termination {
                    audio_duration_seconds: None,
                    session_duration_seconds: None,
                })),
            ],
            log.clone(),
        );
        let relay = Arc::new(CollectingRelay::default());
        let (producer, consumer) = frame_queue(8);

        let mut handle = spawn(connector, 16_000, consumer, relay.clone(), POLL);
        producer.finish();
        assert!(handle.wait(WAIT));

        let messages = relay.messages.lock().unwrap();
        assert_eq!(
            *messages,
            vec![
                ServerMessage::Transcript {
                    text: "hel".to_string(),
                    is_final: false,
                },
                ServerMessage::Transcript {
                    text: "hello world".to_string(),
                    is_final: true,
                },
            ]
        );
        assert!(*log.closed.lock().unwrap());
    }

    #[test]
    fn test_empty_end_of_turn_emits_nothing() {
        let log = Arc::new(StreamLog::default());
        let connector = ScriptedConnector::new(
            vec![
                Ok(Some(turn("", true, true))),
                Ok(Some(turn("   ", true, true))),
                Ok(Some(RecognizerMessage::Termination {
                    audio_duration_seconds: None,
                    session_duration_seconds: None,
                })),
            ],
            log,
        );
        let relay = Arc::new(CollectingRelay::default());
        let (producer, consumer) = frame_queue(8);

        let mut handle = spawn(connector, 16_000, consumer, relay.clone(), POLL);
        producer.finish();
        assert!(handle.wait(WAIT));

        assert!(relay.messages.lock().unwrap().is_empty());
    }

    #[test]
    fn test_formatting_upgrade_requested_once() {
        let log = Arc::new(StreamLog::default());
        let connector = ScriptedConnector::new(
            vec![
                Ok(Some(turn("first turn", true, false))),
                Ok(Some(turn("second turn", true, false))),
                Ok(Some(RecognizerMessage::Termination {
                    audio_duration_seconds: None,
                    session_duration_seconds: None,
                })),
            ],
            log.clone(),
        );
        let relay = Arc::new(CollectingRelay::default());
        let (producer, consumer) = frame_queue(8);

        let mut handle = spawn(connector, 16_000, consumer, relay, POLL);
        producer.finish();
        assert!(handle.wait(WAIT));

        let commands = log.commands.lock().unwrap();
        let upgrades = commands
            .iter()
            .filter(|c| matches!(c, RecognizerCommand::UpdateConfiguration { .. }))
            .count();
        assert_eq!(upgrades, 1);
    }

    #[test]
    fn test_frames_forwarded_then_terminated() {
        let log = Arc::new(StreamLog::default());
        let connector = ScriptedConnector::new(Vec::new(), log.clone());
        let relay = Arc::new(CollectingRelay::default());
        let (producer, consumer) = frame_queue(8);

        let mut handle = spawn(connector, 16_000, consumer, relay, POLL);
        producer.push(PcmFrame::new(vec![1; 4])).unwrap();
        producer.push(PcmFrame::new(vec![2; 4])).unwrap();
        producer.finish();
        assert!(handle.wait(WAIT));

        assert_eq!(*log.audio.lock().unwrap(), vec![vec![1; 4], vec![2; 4]]);
        let commands = log.commands.lock().unwrap();
        assert_eq!(commands.last(), Some(&RecognizerCommand::Terminate));
        assert!(*log.closed.lock().unwrap());
    }

    #[test]
    fn test_termination_event_stops_worker_without_terminate_command() {
        let log = Arc::new(StreamLog::default());
        let connector = ScriptedConnector::new(
            vec![Ok(Some(RecognizerMessage::Termination {
                audio_duration_seconds: Some(1.0),
                session_duration_seconds: None,
            }))],
            log.clone(),
        );
        let relay = Arc::new(CollectingRelay::default());
        let (_producer, consumer) = frame_queue(8);

        let mut handle = spawn(connector, 16_000, consumer, relay, POLL);
        assert!(handle.wait(WAIT));

        assert!(log.commands.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failed_connection_degrades_quietly() {
        let relay = Arc::new(CollectingRelay::default());
        let (producer, consumer) = frame_queue(2);

        let mut handle = spawn(Arc::new(FailingConnector), 16_000, consumer, relay.clone(), POLL);
        assert!(handle.wait(WAIT));

        // The consumer is gone, so the producer side errors instead of
        // blocking the transcoder reader forever.
        assert!(producer.push(PcmFrame::new(vec![0; 4])).is_err());
        assert!(relay.messages.lock().unwrap().is_empty());
    }
}
