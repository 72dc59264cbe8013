//! # PCM Frame Queue
//!
//! Bounded, ordered hand-off of decoded PCM frames between the transcoder
//! reader thread (sole frame producer) and the recognizer feeder (sole
//! consumer).
//!
//! ## Backpressure:
//! The channel holds `capacity` frames. A full queue blocks the producer,
//! which stalls drainage of the transcoder output and eventually the
//! transcoder's own buffers. That is the intended degradation mode for a
//! slow recognizer; frames are never dropped.
//!
//! ## Termination:
//! A single sentinel, enqueued exactly once, ends the stream. Either side of
//! the pipeline may request it (the reader on end-of-output, the shutdown
//! sequence as a safety net), but an atomic guard ensures only the first
//! request enqueues it. Once the consumer has observed the sentinel it never
//! yields another frame.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A fixed-size block of decoded audio (s16le, 16 kHz, mono).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmFrame {
    pub bytes: Vec<u8>,
}

impl PcmFrame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug)]
enum QueueItem {
    Frame(PcmFrame),
    /// End-of-stream sentinel; nothing follows it.
    End,
}

/// Result of pulling from the consumer side.
#[derive(Debug, PartialEq, Eq)]
pub enum FramePull {
    /// The next frame, in the order the transcoder emitted it.
    Frame(PcmFrame),
    /// The sentinel has been observed; the stream is over for good.
    Ended,
    /// Nothing arrived within the wait window.
    Idle,
}

#[derive(Debug)]
struct Shared {
    finished: AtomicBool,
}

/// Producing half of the queue.
///
/// Clones share the finished flag, so `finish` stays exactly-once across the
/// reader thread and the shutdown sequence.
#[derive(Debug, Clone)]
pub struct FrameProducer {
    tx: Sender<QueueItem>,
    shared: Arc<Shared>,
}

/// Consuming half of the queue. Not cloneable: single consumer.
#[derive(Debug)]
pub struct FrameConsumer {
    rx: Receiver<QueueItem>,
    ended: bool,
}

/// Create a bounded queue of the given frame capacity.
pub fn frame_queue(capacity: usize) -> (FrameProducer, FrameConsumer) {
    let (tx, rx) = bounded(capacity);
    let shared = Arc::new(Shared {
        finished: AtomicBool::new(false),
    });
    (
        FrameProducer { tx, shared },
        FrameConsumer { rx, ended: false },
    )
}

/// Error returned when pushing into a terminated or abandoned queue.
#[derive(Debug, PartialEq, Eq)]
pub struct QueueClosed;

impl FrameProducer {
    /// Enqueue one frame, blocking while the queue is full.
    ///
    /// Fails once the sentinel has been requested or the consumer is gone;
    /// the caller should stop producing.
    pub fn push(&self, frame: PcmFrame) -> Result<(), QueueClosed> {
        if self.shared.finished.load(Ordering::SeqCst) {
            return Err(QueueClosed);
        }
        self.tx.send(QueueItem::Frame(frame)).map_err(|_| QueueClosed)
    }

    /// Enqueue the end-of-stream sentinel.
    ///
    /// Idempotent: the first call wins, later calls (from either the reader
    /// thread or the shutdown sequence) are no-ops. Blocks while the queue is
    /// full; the sentinel still has to travel behind buffered frames.
    pub fn finish(&self) {
        if self.shared.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        // A gone consumer means the stream already ended for the other side.
        let _ = self.tx.send(QueueItem::End);
    }

    /// Whether the sentinel has been requested.
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }
}

impl FrameConsumer {
    /// Pull the next frame, waiting up to `wait`.
    ///
    /// After `Ended` has been returned once it is returned forever, without
    /// touching the channel again; a frame racing in behind the sentinel is
    /// never yielded.
    pub fn recv_timeout(&mut self, wait: Duration) -> FramePull {
        if self.ended {
            return FramePull::Ended;
        }
        match self.rx.recv_timeout(wait) {
            Ok(QueueItem::Frame(frame)) => FramePull::Frame(frame),
            Ok(QueueItem::End) => {
                self.ended = true;
                FramePull::Ended
            }
            Err(RecvTimeoutError::Disconnected) => {
                // All producers dropped without a sentinel (reader thread
                // died); treat it as end-of-stream.
                self.ended = true;
                FramePull::Ended
            }
            Err(RecvTimeoutError::Timeout) => FramePull::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    fn frame(byte: u8) -> PcmFrame {
        PcmFrame::new(vec![byte; 4])
    }

    const WAIT: Duration = Duration::from_millis(200);

    #[test]
    fn test_frames_arrive_in_fifo_order() {
        let (producer, mut consumer) = frame_queue(8);
        producer.push(frame(1)).unwrap();
        producer.push(frame(2)).unwrap();
        producer.push(frame(3)).unwrap();

        assert_eq!(consumer.recv_timeout(WAIT), FramePull::Frame(frame(1)));
        assert_eq!(consumer.recv_timeout(WAIT), FramePull::Frame(frame(2)));
        assert_eq!(consumer.recv_timeout(WAIT), FramePull::Frame(frame(3)));
        assert_eq!(consumer.recv_timeout(Duration::from_millis(10)), FramePull::Idle);
    }

    #[test]
    fn test_sentinel_terminates_stream() {
        let (producer, mut consumer) = frame_queue(8);
        producer.push(frame(1)).unwrap();
        producer.finish();

        assert_eq!(consumer.recv_timeout(WAIT), FramePull::Frame(frame(1)));
        assert_eq!(consumer.recv_timeout(WAIT), FramePull::Ended);
        // Ended is sticky.
        assert_eq!(consumer.recv_timeout(WAIT), FramePull::Ended);
    }

    #[test]
    fn test_finish_is_idempotent_across_clones() {
        let (producer, mut consumer) = frame_queue(8);
        let other = producer.clone();
        producer.finish();
        other.finish();
        producer.finish();

        // Exactly one sentinel was enqueued, so the channel holds one item.
        assert_eq!(consumer.recv_timeout(WAIT), FramePull::Ended);
        assert!(producer.is_finished());
    }

    #[test]
    fn test_push_after_finish_is_rejected() {
        let (producer, mut consumer) = frame_queue(8);
        producer.push(frame(1)).unwrap();
        producer.finish();
        assert_eq!(producer.push(frame(2)), Err(QueueClosed));

        assert_eq!(consumer.recv_timeout(WAIT), FramePull::Frame(frame(1)));
        assert_eq!(consumer.recv_timeout(WAIT), FramePull::Ended);
    }

    #[test]
    fn test_dropped_producer_ends_stream() {
        let (producer, mut consumer) = frame_queue(8);
        producer.push(frame(1)).unwrap();
        drop(producer);

        assert_eq!(consumer.recv_timeout(WAIT), FramePull::Frame(frame(1)));
        assert_eq!(consumer.recv_timeout(WAIT), FramePull::Ended);
    }

    #[test]
    fn test_full_queue_blocks_producer() {
        let (producer, mut consumer) = frame_queue(2);
        producer.push(frame(1)).unwrap();
        producer.push(frame(2)).unwrap();

        let handle = thread::spawn(move || {
            let started = Instant::now();
            producer.push(frame(3)).unwrap();
            started.elapsed()
        });

        // Give the producer time to block against the full queue.
        thread::sleep(Duration::from_millis(100));
        assert_eq!(consumer.recv_timeout(WAIT), FramePull::Frame(frame(1)));

        let blocked_for = handle.join().unwrap();
        assert!(
            blocked_for >= Duration::from_millis(50),
            "producer should have blocked on the full queue, blocked for {:?}",
            blocked_for
        );
        assert_eq!(consumer.recv_timeout(WAIT), FramePull::Frame(frame(2)));
        assert_eq!(consumer.recv_timeout(WAIT), FramePull::Frame(frame(3)));
    }
}
