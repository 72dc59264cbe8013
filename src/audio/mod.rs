//! # Audio Pipeline Module
//!
//! The decode half of the streaming pipeline: the transcoder subprocess
//! adapter and the bounded frame queue that hands its output to the
//! recognizer feeder.
//!
//! ## Canonical PCM Format:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers
//!
//! Raw client audio (a compressed container) is written to the transcoder's
//! input; the reader thread slices its output into fixed-size frames of this
//! format. Everything downstream of the queue assumes it.

pub mod queue;      // Bounded PCM frame hand-off with sentinel termination
pub mod transcoder; // External transcoding subprocess adapter
