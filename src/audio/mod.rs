//! # Audio Module
//!
//! Mixing side of the voice pipeline: everything that produces PCM.
//!
//! ## Architecture
//!
//! ### [`source`] - Decoded audio
//! - [`AudioSource`](source::AudioSource): non-blocking PCM producer for one
//!   queued item
//! - [`ffmpeg`]: decoder collaborator backed by an `ffmpeg` child process
//!
//! ### [`mixer`] - Mixing
//! - [`MixerChannel`](mixer::MixerChannel): anything that can be mixed
//! - [`Mixer`](mixer::Mixer): sample-wise summation with clamping over a
//!   copy-on-write channel set
//!
//! ### [`queue`] - Playback queues
//! - [`QueueChannel`](queue::QueueChannel): FIFO queue adapted into a mixer
//!   channel, with one-shot completion signals per item
//!
//! ## Audio Format
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Bit Depth**: 16-bit signed integers
//! - **Channels**: Stereo (2 channels), interleaved

pub mod ffmpeg;
pub mod format;
pub mod mixer;
pub mod queue;
pub mod source;
