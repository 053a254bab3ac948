//! # Guild Voice
//!
//! Per-guild real-time audio for Discord bots: several independent playback
//! queues per guild are summed by a [`Mixer`](audio::mixer::Mixer) and written
//! to the guild's voice channel by a dedicated pump task.
//!
//! - [`audio`]: sources, mixer and playback queues
//! - [`voice`]: connections, the pump and the transport seam
//! - [`features`]: music and speech built on top of the queues
//! - [`bot`]: the serenity event handler and slash commands

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod features;
pub mod ui;
pub mod voice;
