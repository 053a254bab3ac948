//! # Voice Module
//!
//! Transport side of the pipeline: per-guild voice presence and the pump that
//! drains each guild's mixer into Discord.
//!
//! - [`registry`]: one [`GuildVoiceConnection`](connection::GuildVoiceConnection)
//!   per guild, created lazily
//! - [`connection`]: channel moves, serialized per guild, and auto-leave
//! - [`pump`]: the dedicated task writing mixed PCM at the transport's pace
//! - [`transport`]: the collaborator traits the core depends on
//! - [`discord`]: songbird-backed implementation of those traits

pub mod connection;
pub mod discord;
pub mod pump;
pub mod registry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
