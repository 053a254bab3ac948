//! # Features
//!
//! Playback features built on top of the voice core. Each one owns a named
//! queue per guild, attached to that guild's mixer:
//!
//! - [`music`]: `/play` tracks, one at a time
//! - [`speech`]: synthesised announcements that mix over the music

use serenity::{model::id::GuildId, prelude::TypeMapKey};
use std::sync::Arc;
use tracing::info;

pub mod collection;
pub mod music;
pub mod speech;

use crate::{config::Config, voice::registry::GuildVoiceRegistry};
use music::MusicService;
use speech::SpeechService;

/// Everything the bot layer needs, stored in serenity's `TypeMap`.
pub struct VoiceServices {
    pub registry: Arc<GuildVoiceRegistry>,
    pub music: MusicService,
    pub speech: SpeechService,
}

impl VoiceServices {
    pub fn new(registry: Arc<GuildVoiceRegistry>, config: &Config) -> Self {
        Self {
            music: MusicService::new(registry.clone(), config.music_dir.clone(), config.ffmpeg_path.clone()),
            speech: SpeechService::new(registry.clone(), config.tts_program.clone(), config.ffmpeg_path.clone()),
            registry,
        }
    }

    /// Libera todo lo asociado a una guild (el bot salió o fue expulsado)
    pub async fn remove_guild(&self, guild_id: GuildId) {
        let dropped = self.music.remove(guild_id) + self.speech.remove(guild_id);
        self.registry.remove(guild_id).await;
        info!("🧹 Guild {} liberada ({} elementos descartados)", guild_id, dropped);
    }
}

impl TypeMapKey for VoiceServices {
    type Value = Arc<VoiceServices>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{queue::PlaybackOutcome, source::PcmBuffer},
        voice::testing::{test_config, FakeTransport},
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::ChannelId;

    #[tokio::test]
    async fn test_remove_guild_releases_queues_and_connection() {
        let transport = Arc::new(FakeTransport::new());
        let registry = Arc::new(GuildVoiceRegistry::new(transport.clone(), test_config()));
        let services = VoiceServices::new(registry.clone(), &Config::default());
        let guild = GuildId::new(9);

        registry
            .get(guild)
            .move_to(Some(ChannelId::new(90)))
            .await
            .unwrap();
        let queue = registry.get(guild).open_queue::<String>("extra");
        let done = queue
            .enqueue("x".to_string(), PcmBuffer::constant(0, 10_000_000))
            .unwrap();

        services.remove_guild(guild).await;

        assert!(registry.find(guild).is_none());
        assert_eq!(transport.log().active_sessions, 0);
        // La cola muere junto con el mezclador de la conexión eliminada
        drop(queue);
        assert_eq!(done.await, PlaybackOutcome::Stopped);
    }
}
