use anyhow::{Context as _, Result};
use serenity::model::id::{ChannelId, GuildId};
use std::{process::Stdio, sync::Arc};
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info};

use super::collection::GuildQueueCollection;
use crate::{
    audio::{ffmpeg::FfmpegSource, queue::Completion},
    voice::registry::GuildVoiceRegistry,
};

/// Nombre del canal de voz sintetizada en el mezclador
pub const SPEECH_QUEUE: &str = "speech";

/// Longitud máxima de un mensaje hablado
pub const MAX_SPEECH_CHARS: usize = 300;

/// Text-to-speech announcements, mixed on top of the music queue.
pub struct SpeechService {
    queues: GuildQueueCollection<String>,
    tts_program: String,
    ffmpeg: String,
}

impl SpeechService {
    pub fn new(registry: Arc<GuildVoiceRegistry>, tts_program: String, ffmpeg: String) -> Self {
        Self {
            queues: GuildQueueCollection::new(SPEECH_QUEUE, registry),
            tts_program,
            ffmpeg,
        }
    }

    /// Synthesises `text` and queues it on the guild's speech channel.
    ///
    /// The wav file is removed once the queued source is dropped.
    pub async fn say(&self, guild_id: GuildId, channel_id: ChannelId, text: &str) -> Result<Completion> {
        let text = text.trim();
        if text.is_empty() {
            anyhow::bail!("No hay nada que decir");
        }
        if text.chars().count() > MAX_SPEECH_CHARS {
            anyhow::bail!("El mensaje supera los {} caracteres", MAX_SPEECH_CHARS);
        }

        // Sintetizar antes de mover: un fallo del TTS no debe unir al bot
        let wav = self.synthesize(text).await?;

        self.queues
            .registry()
            .get(guild_id)
            .move_to(Some(channel_id))
            .await?;

        let input = wav.path().to_string_lossy().into_owned();
        let source = FfmpegSource::spawn(&self.ffmpeg, &input)?.with_keepalive(wav);
        let completion = self.queues.get(guild_id).enqueue(text.to_string(), source)?;

        info!("🗣️ Mensaje de voz en cola para guild {}", guild_id);
        Ok(completion)
    }

    /// Ejecuta `<tts> -w <archivo> <texto>` y devuelve el wav generado.
    pub async fn synthesize(&self, text: &str) -> Result<NamedTempFile> {
        let wav = tempfile::Builder::new()
            .prefix("speech-")
            .suffix(".wav")
            .tempfile()?;

        let status = Command::new(&self.tts_program)
            .arg("-w")
            .arg(wav.path())
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("No se pudo ejecutar {}", self.tts_program))?;

        if !status.success() {
            anyhow::bail!("{} terminó con {}", self.tts_program, status);
        }

        debug!("Síntesis completada en {}", wav.path().display());
        Ok(wav)
    }

    pub fn stop(&self, guild_id: GuildId) -> usize {
        self.queues.find(guild_id).map_or(0, |q| q.stop())
    }

    pub fn remove(&self, guild_id: GuildId) -> usize {
        self.queues.remove(guild_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::testing::{test_config, FakeTransport};
    use pretty_assertions::assert_eq;

    const GUILD: GuildId = GuildId::new(5);
    const CHANNEL: ChannelId = ChannelId::new(50);

    fn speech_service(tts: &str) -> (Arc<FakeTransport>, SpeechService) {
        let transport = Arc::new(FakeTransport::new());
        let registry = Arc::new(GuildVoiceRegistry::new(transport.clone(), test_config()));
        let service = SpeechService::new(registry, tts.to_string(), "ffmpeg".to_string());
        (transport, service)
    }

    #[tokio::test]
    async fn test_synthesize_returns_temp_file() {
        let (_, service) = speech_service("true");

        let wav = service.synthesize("hola").await.unwrap();

        assert!(wav.path().exists());
        assert_eq!(wav.path().extension().unwrap(), "wav");
    }

    #[tokio::test]
    async fn test_failed_synthesis_does_not_join() {
        let (transport, service) = speech_service("false");
        assert!(service.say(GUILD, CHANNEL, "hola").await.is_err());

        let (missing, service) = speech_service("tts-que-no-existe");
        assert!(service.say(GUILD, CHANNEL, "hola").await.is_err());

        assert!(transport.log().connects.is_empty());
        assert!(missing.log().connects.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_empty_and_long_text() {
        let (transport, service) = speech_service("true");

        assert!(service.say(GUILD, CHANNEL, "   ").await.is_err());
        let long = "a".repeat(MAX_SPEECH_CHARS + 1);
        assert!(service.say(GUILD, CHANNEL, &long).await.is_err());
        assert!(transport.log().connects.is_empty());
    }
}
