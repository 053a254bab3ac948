use anyhow::Result;
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub opus_bitrate: u32,
    pub voice_block_ms: u64,
    pub idle_poll_ms: u64,
    pub max_queue_size: usize,

    // Paths y herramientas externas
    pub music_dir: PathBuf,
    pub ffmpeg_path: String,
    pub tts_program: String,
}

/// Subset of [`Config`] consumed by the voice core.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Audio mixed and written per pump iteration
    pub block: Duration,
    /// Longest an idle pump sleeps before re-checking the mixer
    pub idle_poll: Duration,
    pub max_queue_size: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            block: Duration::from_millis(100),
            idle_poll: Duration::from_millis(250),
            max_queue_size: 1000,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            opus_bitrate: std::env::var("OPUS_BITRATE")
                .unwrap_or_else(|_| "96000".to_string()) // 96kbps (Discord default)
                .parse()?,
            voice_block_ms: std::env::var("VOICE_BLOCK_MS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            idle_poll_ms: std::env::var("IDLE_POLL_MS")
                .unwrap_or_else(|_| "250".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,

            // Paths
            music_dir: std::env::var("MUSIC_DIR")
                .unwrap_or_else(|_| "/app/music".to_string())
                .into(),
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            tts_program: std::env::var("TTS_PROGRAM").unwrap_or_else(|_| "espeak-ng".to_string()),
        };

        std::fs::create_dir_all(&config.music_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Opus bitrate must be within 8kbps..=510kbps (Discord limits)
    /// - The pump block must be between 20ms and 1s
    /// - The idle poll interval must be non-zero
    /// - Queue size must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.opus_bitrate > 510000 {
            anyhow::bail!("Opus bitrate cannot exceed 510kbps, got: {}", self.opus_bitrate);
        }

        if self.opus_bitrate < 8000 {
            anyhow::bail!("Opus bitrate too low, minimum 8kbps, got: {}", self.opus_bitrate);
        }

        if !(20..=1000).contains(&self.voice_block_ms) {
            anyhow::bail!("Voice block must be between 20ms and 1000ms, got: {}ms", self.voice_block_ms);
        }

        if self.idle_poll_ms == 0 {
            anyhow::bail!("Idle poll interval must be greater than 0");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        Ok(())
    }

    pub fn voice(&self) -> VoiceConfig {
        VoiceConfig {
            block: Duration::from_millis(self.voice_block_ms),
            idle_poll: Duration::from_millis(self.idle_poll_ms),
            max_queue_size: self.max_queue_size,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes sensitive information like tokens.
    pub fn summary(&self) -> String {
        let voice = self.voice();
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}kbps, {} blocks, {} idle poll\n  \
            Limits: {} queue\n  \
            Tools: ffmpeg={}, tts={}, music={}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.opus_bitrate / 1000,
            humantime::format_duration(voice.block),
            humantime::format_duration(voice.idle_poll),
            self.max_queue_size,
            self.ffmpeg_path,
            self.tts_program,
            self.music_dir.display()
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Audio defaults
            opus_bitrate: 96000, // 96kbps (Discord default)
            voice_block_ms: 100,
            idle_poll_ms: 250,
            max_queue_size: 1000,

            // Path defaults
            music_dir: "/app/music".into(),
            ffmpeg_path: "ffmpeg".to_string(),
            tts_program: "espeak-ng".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        let voice = config.voice();
        assert_eq!(voice.block, Duration::from_millis(100));
        assert_eq!(voice.idle_poll, Duration::from_millis(250));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config {
            opus_bitrate: 600_000,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config.opus_bitrate = 96_000;
        config.voice_block_ms = 5;
        assert!(config.validate().is_err());

        config.voice_block_ms = 100;
        config.max_queue_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_hides_token() {
        let config = Config {
            discord_token: "secret-token".to_string(),
            ..Config::default()
        };

        let summary = config.summary();
        assert!(!summary.contains("secret-token"));
        assert!(summary.contains("100ms"));
    }
}
