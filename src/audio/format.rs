use std::time::Duration;

/// Canonical PCM format shared by every stage of the voice pipeline.
///
/// Samples are interleaved signed 16-bit integers; a *frame* holds one
/// sample per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// 48kHz estéreo de 16 bits (estándar de Discord)
    pub const DISCORD: PcmFormat = PcmFormat {
        sample_rate: 48_000,
        channels: 2,
        bits_per_sample: 16,
    };

    /// Number of interleaved samples in `frames` frames.
    pub fn samples_in(&self, frames: usize) -> usize {
        frames * self.channels as usize
    }

    /// Number of whole frames covering `duration`.
    pub fn frames_for(&self, duration: Duration) -> usize {
        (self.sample_rate as u128 * duration.as_micros() / 1_000_000) as usize
    }

    /// Number of interleaved samples covering `duration`.
    pub fn samples_for(&self, duration: Duration) -> usize {
        self.samples_in(self.frames_for(duration))
    }

    /// Duración representada por `samples` muestras intercaladas.
    pub fn duration_of(&self, samples: usize) -> Duration {
        let frames = samples / self.channels as usize;
        Duration::from_micros(frames as u64 * 1_000_000 / self.sample_rate as u64)
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::DISCORD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_block_sizes_for_discord_format() {
        let format = PcmFormat::DISCORD;

        assert_eq!(format.frames_for(Duration::from_millis(100)), 4_800);
        assert_eq!(format.samples_for(Duration::from_millis(100)), 9_600);
        assert_eq!(format.duration_of(9_600), Duration::from_millis(100));
    }
}
