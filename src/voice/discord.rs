//! Transporte de producción: songbird para la voz, caché de serenity para
//! saber quién está en cada canal.

use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use parking_lot::Mutex;
use serenity::{
    cache::Cache,
    model::id::{ChannelId, GuildId, UserId},
};
use songbird::{
    driver::Bitrate,
    input::{Input, RawAdapter},
    tracks::TrackHandle,
    Songbird,
};
use std::{
    io::{self, Read, Seek, SeekFrom},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use symphonia::core::io::MediaSource;
use tokio::{
    sync::mpsc::{self, error::TryRecvError},
    time::Instant,
};
use tracing::{debug, info, warn};

use super::transport::{VoiceSession, VoiceTransport};
use crate::{
    audio::format::PcmFormat,
    error::{VoiceError, VoiceResult},
};

/// Bloques de la bomba en vuelo hacia songbird
const PIPE_BLOCKS: usize = 4;
/// Silencio inyectado cuando la bomba no entregó nada a tiempo
const UNDERRUN_SILENCE: Duration = Duration::from_millis(20);
/// Límite de espera antes de pausar con audio todavía en el tubo
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
const DRAIN_POLL: Duration = Duration::from_millis(10);
/// Cada muestra viaja a songbird como `f32`
const BYTES_PER_SAMPLE: usize = 4;

pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    cache: Arc<Cache>,
    bot_user_id: UserId,
    bitrate: u32,
    format: PcmFormat,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, cache: Arc<Cache>, bot_user_id: UserId, bitrate: u32) -> Self {
        Self {
            manager,
            cache,
            bot_user_id,
            bitrate,
            format: PcmFormat::DISCORD,
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> VoiceResult<Box<dyn VoiceSession>> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| VoiceError::Connection {
                channel: channel_id,
                reason: e.to_string(),
            })?;

        let (writer, pipe) = pcm_pipe(self.format);
        let input: Input =
            RawAdapter::new(pipe, self.format.sample_rate, self.format.channels as u32).into();

        let track = {
            let mut handler = call.lock().await;
            handler.set_bitrate(Bitrate::BitsPerSecond(self.bitrate as i32));
            handler.play_input(input)
        };
        // La pista queda en pausa hasta que la bomba empiece a hablar
        track
            .pause()
            .map_err(|e| VoiceError::Transport(e.to_string()))?;

        info!("🔊 Sesión de voz abierta en canal {} (guild {})", channel_id, guild_id);

        Ok(Box::new(SongbirdSession {
            guild_id,
            manager: self.manager.clone(),
            track,
            pipe: writer,
        }))
    }

    async fn listener_count(&self, guild_id: GuildId, channel_id: ChannelId) -> usize {
        let Some(guild) = self.cache.guild(guild_id) else {
            warn!("⚠️ Guild {} no está en caché, asumiendo oyentes", guild_id);
            return 1;
        };

        guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(channel_id) && state.user_id != self.bot_user_id)
            .count()
    }

    fn bot_user_id(&self) -> UserId {
        self.bot_user_id
    }
}

/// Sesión sobre una pista en vivo de songbird.
///
/// Speaking state maps onto pausing and resuming the track, so songbird stops
/// sending packets while the pump is idle. The track is only paused once
/// songbird has pulled every block already written.
struct SongbirdSession {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    track: TrackHandle,
    pipe: PipeWriter,
}

#[async_trait]
impl VoiceSession for SongbirdSession {
    async fn set_speaking(&mut self, speaking: bool) -> VoiceResult<()> {
        let result = if speaking {
            self.track.play()
        } else {
            if !self.pipe.drained(DRAIN_TIMEOUT).await {
                warn!(
                    "⚠️ Songbird no consumió el audio pendiente en guild {}, pausando igual",
                    self.guild_id
                );
            }
            // Songbird todavía mezcla el último paquete que tomó del tubo
            tokio::time::sleep(UNDERRUN_SILENCE).await;
            self.track.pause()
        };
        result.map_err(|e| VoiceError::Transport(e.to_string()))
    }

    async fn write(&mut self, samples: &[i16]) -> VoiceResult<()> {
        self.pipe.send(samples).await
    }

    async fn flush(&mut self) -> VoiceResult<()> {
        self.pipe.flush();
        Ok(())
    }

    async fn close(&mut self) -> VoiceResult<()> {
        // Cerrar el tubo termina la pista aunque `stop` falle
        self.pipe.close();
        let _ = self.track.stop();

        match self.manager.remove(self.guild_id).await {
            Ok(()) => {
                debug!("Sesión de voz cerrada en guild {}", self.guild_id);
                Ok(())
            }
            Err(songbird::error::JoinError::NoCall) => Ok(()),
            Err(e) => Err(VoiceError::Transport(e.to_string())),
        }
    }
}

/// Estado compartido entre la sesión y el tubo que lee songbird
struct PipeShared {
    rx: Mutex<mpsc::Receiver<Vec<i16>>>,
    /// Bytes de audio real aceptados y todavía no entregados a songbird
    in_flight: AtomicUsize,
    /// El tubo debe tirar lo que tenga a medio entregar
    discard: AtomicBool,
}

impl PipeShared {
    fn consumed(&self, bytes: usize) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(bytes)));
    }
}

/// Crea los dos extremos del tubo entre la bomba y songbird.
fn pcm_pipe(format: PcmFormat) -> (PipeWriter, PcmPipe) {
    let (tx, rx) = mpsc::channel(PIPE_BLOCKS);
    let shared = Arc::new(PipeShared {
        rx: Mutex::new(rx),
        in_flight: AtomicUsize::new(0),
        discard: AtomicBool::new(false),
    });

    let writer = PipeWriter {
        tx: Some(tx),
        shared: shared.clone(),
    };
    let pipe = PcmPipe {
        shared,
        pending: BytesMut::new(),
        pending_real: false,
        silence_samples: format.samples_for(UNDERRUN_SILENCE),
    };
    (writer, pipe)
}

/// Pump side of the pipe. Tracks how much accepted audio songbird has not
/// pulled yet.
struct PipeWriter {
    tx: Option<mpsc::Sender<Vec<i16>>>,
    shared: Arc<PipeShared>,
}

impl PipeWriter {
    async fn send(&self, samples: &[i16]) -> VoiceResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| VoiceError::Transport("sesión cerrada".to_string()))?;

        // Contar antes de enviar: songbird puede tomar el bloque enseguida
        let bytes = samples.len() * BYTES_PER_SAMPLE;
        self.shared.in_flight.fetch_add(bytes, Ordering::AcqRel);

        if tx.send(samples.to_vec()).await.is_err() {
            self.shared.consumed(bytes);
            return Err(VoiceError::Transport("songbird dejó de leer la pista".to_string()));
        }
        Ok(())
    }

    /// Espera a que songbird haya tomado todo el audio aceptado. `false` si
    /// se agotó `timeout` antes.
    async fn drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        while self.shared.in_flight.load(Ordering::Acquire) > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
        true
    }

    /// Tira los bloques encolados y lo que el tubo tenga a medio entregar.
    fn flush(&self) {
        let mut rx = self.shared.rx.lock();
        let mut dropped = 0;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        self.shared.discard.store(true, Ordering::Release);
        self.shared.in_flight.store(0, Ordering::Release);

        if dropped > 0 {
            debug!("🧹 {} bloques descartados del tubo de voz", dropped);
        }
    }

    fn close(&mut self) {
        self.tx.take();
    }
}

/// Live byte stream handed to songbird: interleaved little-endian `f32`
/// samples converted from the pump's `i16` blocks.
///
/// Never blocks. On an underrun it emits a short run of silence, and it
/// reports end-of-stream once the session drops its sender.
struct PcmPipe {
    shared: Arc<PipeShared>,
    pending: BytesMut,
    /// `pending` holds pump audio rather than underrun silence
    pending_real: bool,
    silence_samples: usize,
}

impl PcmPipe {
    fn refill(&mut self) -> bool {
        let next = self.shared.rx.lock().try_recv();
        let (samples, real) = match next {
            Ok(samples) => (samples, true),
            Err(TryRecvError::Empty) => (vec![0; self.silence_samples], false),
            Err(TryRecvError::Disconnected) => return false,
        };

        self.pending.reserve(samples.len() * BYTES_PER_SAMPLE);
        for sample in samples {
            self.pending.put_f32_le(sample as f32 / 32768.0);
        }
        self.pending_real = real;
        true
    }
}

impl Read for PcmPipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.shared.discard.swap(false, Ordering::AcqRel) {
            self.pending.clear();
        }
        if self.pending.is_empty() && !self.refill() {
            return Ok(0);
        }

        let count = buf.len().min(self.pending.len());
        buf[..count].copy_from_slice(&self.pending[..count]);
        self.pending.advance(count);
        if self.pending_real {
            self.shared.consumed(count);
        }
        Ok(count)
    }
}

impl Seek for PcmPipe {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "la transmisión de voz no admite seek",
        ))
    }
}

impl MediaSource for PcmPipe {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}
