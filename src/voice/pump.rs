use serenity::model::id::{ChannelId, GuildId};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::transport::VoiceSession;
use crate::{
    audio::mixer::{ActivitySignal, MixBuffers, Mixer},
    config::VoiceConfig,
    error::VoiceResult,
};

/// Estados de la bomba de audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Starting,
    /// Conectada, nada audible
    Idle,
    Speaking,
    Stopped,
}

/// Por qué terminó la tarea de la bomba
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpExit {
    Cancelled,
    /// Fallo del transporte (o pánico); no se reintenta.
    Failed(String),
}

/// Dedicated task draining a guild's [`Mixer`] into one voice session.
///
/// Exactly one is live per connection. Teardown (`flush`, `set_speaking(false)`
/// then `close()`) runs before the task exits whatever the reason it stops.
pub struct VoicePump {
    channel_id: ChannelId,
    cancel: CancellationToken,
    task: JoinHandle<PumpExit>,
    speaking: Arc<AtomicBool>,
}

impl VoicePump {
    pub fn start(
        guild_id: GuildId,
        channel_id: ChannelId,
        session: Box<dyn VoiceSession>,
        mixer: Arc<Mixer>,
        config: &VoiceConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let speaking = Arc::new(AtomicBool::new(false));

        let worker = PumpWorker {
            guild_id,
            channel_id,
            session,
            mixer,
            config: config.clone(),
            cancel: cancel.clone(),
            speaking: speaking.clone(),
            state: PumpState::Starting,
        };

        info!("🔊 Bomba de audio iniciada en canal {} (guild {})", channel_id, guild_id);

        Self {
            channel_id,
            cancel,
            task: tokio::spawn(worker.run()),
            speaking,
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// `false` una vez que la tarea terminó, por cancelación o por fallo
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire)
    }

    /// Cancels the loop and waits until the task has fully terminated.
    pub async fn stop(self) -> PumpExit {
        self.cancel.cancel();

        match self.task.await {
            Ok(exit) => exit,
            Err(e) => {
                error!("❌ La tarea de la bomba en canal {} falló: {}", self.channel_id, e);
                PumpExit::Failed(e.to_string())
            }
        }
    }
}

struct PumpWorker {
    guild_id: GuildId,
    channel_id: ChannelId,
    session: Box<dyn VoiceSession>,
    mixer: Arc<Mixer>,
    config: VoiceConfig,
    cancel: CancellationToken,
    speaking: Arc<AtomicBool>,
    state: PumpState,
}

impl PumpWorker {
    async fn run(mut self) -> PumpExit {
        let result = self.pump().await;

        // Teardown: siempre, sin importar por qué se detiene
        if let Err(e) = self.session.flush().await {
            warn!("⚠️ No se pudo descartar el audio en vuelo: {}", e);
        }
        if let Err(e) = self.session.set_speaking(false).await {
            warn!("⚠️ No se pudo limpiar el estado de habla: {}", e);
        }
        self.speaking.store(false, Ordering::Release);
        if let Err(e) = self.session.close().await {
            warn!("⚠️ Error cerrando la sesión de voz: {}", e);
        }
        self.state = PumpState::Stopped;

        match result {
            Ok(()) => {
                info!("🔇 Bomba de audio detenida en canal {} (guild {})", self.channel_id, self.guild_id);
                PumpExit::Cancelled
            }
            Err(e) => {
                error!(
                    "❌ Bomba de audio terminada por error en canal {} (guild {}): {}",
                    self.channel_id, self.guild_id, e
                );
                PumpExit::Failed(e.to_string())
            }
        }
    }

    async fn pump(&mut self) -> VoiceResult<()> {
        let activity = self.mixer.activity();
        let mut block = vec![0i16; self.mixer.format().samples_for(self.config.block)];
        let mut buffers = MixBuffers::with_capacity(block.len());
        self.state = PumpState::Idle;

        loop {
            // Esperar actividad sin consumir CPU
            if self.state != PumpState::Speaking {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Ok(()),
                    _ = activity.wait(self.config.idle_poll) => {}
                }
            }

            if self.cancel.is_cancelled() {
                return Ok(());
            }

            // Antes de callar: el silencio no debe esperar a audio descartado
            self.flush_if_requested(&activity).await?;

            let next = if self.mixer.is_audible() {
                PumpState::Speaking
            } else {
                PumpState::Idle
            };
            self.transition(next).await?;

            if self.state != PumpState::Speaking {
                continue;
            }

            let mixed = self.mixer.read_into(&mut block, &mut buffers);
            self.flush_if_requested(&activity).await?;

            if mixed == 0 {
                // Fin implícito del audio, no es un error
                self.transition(PumpState::Idle).await?;
                continue;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                result = self.session.write(&block[..mixed]) => result?,
            }
        }
    }

    /// Lo que quedó en el transporte pertenece a un elemento saltado o
    /// detenido.
    async fn flush_if_requested(&mut self, activity: &ActivitySignal) -> VoiceResult<()> {
        if activity.take_flush() {
            debug!("🧹 Vaciando audio en vuelo en canal {}", self.channel_id);
            self.session.flush().await?;
        }
        Ok(())
    }

    /// Notifica al transporte solo cuando el estado de habla cambia.
    async fn transition(&mut self, next: PumpState) -> VoiceResult<()> {
        if next == self.state {
            return Ok(());
        }

        let speaking = next == PumpState::Speaking;
        self.session.set_speaking(speaking).await?;
        self.speaking.store(speaking, Ordering::Release);

        debug!("📡 Bomba {:?} -> {:?} en canal {}", self.state, next, self.channel_id);
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            mixer::tests::ConstantChannel,
            queue::{PlaybackOutcome, QueueChannel},
            source::{AudioSource, PcmBuffer, SourceRead},
        },
        voice::testing::{test_config, FakeTransport},
    };
    use crate::voice::transport::VoiceTransport;
    use pretty_assertions::assert_eq;
    use std::time::{Duration, Instant};

    const GUILD: GuildId = GuildId::new(1);
    const CHANNEL: ChannelId = ChannelId::new(10);

    /// Fuente sin datos hasta que se abre la compuerta, como un ffmpeg que
    /// todavía está arrancando
    struct GatedSource {
        open: Arc<AtomicBool>,
        inner: PcmBuffer,
    }

    impl AudioSource for GatedSource {
        fn is_ready(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn read(&mut self, out: &mut [i16]) -> SourceRead {
            if !self.is_ready() {
                return SourceRead::Pending;
            }
            self.inner.read(out)
        }
    }

    async fn start_pump(transport: &FakeTransport, mixer: Arc<Mixer>) -> VoicePump {
        let session = transport.connect(GUILD, CHANNEL).await.unwrap();
        VoicePump::start(GUILD, CHANNEL, session, mixer, &test_config())
    }

    #[tokio::test]
    async fn test_idle_pump_writes_nothing_and_tears_down() {
        let transport = FakeTransport::new();
        let pump = start_pump(&transport, Arc::new(Mixer::default())).await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(pump.is_running());
        assert!(!pump.is_speaking());

        assert_eq!(pump.stop().await, PumpExit::Cancelled);

        let log = transport.log();
        assert_eq!(log.writes, 0);
        assert_eq!(log.speaking, vec![false]);
        assert_eq!(log.closes, 1);
    }

    #[tokio::test]
    async fn test_speaks_while_audible_and_returns_to_idle() {
        let transport = FakeTransport::new();
        let mixer = Arc::new(Mixer::default());
        let queue = Arc::new(QueueChannel::new("music", mixer.activity(), 10));
        mixer.add(queue.clone());

        let pump = start_pump(&transport, mixer.clone()).await;

        let samples = mixer.format().samples_for(Duration::from_millis(30));
        let done = queue.enqueue("short", PcmBuffer::constant(100, samples)).unwrap();
        assert_eq!(done.await, PlaybackOutcome::Finished);

        // Dar tiempo a que la bomba note el silencio
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!pump.is_speaking());

        pump.stop().await;
        let log = transport.log();
        assert_eq!(log.samples_written, samples);
        assert_eq!(log.speaking, vec![true, false, false]);
        assert_eq!(log.closes, 1);
    }

    #[tokio::test]
    async fn test_completion_waits_for_consumed_audio() {
        let transport = FakeTransport::paced();
        let mixer = Arc::new(Mixer::default());
        let queue = Arc::new(QueueChannel::new("music", mixer.activity(), 10));
        mixer.add(queue.clone());
        let pump = start_pump(&transport, mixer.clone()).await;

        let track = Duration::from_millis(300);
        let samples = mixer.format().samples_for(track);
        let started = Instant::now();
        let done = queue.enqueue("track", PcmBuffer::constant(1, samples)).unwrap();

        assert_eq!(done.await, PlaybackOutcome::Finished);
        assert!(started.elapsed() >= track);
        assert!(transport.log().samples_written >= samples - mixer.format().samples_for(test_config().block));

        pump.stop().await;
    }

    #[tokio::test]
    async fn test_waiting_source_keeps_transport_quiet() {
        let transport = FakeTransport::new();
        let mixer = Arc::new(Mixer::default());
        let queue = Arc::new(QueueChannel::new("music", mixer.activity(), 10));
        mixer.add(queue.clone());
        let pump = start_pump(&transport, mixer.clone()).await;

        let open = Arc::new(AtomicBool::new(false));
        let samples = mixer.format().samples_for(Duration::from_millis(30));
        let done = queue
            .enqueue(
                "late",
                GatedSource {
                    open: open.clone(),
                    inner: PcmBuffer::constant(7, samples),
                },
            )
            .unwrap();

        // Varios sondeos pasan sin que el decodificador entregue nada
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!pump.is_speaking());
        let log = transport.log();
        assert!(log.speaking.is_empty());
        assert_eq!(log.writes, 0);

        open.store(true, Ordering::SeqCst);
        mixer.activity().notify();
        assert_eq!(done.await, PlaybackOutcome::Finished);
        tokio::time::sleep(Duration::from_millis(80)).await;

        let log = transport.log();
        assert_eq!(log.speaking, vec![true, false]);
        assert!(log.writes > 0);
        assert_eq!(log.samples_written, samples);

        pump.stop().await;
    }

    #[tokio::test]
    async fn test_skip_flushes_audio_in_flight() {
        let transport = FakeTransport::paced();
        let mixer = Arc::new(Mixer::default());
        let queue = Arc::new(QueueChannel::new("music", mixer.activity(), 10));
        mixer.add(queue.clone());
        let pump = start_pump(&transport, mixer.clone()).await;

        let samples = mixer.format().samples_for(Duration::from_secs(2));
        let first = queue.enqueue("first", PcmBuffer::constant(1, samples)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.log().flushes, 0);

        assert!(queue.skip());
        assert_eq!(first.await, PlaybackOutcome::Skipped);
        tokio::time::sleep(Duration::from_millis(60)).await;

        let log = transport.log();
        assert_eq!(log.flushes, 1);
        assert_eq!(log.speaking, vec![true, false]);

        pump.stop().await;
        assert_eq!(transport.log().closes, 1);
    }

    #[tokio::test]
    async fn test_write_failure_terminates_pump() {
        let transport = FakeTransport::new();
        transport.fail_writes(true);
        let mixer = Arc::new(Mixer::default());
        mixer.add(ConstantChannel::new("tone", 5));

        let pump = start_pump(&transport, mixer).await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(!pump.is_running());
        assert!(matches!(pump.stop().await, PumpExit::Failed(_)));

        let log = transport.log();
        assert_eq!(log.closes, 1);
        assert_eq!(log.speaking.last(), Some(&false));
    }
}
