use parking_lot::RwLock;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Notify;
use tracing::{debug, info};

use super::format::PcmFormat;

/// An independently controlled audio source pluggable into a [`Mixer`].
///
/// `read` is called by the voice pump on every mixed block; it writes up to
/// `out.len()` samples at the start of `out` and returns how many it wrote.
/// Samples past that count are treated as silence.
pub trait MixerChannel: Send + Sync {
    fn name(&self) -> &str;

    /// `true` mientras el canal tenga audio que aportar
    fn is_playing(&self) -> bool;

    fn read(&self, out: &mut [i16]) -> usize;
}

/// Wakes an idle pump when something becomes audible.
///
/// Backed by [`Notify::notify_one`], so a wake-up sent while the pump is busy
/// is kept as a permit and never lost. It also carries a flush request:
/// audio already handed to the transport should be discarded because the
/// item it belonged to was skipped or stopped.
#[derive(Debug, Clone, Default)]
pub struct ActivitySignal {
    notify: Arc<Notify>,
    flush: Arc<AtomicBool>,
}

impl ActivitySignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.notify.notify_one();
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    pub fn request_flush(&self) {
        self.flush.store(true, Ordering::Release);
        self.notify();
    }

    /// Consume la petición de vaciado pendiente, si la hay
    pub fn take_flush(&self) -> bool {
        self.flush.swap(false, Ordering::AcqRel)
    }

    /// Espera una notificación o hasta `timeout`, lo que ocurra primero.
    pub async fn wait(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notified()).await;
    }
}

type ChannelSet = Arc<Vec<Arc<dyn MixerChannel>>>;

/// Working memory for [`Mixer::read_into`], owned by whoever mixes
/// repeatedly so the steady-state path allocates nothing.
#[derive(Debug, Default)]
pub struct MixBuffers {
    acc: Vec<i32>,
    channel: Vec<i16>,
}

impl MixBuffers {
    pub fn with_capacity(samples: usize) -> Self {
        Self {
            acc: Vec::with_capacity(samples),
            channel: Vec::with_capacity(samples),
        }
    }

    fn prepare(&mut self, samples: usize) {
        self.acc.clear();
        self.acc.resize(samples, 0);
        self.channel.resize(samples, 0);
    }
}

/// Sums the output of every attached [`MixerChannel`] into one PCM stream.
///
/// The channel set is copy-on-write: `read` clones the current snapshot
/// under a short read lock, while `add`/`remove` publish a whole new vector.
/// A mix in progress therefore always sees a complete set.
pub struct Mixer {
    format: PcmFormat,
    channels: RwLock<ChannelSet>,
    activity: ActivitySignal,
}

impl Mixer {
    pub fn new(format: PcmFormat) -> Self {
        Self {
            format,
            channels: RwLock::new(Arc::new(Vec::new())),
            activity: ActivitySignal::new(),
        }
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Señal que despierta a la bomba de audio cuando hay actividad
    pub fn activity(&self) -> ActivitySignal {
        self.activity.clone()
    }

    /// Adjunta un canal; uno existente con el mismo nombre es reemplazado.
    pub fn add(&self, channel: Arc<dyn MixerChannel>) {
        {
            let mut guard = self.channels.write();
            let mut next: Vec<_> = guard
                .iter()
                .filter(|c| c.name() != channel.name())
                .cloned()
                .collect();
            info!("🎚️ Canal '{}' adjuntado al mezclador", channel.name());
            next.push(channel);
            *guard = Arc::new(next);
        }

        self.activity.notify();
    }

    /// Quita el canal con ese nombre. Devuelve `true` si existía.
    pub fn remove(&self, name: &str) -> bool {
        let mut guard = self.channels.write();
        if !guard.iter().any(|c| c.name() == name) {
            return false;
        }

        let next: Vec<_> = guard.iter().filter(|c| c.name() != name).cloned().collect();
        *guard = Arc::new(next);
        debug!("🎚️ Canal '{}' retirado del mezclador", name);
        true
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.snapshot().iter().map(|c| c.name().to_string()).collect()
    }

    /// `true` si al menos un canal adjunto está reproduciendo
    pub fn is_audible(&self) -> bool {
        self.snapshot().iter().any(|c| c.is_playing())
    }

    /// Mixes `frames` frames and returns exactly `frames * channels` samples.
    pub fn read(&self, frames: usize) -> Vec<i16> {
        let mut out = vec![0i16; self.format.samples_in(frames)];
        let mut buffers = MixBuffers::with_capacity(out.len());
        self.read_into(&mut out, &mut buffers);
        out
    }

    /// Mixes into `out`, which is always fully overwritten.
    ///
    /// Returns the largest number of samples any channel contributed, rounded
    /// up to whole frames; `0` when nothing contributed at all. `buffers`
    /// only grows, so a caller reusing it for same-sized blocks never
    /// reallocates.
    pub fn read_into(&self, out: &mut [i16], buffers: &mut MixBuffers) -> usize {
        let channels = self.snapshot();

        buffers.prepare(out.len());
        let MixBuffers { acc, channel: scratch } = buffers;
        let mut contributed = 0;

        for channel in channels.iter() {
            scratch.fill(0);
            let count = channel.read(scratch).min(out.len());
            if count == 0 {
                continue;
            }

            for (sum, sample) in acc[..count].iter_mut().zip(&scratch[..count]) {
                *sum += *sample as i32;
            }
            contributed = contributed.max(count);
        }

        for (sample, sum) in out.iter_mut().zip(acc.iter()) {
            *sample = (*sum).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        }

        // Redondear a tramas completas para no desalinear los canales
        let frame = self.format.channels as usize;
        (contributed.div_ceil(frame) * frame).min(out.len())
    }

    fn snapshot(&self) -> ChannelSet {
        self.channels.read().clone()
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new(PcmFormat::DISCORD)
    }
}
