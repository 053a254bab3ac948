use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info};

use super::{
    mixer::{ActivitySignal, MixerChannel},
    source::{AudioSource, SourceRead},
};
use crate::error::{VoiceError, VoiceResult};

/// Cómo terminó la reproducción de un elemento
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// La fuente se agotó de forma natural.
    Finished,
    Skipped,
    /// La cola se vació con `stop()` o fue destruida.
    Stopped,
}

/// One-shot signal resolved when a queued item stops playing.
///
/// Resolves exactly once, in playback order. If the owning queue is dropped
/// before the item ends, the signal resolves as [`PlaybackOutcome::Stopped`].
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<PlaybackOutcome>,
}

impl Completion {
    /// Non-blocking check, `None` while the item is still pending or playing.
    pub fn try_outcome(&mut self) -> Option<PlaybackOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(PlaybackOutcome::Stopped),
        }
    }
}

impl Future for Completion {
    type Output = PlaybackOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(PlaybackOutcome::Stopped))
    }
}

/// Eventos publicados por una cola (suscripción revocable: basta con soltar
/// el receptor)
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent<T> {
    Started(T),
    Ended { item: T, outcome: PlaybackOutcome },
}

struct Entry<T> {
    item: T,
    source: Box<dyn AudioSource>,
    done: oneshot::Sender<PlaybackOutcome>,
}

struct QueueState<T> {
    pending: VecDeque<Entry<T>>,
    current: Option<Entry<T>>,
}

/// Ordered, sequential playback queue adapted into a [`MixerChannel`].
///
/// At most one item is current at a time. `enqueue`, `skip` and `stop` only
/// touch in-memory state and return immediately; the voice pump advances the
/// current source through [`MixerChannel::read`].
pub struct QueueChannel<T> {
    name: String,
    state: Mutex<QueueState<T>>,
    activity: ActivitySignal,
    events: broadcast::Sender<QueueEvent<T>>,
    max_pending: usize,
}

impl<T> QueueChannel<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, activity: ActivitySignal, max_pending: usize) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            name: name.into(),
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                current: None,
            }),
            activity,
            events,
            max_pending,
        }
    }

    /// Agrega un elemento al final de la cola (FIFO).
    ///
    /// Si la cola estaba inactiva, el elemento pasa a reproducirse de
    /// inmediato. La señal devuelta se resuelve cuando este elemento termina,
    /// se salta o se detiene.
    pub fn enqueue(&self, item: T, mut source: impl AudioSource + 'static) -> VoiceResult<Completion> {
        let (done, rx) = oneshot::channel();
        source.bind(&self.activity);

        {
            let mut state = self.state.lock();
            if state.pending.len() >= self.max_pending {
                return Err(VoiceError::QueueFull {
                    name: self.name.clone(),
                    max: self.max_pending,
                });
            }

            state.pending.push_back(Entry {
                item,
                source: Box::new(source),
                done,
            });
            debug!("➕ Agregado a la cola '{}' ({} pendientes)", self.name, state.pending.len());

            if state.current.is_none() {
                self.promote(&mut state);
            }
        }

        self.activity.notify();
        Ok(Completion { rx })
    }

    /// Termina el elemento actual y pasa al siguiente. No-op si está inactiva.
    ///
    /// Audio of the skipped item already queued in the transport is flushed.
    pub fn skip(&self) -> bool {
        let mut state = self.state.lock();
        match state.current.take() {
            Some(entry) => {
                info!("⏭️ Saltando elemento actual en '{}'", self.name);
                self.finish(entry, PlaybackOutcome::Skipped);
                self.promote(&mut state);
                self.activity.request_flush();
                true
            }
            None => false,
        }
    }

    /// Vacía la cola y termina el elemento actual.
    ///
    /// Returns how many completion signals were resolved.
    pub fn stop(&self) -> usize {
        let mut state = self.state.lock();
        let mut resolved = 0;

        if let Some(entry) = state.current.take() {
            self.finish(entry, PlaybackOutcome::Stopped);
            self.activity.request_flush();
            resolved += 1;
        }
        while let Some(entry) = state.pending.pop_front() {
            self.finish(entry, PlaybackOutcome::Stopped);
            resolved += 1;
        }

        if resolved > 0 {
            info!("⏹️ Cola '{}' detenida ({} elementos)", self.name, resolved);
        }
        resolved
    }

    /// Copia de los elementos pendientes, sin incluir el actual
    pub fn pending(&self) -> Vec<T> {
        self.state.lock().pending.iter().map(|e| e.item.clone()).collect()
    }

    pub fn current(&self) -> Option<T> {
        self.state.lock().current.as_ref().map(|e| e.item.clone())
    }

    /// Pendientes más el actual
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.pending.len() + usize::from(state.current.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent<T>> {
        self.events.subscribe()
    }

    fn promote(&self, state: &mut QueueState<T>) {
        state.current = state.pending.pop_front();
        if let Some(entry) = &state.current {
            debug!("▶️ Nuevo elemento actual en '{}'", self.name);
            let _ = self.events.send(QueueEvent::Started(entry.item.clone()));
        }
    }

    fn finish(&self, entry: Entry<T>, outcome: PlaybackOutcome) {
        let Entry { item, source, done } = entry;
        // Soltar la fuente primero libera el decodificador
        drop(source);
        let _ = done.send(outcome);
        let _ = self.events.send(QueueEvent::Ended { item, outcome });
    }
}

impl<T> MixerChannel for QueueChannel<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    /// A current item whose source is still waiting for data is silent.
    fn is_playing(&self) -> bool {
        self.state
            .lock()
            .current
            .as_ref()
            .is_some_and(|entry| entry.source.is_ready())
    }

    fn read(&self, out: &mut [i16]) -> usize {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut written = 0;

        while written < out.len() {
            let Some(current) = state.current.as_mut() else {
                break;
            };

            match current.source.read(&mut out[written..]) {
                SourceRead::Ready(0) | SourceRead::Pending => break,
                SourceRead::Ready(count) => written += count,
                SourceRead::Finished => {
                    if let Some(entry) = state.current.take() {
                        debug!("✅ Elemento terminado en '{}'", self.name);
                        self.finish(entry, PlaybackOutcome::Finished);
                    }
                    self.promote(state);
                }
            }
        }

        written
    }
}

impl<T> fmt::Debug for QueueChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("QueueChannel")
            .field("name", &self.name)
            .field("pending", &state.pending.len())
            .field("playing", &state.current.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::PcmBuffer;
    use pretty_assertions::assert_eq;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn queue() -> QueueChannel<&'static str> {
        QueueChannel::new("music", ActivitySignal::new(), 100)
    }

    /// Fuente que aún no tiene datos la primera vez que se lee
    struct SlowStart {
        inner: PcmBuffer,
        waited: bool,
        consumed: Arc<AtomicUsize>,
    }

    impl AudioSource for SlowStart {
        fn is_ready(&self) -> bool {
            self.waited
        }

        fn read(&mut self, out: &mut [i16]) -> SourceRead {
            if !self.waited {
                self.waited = true;
                return SourceRead::Pending;
            }
            let result = self.inner.read(out);
            if let SourceRead::Ready(n) = result {
                self.consumed.fetch_add(n, Ordering::SeqCst);
            }
            result
        }
    }

    #[test]
    fn test_enqueue_promotes_in_fifo_order() {
        let q = queue();
        let mut events = q.subscribe();

        let mut a = q.enqueue("a", PcmBuffer::constant(1, 4)).unwrap();
        let mut b = q.enqueue("b", PcmBuffer::constant(2, 4)).unwrap();
        let mut c = q.enqueue("c", PcmBuffer::constant(3, 4)).unwrap();

        assert_eq!(q.current(), Some("a"));
        assert_eq!(q.pending(), vec!["b", "c"]);

        let mut out = [0i16; 16];
        assert_eq!(q.read(&mut out), 12);
        assert_eq!(&out[..12], &[1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3]);
        assert_eq!(&out[12..], &[0, 0, 0, 0]);
        assert_eq!(q.current(), None);
        assert_eq!(q.read(&mut out), 0);

        assert_eq!(a.try_outcome(), Some(PlaybackOutcome::Finished));
        assert_eq!(b.try_outcome(), Some(PlaybackOutcome::Finished));
        assert_eq!(c.try_outcome(), Some(PlaybackOutcome::Finished));

        let mut started = Vec::new();
        let mut ended = Vec::new();
        while let Ok(event) = events.try_recv() {
            match event {
                QueueEvent::Started(item) => started.push(item),
                QueueEvent::Ended { item, .. } => ended.push(item),
            }
        }
        assert_eq!(started, vec!["a", "b", "c"]);
        assert_eq!(ended, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_stop_resolves_every_signal() {
        let q = queue();
        let playing = q.enqueue("playing", PcmBuffer::constant(1, 100)).unwrap();
        let pending: Vec<_> = (0..3)
            .map(|_| q.enqueue("pending", PcmBuffer::constant(1, 100)).unwrap())
            .collect();

        assert_eq!(q.stop(), 4);
        assert!(q.is_empty());
        assert!(!q.is_playing());

        assert_eq!(playing.await, PlaybackOutcome::Stopped);
        for completion in pending {
            assert_eq!(completion.await, PlaybackOutcome::Stopped);
        }

        // Sin nada que detener es un no-op
        assert_eq!(q.stop(), 0);
    }

    #[test]
    fn test_skip_only_resolves_current() {
        let q = queue();
        let mut first = q.enqueue("first", PcmBuffer::constant(1, 100)).unwrap();
        let mut second = q.enqueue("second", PcmBuffer::constant(2, 100)).unwrap();
        let mut third = q.enqueue("third", PcmBuffer::constant(3, 100)).unwrap();

        assert!(q.skip());

        assert_eq!(first.try_outcome(), Some(PlaybackOutcome::Skipped));
        assert_eq!(second.try_outcome(), None);
        assert_eq!(third.try_outcome(), None);
        assert_eq!(q.current(), Some("second"));
        assert_eq!(q.pending(), vec!["third"]);

        let mut out = [0i16; 4];
        q.read(&mut out);
        assert_eq!(out, [2, 2, 2, 2]);
    }

    #[test]
    fn test_skip_on_idle_queue_is_noop() {
        let q = queue();
        assert!(!q.skip());
        assert_eq!(q.current(), None);
    }

    #[test]
    fn test_pending_source_contributes_silence() {
        let q = queue();
        let consumed = Arc::new(AtomicUsize::new(0));
        let mut done = q
            .enqueue(
                "slow",
                SlowStart {
                    inner: PcmBuffer::constant(9, 6),
                    waited: false,
                    consumed: consumed.clone(),
                },
            )
            .unwrap();

        let mut out = [0i16; 4];
        assert!(!q.is_playing());
        assert_eq!(q.read(&mut out), 0);
        assert!(q.is_playing());

        assert_eq!(q.read(&mut out), 4);
        assert_eq!(done.try_outcome(), None);
        assert_eq!(q.read(&mut out), 2);
        assert_eq!(consumed.load(Ordering::SeqCst), 6);
        assert_eq!(done.try_outcome(), Some(PlaybackOutcome::Finished));
    }

    #[test]
    fn test_skip_and_stop_request_a_flush() {
        let activity = ActivitySignal::new();
        let q = QueueChannel::new("music", activity.clone(), 10);

        assert!(!q.skip());
        assert_eq!(q.stop(), 0);
        assert!(!activity.take_flush());

        q.enqueue("a", PcmBuffer::constant(1, 8)).unwrap();
        q.enqueue("b", PcmBuffer::constant(1, 8)).unwrap();
        assert!(!activity.take_flush());

        assert!(q.skip());
        assert!(activity.take_flush());
        assert!(!activity.take_flush());

        assert_eq!(q.stop(), 1);
        assert!(activity.take_flush());
    }

    #[test]
    fn test_queue_full_is_rejected() {
        let q = QueueChannel::new("speech", ActivitySignal::new(), 1);
        q.enqueue("now", PcmBuffer::constant(0, 1)).unwrap();
        q.enqueue("next", PcmBuffer::constant(0, 1)).unwrap();

        let err = q.enqueue("overflow", PcmBuffer::constant(0, 1)).unwrap_err();
        assert!(matches!(err, VoiceError::QueueFull { max: 1, .. }));
    }

    #[tokio::test]
    async fn test_dropped_queue_resolves_as_stopped() {
        let q = queue();
        let completion = q.enqueue("orphan", PcmBuffer::constant(0, 10)).unwrap();
        drop(q);

        assert_eq!(completion.await, PlaybackOutcome::Stopped);
    }
}
