use bytes::{Buf, BytesMut};
use std::{
    process::Stdio,
    sync::{Arc, OnceLock},
};
use tempfile::NamedTempFile;
use tokio::{
    io::AsyncReadExt,
    process::{Child, ChildStdout, Command},
    sync::mpsc::{self, error::TryRecvError},
    task::JoinHandle,
};
use tracing::{debug, warn};

use super::{
    mixer::ActivitySignal,
    source::{AudioSource, SourceRead},
};
use crate::error::{VoiceError, VoiceResult};

/// Bloques en vuelo entre ffmpeg y la bomba (~1.7s a 48kHz estéreo)
const CHUNK_BUFFER: usize = 20;
const CHUNK_BYTES: usize = 16 * 1024;

/// Decoder collaborator: turns any input ffmpeg understands (file path or
/// URL) into canonical 48kHz stereo s16le PCM.
///
/// Decoding runs in its own task and feeds a bounded channel; `read` only
/// drains what is already decoded, reporting [`SourceRead::Pending`] on an
/// underrun. Once bound to a mixer, every decoded chunk wakes the pump.
/// Dropping the source aborts the task, which kills ffmpeg.
pub struct FfmpegSource {
    rx: mpsc::Receiver<Vec<i16>>,
    chunk: Vec<i16>,
    offset: usize,
    wake: Arc<OnceLock<ActivitySignal>>,
    task: Option<JoinHandle<()>>,
    // Archivo temporal que debe vivir mientras ffmpeg lo lee
    _keepalive: Option<NamedTempFile>,
}

impl FfmpegSource {
    /// Lanza `program` (normalmente `ffmpeg`) sobre `input`.
    pub fn spawn(program: &str, input: &str) -> VoiceResult<Self> {
        let mut child = Command::new(program)
            .args(["-hide_banner", "-loglevel", "error", "-i", input])
            .args(["-f", "s16le", "-ar", "48000", "-ac", "2", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VoiceError::Decoder(format!("no se pudo lanzar {}: {}", program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VoiceError::Decoder("ffmpeg sin stdout".to_string()))?;

        let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
        let mut source = Self::from_channel(rx, None);
        source.task = Some(tokio::spawn(decode(child, stdout, tx, source.wake.clone())));

        debug!("🎛️ Decodificando {}", input);
        Ok(source)
    }

    /// Keeps `file` alive for as long as the source is.
    pub fn with_keepalive(mut self, file: NamedTempFile) -> Self {
        self._keepalive = Some(file);
        self
    }

    fn from_channel(rx: mpsc::Receiver<Vec<i16>>, task: Option<JoinHandle<()>>) -> Self {
        Self {
            rx,
            chunk: Vec::new(),
            offset: 0,
            wake: Arc::new(OnceLock::new()),
            task,
            _keepalive: None,
        }
    }
}

impl AudioSource for FfmpegSource {
    fn read(&mut self, out: &mut [i16]) -> SourceRead {
        let mut written = 0;

        while written < out.len() {
            if self.offset >= self.chunk.len() {
                match self.rx.try_recv() {
                    Ok(chunk) => {
                        self.chunk = chunk;
                        self.offset = 0;
                        continue;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) if written == 0 => {
                        return SourceRead::Finished;
                    }
                    Err(TryRecvError::Disconnected) => break,
                }
            }

            let count = (out.len() - written).min(self.chunk.len() - self.offset);
            out[written..written + count]
                .copy_from_slice(&self.chunk[self.offset..self.offset + count]);
            written += count;
            self.offset += count;
        }

        if written == 0 {
            SourceRead::Pending
        } else {
            SourceRead::Ready(written)
        }
    }

    fn is_ready(&self) -> bool {
        // Un canal cerrado también cuenta: la siguiente lectura da `Finished`
        self.offset < self.chunk.len() || !self.rx.is_empty() || self.rx.is_closed()
    }

    fn bind(&mut self, activity: &ActivitySignal) {
        let _ = self.wake.set(activity.clone());
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn decode(
    mut child: Child,
    mut stdout: ChildStdout,
    tx: mpsc::Sender<Vec<i16>>,
    wake: Arc<OnceLock<ActivitySignal>>,
) {
    let mut buf = vec![0u8; CHUNK_BYTES];
    let mut pending = BytesMut::with_capacity(CHUNK_BYTES + 1);

    loop {
        let read = match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("⚠️ Error leyendo salida de ffmpeg: {}", e);
                break;
            }
        };

        pending.extend_from_slice(&buf[..read]);
        let samples = drain_samples(&mut pending);
        if samples.is_empty() {
            continue;
        }

        // El receptor se soltó: la pista fue saltada o detenida
        if tx.send(samples).await.is_err() {
            return;
        }
        if let Some(activity) = wake.get() {
            activity.notify();
        }
    }

    // El fin del flujo también es noticia para una bomba en espera
    drop(tx);
    if let Some(activity) = wake.get() {
        activity.notify();
    }

    match child.wait().await {
        Ok(status) if !status.success() => warn!("⚠️ ffmpeg terminó con {}", status),
        Err(e) => warn!("⚠️ No se pudo esperar a ffmpeg: {}", e),
        _ => {}
    }
}

/// Converts every whole little-endian sample in `pending`, keeping an odd
/// trailing byte for the next read.
fn drain_samples(pending: &mut BytesMut) -> Vec<i16> {
    let whole = pending.len() / 2 * 2;
    let mut bytes = pending.split_to(whole);

    let mut samples = Vec::with_capacity(whole / 2);
    while bytes.remaining() >= 2 {
        samples.push(bytes.get_i16_le());
    }
    samples
}
