use std::sync::Arc;

use super::mixer::ActivitySignal;

/// Resultado de una lectura sobre una fuente decodificada
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRead {
    /// `n > 0` muestras escritas al inicio del buffer.
    Ready(usize),
    /// Todavía no hay datos (el decodificador va por detrás); no es el final.
    Pending,
    /// La fuente se agotó; no producirá más muestras.
    Finished,
}

/// Decoded PCM producer backing one queued item.
///
/// Samples are in the canonical [`PcmFormat`](super::format::PcmFormat).
/// Implementations must never block: `read` is called from the voice pump
/// while it mixes. Dropping a source abandons it early without error.
pub trait AudioSource: Send {
    fn read(&mut self, out: &mut [i16]) -> SourceRead;

    /// `false` while a `read` would only return [`SourceRead::Pending`].
    ///
    /// A source reporting `true` must have samples buffered or be finished.
    fn is_ready(&self) -> bool {
        true
    }

    /// Hands the source the signal of the mixer it will play on, so it can
    /// wake the pump once data arrives after an underrun.
    fn bind(&mut self, _activity: &ActivitySignal) {}
}

/// Fuente en memoria, usada para efectos cortos y audio ya decodificado.
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    samples: Arc<[i16]>,
    position: usize,
}

impl PcmBuffer {
    pub fn new(samples: impl Into<Arc<[i16]>>) -> Self {
        Self {
            samples: samples.into(),
            position: 0,
        }
    }

    /// `samples` muestras intercaladas con el mismo valor.
    pub fn constant(value: i16, samples: usize) -> Self {
        Self::new(vec![value; samples])
    }

    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl AudioSource for PcmBuffer {
    fn read(&mut self, out: &mut [i16]) -> SourceRead {
        let count = out.len().min(self.remaining());
        if count == 0 {
            return if self.remaining() == 0 {
                SourceRead::Finished
            } else {
                SourceRead::Ready(0)
            };
        }

        out[..count].copy_from_slice(&self.samples[self.position..self.position + count]);
        self.position += count;
        SourceRead::Ready(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pcm_buffer_reads_until_finished() {
        let mut source = PcmBuffer::new(vec![1, 2, 3, 4, 5]);
        let mut out = [0i16; 3];

        assert_eq!(source.read(&mut out), SourceRead::Ready(3));
        assert_eq!(out, [1, 2, 3]);
        assert_eq!(source.read(&mut out), SourceRead::Ready(2));
        assert_eq!(&out[..2], &[4, 5]);
        assert_eq!(source.read(&mut out), SourceRead::Finished);
    }
}
