use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    fmt,
    path::{Component, Path, PathBuf},
    sync::Arc,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info};
use url::Url;

use super::collection::GuildQueueCollection;
use crate::{
    audio::{
        ffmpeg::FfmpegSource,
        queue::{Completion, PlaybackOutcome, QueueChannel, QueueEvent},
        source::AudioSource,
    },
    voice::registry::GuildVoiceRegistry,
};

/// Nombre del canal de música en el mezclador
pub const MUSIC_QUEUE: &str = "music";

/// Palabra que `/play` interpreta como "cualquier canción"
const RANDOM_QUERY: &str = "random";

/// A queued song: what to decode and who asked for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub title: String,
    /// URL http(s) o ruta absoluta dentro del directorio de música
    pub input: String,
    pub requested_by: UserId,
    pub added_at: DateTime<Utc>,
}

impl Track {
    pub fn is_remote(&self) -> bool {
        self.input.starts_with("http://") || self.input.starts_with("https://")
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

pub struct MusicService {
    queues: GuildQueueCollection<Track>,
    music_dir: PathBuf,
    ffmpeg: String,
}

impl MusicService {
    pub fn new(registry: Arc<GuildVoiceRegistry>, music_dir: PathBuf, ffmpeg: String) -> Self {
        Self {
            queues: GuildQueueCollection::new(MUSIC_QUEUE, registry),
            music_dir,
            ffmpeg,
        }
    }

    /// Turns a `/play` query into a [`Track`].
    ///
    /// `http(s)` URLs are passed through to the decoder. `random` picks any
    /// file of the library. Anything else must be a plain file name: an exact
    /// match inside the music directory wins, otherwise it is searched as a
    /// title and one of the matches is picked at random.
    pub fn resolve(&self, query: &str, requested_by: UserId) -> Result<Track> {
        let query = query.trim();
        if query.is_empty() {
            anyhow::bail!("Debes indicar una URL o un archivo");
        }

        if let Ok(url) = Url::parse(query) {
            if matches!(url.scheme(), "http" | "https") {
                return Ok(Track {
                    title: title_from_url(&url),
                    input: url.to_string(),
                    requested_by,
                    added_at: Utc::now(),
                });
            }
        }

        if query.eq_ignore_ascii_case(RANDOM_QUERY) {
            return self.random(requested_by);
        }

        if !is_plain_file_name(query) {
            anyhow::bail!("'{}' no es un nombre de archivo válido", query);
        }
        if let Some(path) = self.local_file(query)? {
            return Ok(local_track(path, requested_by));
        }

        let matches = self.find(query)?;
        let name = matches
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| anyhow::anyhow!("No se encontró '{}' en la biblioteca", query))?;
        debug!("🔍 '{}' coincide con {} archivos, elegido '{}'", query, matches.len(), name);
        Ok(local_track(self.music_dir.join(name), requested_by))
    }

    /// Any file of the music directory.
    pub fn random(&self, requested_by: UserId) -> Result<Track> {
        let library = self.library()?;
        let name = library
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| anyhow::anyhow!("La biblioteca de música está vacía"))?;

        Ok(local_track(self.music_dir.join(name), requested_by))
    }

    /// File names of the library whose name contains `query`, ignoring case,
    /// in alphabetical order.
    pub fn find(&self, query: &str) -> Result<Vec<String>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            anyhow::bail!("Debes indicar qué buscar");
        }

        Ok(self
            .library()?
            .into_iter()
            .filter(|name| name.to_lowercase().contains(&needle))
            .collect())
    }

    /// Moves into `channel_id` and queues `track` behind whatever is playing.
    pub async fn play(&self, guild_id: GuildId, channel_id: ChannelId, track: Track) -> Result<Completion> {
        self.registry()
            .get(guild_id)
            .move_to(Some(channel_id))
            .await?;

        let source = FfmpegSource::spawn(&self.ffmpeg, &track.input)?;
        self.enqueue(guild_id, track, source)
    }

    fn enqueue(&self, guild_id: GuildId, track: Track, source: impl AudioSource + 'static) -> Result<Completion> {
        let title = track.title.clone();
        let completion = self.queues.get(guild_id).enqueue(track, source)?;
        info!("🎵 '{}' agregada a la cola de guild {}", title, guild_id);
        Ok(completion)
    }

    pub fn skip(&self, guild_id: GuildId) -> bool {
        self.queues.find(guild_id).is_some_and(|q| q.skip())
    }

    pub fn stop(&self, guild_id: GuildId) -> usize {
        self.queues.find(guild_id).map_or(0, |q| q.stop())
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Option<Track> {
        self.queues.find(guild_id).and_then(|q| q.current())
    }

    pub fn pending(&self, guild_id: GuildId) -> Vec<Track> {
        self.queues.find(guild_id).map(|q| q.pending()).unwrap_or_default()
    }

    /// The current track together with a way to wait for it to end.
    pub fn watch(&self, guild_id: GuildId) -> Option<TrackWatch> {
        let queue = self.queues.find(guild_id)?;
        // Suscribirse antes de leer el actual para no perder su final
        let events = queue.subscribe();
        let track = queue.current()?;

        Some(TrackWatch { track, queue, events })
    }

    pub fn remove(&self, guild_id: GuildId) -> usize {
        self.queues.remove(guild_id)
    }

    fn registry(&self) -> &Arc<GuildVoiceRegistry> {
        self.queues.registry()
    }

    /// `None` si no existe un archivo con ese nombre exacto
    fn local_file(&self, name: &str) -> Result<Option<PathBuf>> {
        let path = self.music_dir.join(name);
        match std::fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => Ok(Some(path)),
            Ok(_) => anyhow::bail!("'{}' no es un archivo", name),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("No se pudo leer '{}'", name)),
        }
    }

    /// Archivos visibles del directorio de música, ordenados por nombre
    fn library(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.music_dir)
            .with_context(|| format!("No se pudo leer {}", self.music_dir.display()))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }
}

/// Espera el final de la canción que sonaba al crear el `TrackWatch`.
pub struct TrackWatch {
    pub track: Track,
    queue: Arc<QueueChannel<Track>>,
    events: broadcast::Receiver<QueueEvent<Track>>,
}

impl TrackWatch {
    pub async fn ended(mut self) -> PlaybackOutcome {
        loop {
            match self.events.recv().await {
                Ok(QueueEvent::Ended { item, outcome }) if item == self.track => return outcome,
                Ok(_) => continue,
                // Se perdieron eventos; si ya no suena, terminó
                Err(RecvError::Lagged(_)) if self.queue.current().as_ref() != Some(&self.track) => {
                    return PlaybackOutcome::Finished;
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return PlaybackOutcome::Stopped,
            }
        }
    }
}

/// Solo un nombre de archivo, sin rutas ni `..`
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}

fn local_track(path: PathBuf, requested_by: UserId) -> Track {
    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    Track {
        title,
        input: path.to_string_lossy().into_owned(),
        requested_by,
        added_at: Utc::now(),
    }
}

fn title_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_string())
        .or_else(|| url.host_str().map(|host| host.to_string()))
        .unwrap_or_else(|| url.to_string())
}
