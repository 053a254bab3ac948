use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::{fmt, sync::Arc};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::{
    audio::queue::{QueueChannel, QueueEvent},
    voice::registry::GuildVoiceRegistry,
};

/// One named [`QueueChannel`] per guild, opened lazily on that guild's
/// connection the first time a feature asks for it.
pub struct GuildQueueCollection<T> {
    name: String,
    registry: Arc<GuildVoiceRegistry>,
    queues: DashMap<GuildId, Arc<QueueChannel<T>>>,
}

impl<T> GuildQueueCollection<T>
where
    T: Clone + fmt::Display + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, registry: Arc<GuildVoiceRegistry>) -> Self {
        Self {
            name: name.into(),
            registry,
            queues: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Arc<GuildVoiceRegistry> {
        &self.registry
    }

    /// Obtiene (o crea y adjunta al mezclador) la cola de una guild.
    ///
    /// Must be called from inside a tokio runtime: a new queue gets a task
    /// that logs its playback events.
    pub fn get(&self, guild_id: GuildId) -> Arc<QueueChannel<T>> {
        self.queues
            .entry(guild_id)
            .or_insert_with(|| {
                let queue = self.registry.get(guild_id).open_queue::<T>(&self.name);
                tokio::spawn(log_events(self.name.clone(), guild_id, queue.subscribe()));
                queue
            })
            .clone()
    }

    /// Cola existente, sin crearla
    pub fn find(&self, guild_id: GuildId) -> Option<Arc<QueueChannel<T>>> {
        self.queues.get(&guild_id).map(|q| q.clone())
    }

    /// Detiene y desacopla la cola de la guild. Devuelve cuántos elementos
    /// se descartaron.
    pub fn remove(&self, guild_id: GuildId) -> usize {
        let Some((_, queue)) = self.queues.remove(&guild_id) else {
            return 0;
        };

        if let Some(connection) = self.registry.find(guild_id) {
            connection.detach(&self.name);
        }

        let dropped = queue.stop();
        debug!("Cola '{}' de guild {} eliminada ({} descartados)", self.name, guild_id, dropped);
        dropped
    }
}

async fn log_events<T: fmt::Display + Clone>(
    name: String,
    guild_id: GuildId,
    mut events: broadcast::Receiver<QueueEvent<T>>,
) {
    loop {
        match events.recv().await {
            Ok(QueueEvent::Started(item)) => {
                info!("▶️ [{}] guild {}: {}", name, guild_id, item);
            }
            Ok(QueueEvent::Ended { item, outcome }) => {
                debug!("[{}] guild {}: {} terminó ({:?})", name, guild_id, item, outcome);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("⚠️ [{}] {} eventos de cola perdidos", name, skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}
