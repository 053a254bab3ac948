use dashmap::DashMap;
use futures::future::join_all;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{error, info};

use super::{
    connection::GuildVoiceConnection,
    transport::{MembershipUpdate, VoiceTransport},
};
use crate::config::VoiceConfig;

/// Maps each guild to its [`GuildVoiceConnection`], created on first use.
pub struct GuildVoiceRegistry {
    connections: DashMap<GuildId, Arc<GuildVoiceConnection>>,
    transport: Arc<dyn VoiceTransport>,
    config: VoiceConfig,
}

impl GuildVoiceRegistry {
    pub fn new(transport: Arc<dyn VoiceTransport>, config: VoiceConfig) -> Self {
        Self {
            connections: DashMap::new(),
            transport,
            config,
        }
    }

    /// Obtiene (o crea) la conexión de una guild
    pub fn get(&self, guild_id: GuildId) -> Arc<GuildVoiceConnection> {
        self.connections
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🆕 Conexión de voz creada para guild {}", guild_id);
                Arc::new(GuildVoiceConnection::new(
                    guild_id,
                    self.transport.clone(),
                    self.config.clone(),
                ))
            })
            .clone()
    }

    pub fn find(&self, guild_id: GuildId) -> Option<Arc<GuildVoiceConnection>> {
        self.connections.get(&guild_id).map(|c| c.clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Routes a membership change to the guild's connection, if one exists.
    pub async fn dispatch(&self, update: &MembershipUpdate) {
        let Some(connection) = self.find(update.guild_id) else {
            return;
        };

        if let Err(e) = connection.on_membership_update(update).await {
            error!("Error procesando cambio de voz en guild {}: {:?}", update.guild_id, e);
        }
    }

    /// Quita la guild (p. ej. el bot fue expulsado) y detiene su bomba.
    pub async fn remove(&self, guild_id: GuildId) {
        if let Some((_, connection)) = self.connections.remove(&guild_id) {
            if let Err(e) = connection.stop().await {
                error!("Error deteniendo voz de guild {}: {:?}", guild_id, e);
            }
            info!("🗑️ Conexión de voz eliminada para guild {}", guild_id);
        }
    }

    /// Detiene todas las bombas; usado al apagar el proceso.
    pub async fn shutdown(&self) {
        let connections: Vec<_> = self.connections.iter().map(|c| c.value().clone()).collect();

        let results = join_all(connections.iter().map(|c| c.stop())).await;
        for (connection, result) in connections.iter().zip(results) {
            if let Err(e) = result {
                error!("Error deteniendo voz de guild {}: {:?}", connection.guild_id(), e);
            }
        }

        info!("🔇 {} conexiones de voz detenidas", connections.len());
    }
}
