//! # Bot Module
//!
//! Serenity front end for the voice core.
//!
//! [`VoiceBot`] implements serenity's [`EventHandler`]:
//!
//! - `ready`: registers slash commands, per guild or globally
//! - `interaction_create`: routes slash commands to [`handlers`]
//! - `voice_state_update`: forwards membership changes to the
//!   [`GuildVoiceRegistry`](crate::voice::registry::GuildVoiceRegistry)
//!   so a connection can leave when it is alone
//! - `guild_delete`: releases everything held for a guild the bot left
//!
//! The shared [`VoiceServices`] live in the client's `TypeMap`, inserted by
//! `main` once the client (and with it the cache and bot id) exists.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, Guild, GuildId, Interaction, Ready, UnavailableGuild, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{config::Config, features::VoiceServices, voice::transport::MembershipUpdate};

pub struct VoiceBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
}

impl VoiceBot {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands propagate in about a second and are meant for
    /// development; global commands can take up to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::from(guild_id);

                // Verificar que el bot esté en la guild
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

/// Obtiene los servicios de voz del `TypeMap` del cliente
async fn voice_services(ctx: &Context) -> Result<Arc<VoiceServices>> {
    let data_read = ctx.data.read().await;
    data_read
        .get::<VoiceServices>()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Sistema de voz no está disponible"))
}

/// Traduce un cambio de estado de voz de Discord a la forma que entiende el
/// núcleo. `None` si el evento no pertenece a una guild.
fn membership_update(old: Option<&VoiceState>, new: &VoiceState) -> Option<MembershipUpdate> {
    Some(MembershipUpdate {
        guild_id: new.guild_id?,
        user_id: new.user_id,
        before: old.and_then(|state| state.channel_id),
        after: new.channel_id,
        deafened: new.deaf,
    })
}

#[async_trait]
impl EventHandler for VoiceBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command_interaction) = interaction else {
            return;
        };

        let services = match voice_services(&ctx).await {
            Ok(services) => services,
            Err(e) => {
                error!("Error manejando comando: {:?}", e);
                return;
            }
        };

        if let Err(e) = handlers::handle_command(&ctx, command_interaction, services).await {
            error!("Error manejando comando: {:?}", e);
        }
    }

    /// Forwards voice membership changes so connections can leave when alone
    /// or when the bot is disconnected or deafened from outside.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(update) = membership_update(old.as_ref(), &new) else {
            return;
        };

        match voice_services(&ctx).await {
            Ok(services) => services.registry.dispatch(&update).await,
            Err(e) => error!("Error procesando estado de voz: {:?}", e),
        }
    }

    async fn guild_delete(&self, ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // Una caída de Discord también marca la guild como no disponible
        if incomplete.unavailable {
            warn!("⚠️ Guild {} no disponible temporalmente", incomplete.id);
            return;
        }

        info!("🚪 Bot removido de guild {}", incomplete.id);
        match voice_services(&ctx).await {
            Ok(services) => services.remove_guild(incomplete.id).await,
            Err(e) => error!("Error liberando guild {}: {:?}", incomplete.id, e),
        }
    }
}

