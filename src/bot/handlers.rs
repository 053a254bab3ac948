use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse, EditMessage,
    },
    model::{
        application::CommandInteraction,
        channel::Message,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::{future::Future, sync::Arc};
use tracing::{info, warn};

use crate::{
    audio::queue::PlaybackOutcome,
    features::{music::Track, VoiceServices},
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    services: Arc<VoiceServices>,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, guild_id, services).await?,
        "random" => handle_random(ctx, &command, guild_id, services).await?,
        "find" => handle_find(ctx, &command, &services).await?,
        "skip" => handle_skip(ctx, &command, guild_id, &services).await?,
        "stop" => handle_stop(ctx, &command, guild_id, &services).await?,
        "queue" => handle_queue(ctx, &command, guild_id, &services).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, guild_id, &services).await?,
        "leave" => handle_leave(ctx, &command, guild_id, &services).await?,
        "say" => handle_say(ctx, &command, guild_id, &services).await?,
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Comando no reconocido")
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    services: Arc<VoiceServices>,
) -> Result<()> {
    let query = string_option(command, "query")?;

    // Defer la respuesta ya que conectar y lanzar ffmpeg puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(e) => return edit_error(ctx, command, "No se puede reproducir", &e.to_string()).await,
    };

    match services.music.resolve(&query, command.user.id) {
        Ok(track) => play_track(ctx, command, guild_id, channel_id, track, services).await,
        Err(e) => edit_error(ctx, command, "Entrada no válida", &format!("{:#}", e)).await,
    }
}

async fn handle_random(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    services: Arc<VoiceServices>,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(e) => return edit_error(ctx, command, "No se puede reproducir", &e.to_string()).await,
    };

    match services.music.random(command.user.id) {
        Ok(track) => play_track(ctx, command, guild_id, channel_id, track, services).await,
        Err(e) => edit_error(ctx, command, "Biblioteca", &format!("{:#}", e)).await,
    }
}

/// Encola `track`, muestra su embed y lo recolorea cuando deje de sonar
async fn play_track(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    channel_id: ChannelId,
    track: Track,
    services: Arc<VoiceServices>,
) -> Result<()> {
    let completion = match services.music.play(guild_id, channel_id, track.clone()).await {
        Ok(completion) => completion,
        Err(e) => return edit_error(ctx, command, "Error al reproducir", &format!("{:#}", e)).await,
    };

    let position = if services.music.now_playing(guild_id).as_ref() == Some(&track) {
        0
    } else {
        services
            .music
            .pending(guild_id)
            .iter()
            .position(|t| t == &track)
            .map_or(0, |i| i + 1)
    };

    let message = command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().embed(embeds::create_track_added_embed(&track, position)),
        )
        .await?;

    recolor_when_done(ctx, message, track, completion);
    Ok(())
}

async fn handle_find(
    ctx: &Context,
    command: &CommandInteraction,
    services: &VoiceServices,
) -> Result<()> {
    let query = string_option(command, "query")?;

    match services.music.find(&query) {
        Ok(matches) if matches.is_empty() => {
            let description = format!("Nada en la biblioteca coincide con '{}'", query);
            respond(ctx, command, embeds::create_info_embed("Sin resultados", &description), true).await
        }
        Ok(matches) => respond(ctx, command, embeds::create_search_results_embed(&query, &matches), false).await,
        Err(e) => respond(ctx, command, embeds::create_error_embed("Búsqueda", &format!("{:#}", e)), true).await,
    }
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    services: &VoiceServices,
) -> Result<()> {
    if services.music.skip(guild_id) {
        respond(ctx, command, embeds::create_success_embed("Saltada", "⏭️ Pasando a la siguiente canción"), false).await
    } else {
        respond(ctx, command, embeds::create_info_embed("Nada que saltar", "No hay ninguna canción sonando"), true).await
    }
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    services: &VoiceServices,
) -> Result<()> {
    let dropped = services.music.stop(guild_id);

    if dropped == 0 {
        return respond(ctx, command, embeds::create_info_embed("Nada que detener", "La cola ya está vacía"), true).await;
    }

    let description = format!("⏹️ Se descartaron {} canciones", dropped);
    respond(ctx, command, embeds::create_success_embed("Detenido", &description), false).await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    services: &VoiceServices,
) -> Result<()> {
    let current = services.music.now_playing(guild_id);
    let pending = services.music.pending(guild_id);

    respond(ctx, command, embeds::create_queue_embed(current.as_ref(), &pending), false).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    services: &VoiceServices,
) -> Result<()> {
    let Some(watch) = services.music.watch(guild_id) else {
        return respond(ctx, command, embeds::create_info_embed("Silencio", "No hay ninguna canción sonando"), true).await;
    };

    respond(ctx, command, embeds::create_now_playing_embed(&watch.track), false).await?;
    let message = command.get_response(&ctx.http).await?;

    let track = watch.track.clone();
    recolor_when_done(ctx, message, track, watch.ended());
    Ok(())
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    services: &VoiceServices,
) -> Result<()> {
    let Some(connection) = services.registry.find(guild_id) else {
        return respond(ctx, command, embeds::create_info_embed("Sin conexión", "No estoy en un canal de voz"), true).await;
    };

    if connection.current_channel().await.is_none() {
        return respond(ctx, command, embeds::create_info_embed("Sin conexión", "No estoy en un canal de voz"), true).await;
    }

    // Vaciar las colas para que nadie quede esperando una canción que no sonará
    services.music.stop(guild_id);
    services.speech.stop(guild_id);
    connection.stop().await?;

    respond(ctx, command, embeds::create_success_embed("Desconectado", "👋 Hasta luego"), false).await
}

async fn handle_say(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    services: &VoiceServices,
) -> Result<()> {
    let text = string_option(command, "text")?;

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(channel_id) => channel_id,
        Err(e) => return edit_error(ctx, command, "No se puede hablar", &e.to_string()).await,
    };

    if let Err(e) = services.speech.say(guild_id, channel_id, &text).await {
        return edit_error(ctx, command, "Error de síntesis", &format!("{:#}", e)).await;
    }

    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new()
                .embed(embeds::create_success_embed("Mensaje en cola", &format!("🗣️ {}", text))),
        )
        .await?;

    Ok(())
}

/// Recolorea el embed de `message` cuando la canción deje de sonar
fn recolor_when_done<F>(ctx: &Context, mut message: Message, track: Track, ended: F)
where
    F: Future<Output = PlaybackOutcome> + Send + 'static,
{
    let ctx = ctx.clone();
    tokio::spawn(async move {
        let outcome = ended.await;
        let embed = embeds::create_track_finished_embed(&track, outcome);
        if let Err(e) = message.edit(&ctx, EditMessage::new().embed(embed)).await {
            warn!("⚠️ No se pudo actualizar el embed de '{}': {:?}", track.title, e);
        }
    });
}

fn string_option(command: &CommandInteraction, name: &str) -> Result<String> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
        .map(|value| value.to_string())
        .ok_or_else(|| anyhow::anyhow!("Opción '{}' no proporcionada", name))
}

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

/// Reemplaza una respuesta diferida por un embed de error
async fn edit_error(
    ctx: &Context,
    command: &CommandInteraction,
    title: &str,
    description: &str,
) -> Result<()> {
    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().embed(embeds::create_error_embed(title, description)),
        )
        .await?;

    Ok(())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}
