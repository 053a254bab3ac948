use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

use crate::features::speech::MAX_SPEECH_CHARS;

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        random_command(),
        find_command(),
        skip_command(),
        stop_command(),
        queue_command(),
        nowplaying_command(),
        leave_command(),
        say_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una URL o un archivo de la biblioteca")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL http(s) o nombre de archivo",
            )
            .required(true),
        )
}

fn random_command() -> CreateCommand {
    CreateCommand::new("random").description("Reproduce una canción al azar de la biblioteca")
}

fn find_command() -> CreateCommand {
    CreateCommand::new("find")
        .description("Busca canciones en la biblioteca por título")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "Parte del título")
                .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta la canción actual")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la música y vacía la cola")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Muestra la cola de reproducción")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra la canción actual")
}

// Comandos de voz

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}

fn say_command() -> CreateCommand {
    CreateCommand::new("say")
        .description("Dice un mensaje en el canal de voz")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "text", "Texto a decir")
                .required(true)
                .max_length(MAX_SPEECH_CHARS as u16),
        )
}
