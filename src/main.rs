use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

use guild_voice::{
    bot::VoiceBot,
    config::Config,
    features::VoiceServices,
    voice::{discord::SongbirdTransport, registry::GuildVoiceRegistry},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_voice=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎧 Iniciando Guild Voice v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("{}", config.summary());

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES;

    // Construir cliente
    let songbird = Songbird::serenity();
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(VoiceBot::new(config.clone()))
        .register_songbird_with(songbird.clone())
        .await?;

    // El transporte necesita la caché y el ID del bot, que existen solo
    // después de construir el cliente
    let bot_user_id = client.http.get_current_user().await?.id;
    let transport = Arc::new(SongbirdTransport::new(
        songbird,
        client.cache.clone(),
        bot_user_id,
        config.opus_bitrate,
    ));
    let registry = Arc::new(GuildVoiceRegistry::new(transport, config.voice()));
    let services = Arc::new(VoiceServices::new(registry.clone(), &config));

    {
        let mut data = client.data.write().await;
        data.insert::<VoiceServices>(services);
    }
    info!("🔊 Sistema de voz inicializado");

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        registry.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // ffmpeg es obligatorio; el TTS solo afecta a /say
    let ffmpeg = async_process::Command::new(&config.ffmpeg_path)
        .arg("-version")
        .output()
        .await?;

    if !ffmpeg.status.success() {
        anyhow::bail!("Dependencias faltantes: {}", config.ffmpeg_path);
    }

    match async_process::Command::new(&config.tts_program)
        .arg("--version")
        .output()
        .await
    {
        Ok(output) if output.status.success() => {}
        _ => warn!("⚠️ {} no disponible, /say no funcionará", config.tts_program),
    }

    println!("OK");
    Ok(())
}
