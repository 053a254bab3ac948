use serenity::model::id::ChannelId;
use thiserror::Error;

/// Errores del subsistema de voz.
///
/// Skip/stop sobre una cola vacía no son errores (son no-ops), y una cola
/// sin pista actual se representa como `current() == None`.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// No se pudo establecer la sesión de voz (red, permisos, canal lleno).
    #[error("no se pudo conectar al canal de voz {channel}: {reason}")]
    Connection { channel: ChannelId, reason: String },

    /// Fallo de escritura o señalización sobre una sesión ya establecida.
    #[error("error de transporte de voz: {0}")]
    Transport(String),

    #[error("la cola '{name}' está llena (máximo {max} elementos)")]
    QueueFull { name: String, max: usize },

    /// El decodificador externo no pudo arrancar.
    #[error("error del decodificador: {0}")]
    Decoder(String),
}

pub type VoiceResult<T> = std::result::Result<T, VoiceError>;
