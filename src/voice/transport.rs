use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, UserId};

use crate::error::VoiceResult;

/// Gateway/transport collaborator consumed by the voice core.
///
/// `connect` establishes a fresh session for one voice channel and fails with
/// [`VoiceError::Connection`](crate::error::VoiceError::Connection) on
/// network or permission problems.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> VoiceResult<Box<dyn VoiceSession>>;

    /// Usuarios en el canal sin contar al bot
    async fn listener_count(&self, guild_id: GuildId, channel_id: ChannelId) -> usize;

    fn bot_user_id(&self) -> UserId;
}

/// Una sesión de voz establecida que acepta PCM crudo en el formato canónico.
///
/// `write` may suspend until the transport accepts more audio; that
/// back-pressure paces the voice pump. Audio accepted by `write` is played in
/// full before `set_speaking(false)` takes effect, unless `flush` discards it
/// first.
#[async_trait]
pub trait VoiceSession: Send {
    async fn set_speaking(&mut self, speaking: bool) -> VoiceResult<()>;

    async fn write(&mut self, samples: &[i16]) -> VoiceResult<()>;

    /// Descarta el audio aceptado que todavía no sonó
    async fn flush(&mut self) -> VoiceResult<()>;

    async fn close(&mut self) -> VoiceResult<()>;
}

/// Cambio de estado de voz de un usuario, tal como lo entrega el gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipUpdate {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub before: Option<ChannelId>,
    pub after: Option<ChannelId>,
    /// Ensordecido por el servidor tras el cambio
    pub deafened: bool,
}
