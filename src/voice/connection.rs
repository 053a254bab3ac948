use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    pump::{PumpExit, VoicePump},
    transport::{MembershipUpdate, VoiceTransport},
};
use crate::{
    audio::{
        mixer::{Mixer, MixerChannel},
        queue::QueueChannel,
    },
    config::VoiceConfig,
    error::VoiceResult,
};

/// A guild's voice presence: which channel it is in, the single live
/// [`VoicePump`] and the [`Mixer`] shared by every feature queue.
///
/// The mixer lives as long as the connection. The pump slot sits behind an
/// async mutex held for the whole of [`move_to`](Self::move_to), so two moves
/// on the same guild never overlap and two pumps never run at once.
pub struct GuildVoiceConnection {
    guild_id: GuildId,
    mixer: Arc<Mixer>,
    transport: Arc<dyn VoiceTransport>,
    pump: Mutex<Option<VoicePump>>,
    config: VoiceConfig,
}

impl GuildVoiceConnection {
    pub fn new(guild_id: GuildId, transport: Arc<dyn VoiceTransport>, config: VoiceConfig) -> Self {
        Self {
            guild_id,
            mixer: Arc::new(Mixer::default()),
            transport,
            pump: Mutex::new(None),
            config,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    /// Canal con una bomba viva; `None` si no hay bomba o si terminó por error
    pub async fn current_channel(&self) -> Option<ChannelId> {
        self.pump
            .lock()
            .await
            .as_ref()
            .filter(|pump| pump.is_running())
            .map(|pump| pump.channel_id())
    }

    pub async fn is_speaking(&self) -> bool {
        self.pump
            .lock()
            .await
            .as_ref()
            .is_some_and(|pump| pump.is_speaking())
    }

    /// Moves this guild's voice presence to `target`, or disconnects on `None`.
    ///
    /// No-op when already live in `target`. Otherwise the old pump is stopped
    /// and fully joined before a new session is connected. A connect failure
    /// is returned and leaves the connection with no pump.
    pub async fn move_to(&self, target: Option<ChannelId>) -> VoiceResult<()> {
        let mut slot = self.pump.lock().await;

        let live = slot
            .as_ref()
            .filter(|pump| pump.is_running())
            .map(|pump| pump.channel_id());

        if live == target && (target.is_some() || slot.is_none()) {
            debug!("Guild {} ya está en {:?}", self.guild_id, target);
            return Ok(());
        }

        // Cerrar la bomba actual (o recoger una que ya terminó)
        if let Some(old) = slot.take() {
            let channel = old.channel_id();
            match old.stop().await {
                PumpExit::Cancelled => debug!("Bomba del canal {} cerrada", channel),
                PumpExit::Failed(reason) => {
                    warn!("⚠️ La bomba anterior del canal {} había fallado: {}", channel, reason)
                }
            }
        }

        let Some(channel) = target else {
            info!("👋 Guild {} desconectada de voz", self.guild_id);
            return Ok(());
        };

        let session = self.transport.connect(self.guild_id, channel).await?;
        *slot = Some(VoicePump::start(
            self.guild_id,
            channel,
            session,
            self.mixer.clone(),
            &self.config,
        ));

        info!("🔊 Guild {} conectada al canal {}", self.guild_id, channel);
        Ok(())
    }

    pub async fn stop(&self) -> VoiceResult<()> {
        self.move_to(None).await
    }

    /// Adjunta un canal al mezclador de esta guild.
    pub fn attach(&self, channel: Arc<dyn MixerChannel>) {
        self.mixer.add(channel);
    }

    pub fn detach(&self, name: &str) -> bool {
        self.mixer.remove(name)
    }

    /// Creates a playback queue named `name` and attaches it to the mixer.
    pub fn open_queue<T>(&self, name: &str) -> Arc<QueueChannel<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let queue = Arc::new(QueueChannel::new(
            name,
            self.mixer.activity(),
            self.config.max_queue_size,
        ));
        self.attach(queue.clone());
        queue
    }

    /// Reacts to a voice membership change in this guild.
    ///
    /// Leaves when the bot is alone in its channel, or when the bot itself was
    /// disconnected or server-deafened from outside. All paths go through
    /// [`stop`](Self::stop).
    pub async fn on_membership_update(&self, update: &MembershipUpdate) -> VoiceResult<()> {
        // Ignorar si el bot no está en un canal
        let Some(channel) = self.current_channel().await else {
            return Ok(());
        };

        // Ignorar eventos de otros canales
        if update.before != Some(channel) {
            return Ok(());
        }

        if update.user_id == self.transport.bot_user_id() {
            if update.after.is_none() || update.deafened {
                info!("🔌 Bot desconectado o ensordecido en guild {}", self.guild_id);
                return self.stop().await;
            }
            return Ok(());
        }

        // Si quedan otros usuarios, seguir en el canal
        let listeners = self.transport.listener_count(self.guild_id, channel).await;
        if listeners > 0 {
            return Ok(());
        }

        info!("🚪 Nadie escucha en el canal {}, desconectando guild {}", channel, self.guild_id);
        self.stop().await
    }
}
