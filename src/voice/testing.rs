//! Transporte falso que registra todo lo que la bomba le envía.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use super::transport::{VoiceSession, VoiceTransport};
use crate::{
    audio::format::PcmFormat,
    config::VoiceConfig,
    error::{VoiceError, VoiceResult},
};

pub const BOT: UserId = UserId::new(999);

/// Bloques y sondeo cortos para que las pruebas sean rápidas
pub fn test_config() -> VoiceConfig {
    VoiceConfig {
        block: Duration::from_millis(10),
        idle_poll: Duration::from_millis(20),
        max_queue_size: 100,
    }
}

#[derive(Debug, Default, Clone)]
pub struct TransportLog {
    pub connects: Vec<ChannelId>,
    pub speaking: Vec<bool>,
    pub writes: usize,
    pub samples_written: usize,
    pub flushes: usize,
    pub closes: usize,
    pub active_sessions: usize,
    pub max_active_sessions: usize,
}

pub struct FakeTransport {
    log: Arc<Mutex<TransportLog>>,
    listeners: Mutex<HashMap<ChannelId, usize>>,
    fail_connect: AtomicBool,
    fail_writes: Arc<AtomicBool>,
    paced: bool,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(TransportLog::default())),
            listeners: Mutex::new(HashMap::new()),
            fail_connect: AtomicBool::new(false),
            fail_writes: Arc::new(AtomicBool::new(false)),
            paced: false,
        }
    }

    /// Cada escritura tarda lo que dura el audio escrito
    pub fn paced() -> Self {
        Self {
            paced: true,
            ..Self::new()
        }
    }

    pub fn log(&self) -> TransportLog {
        self.log.lock().clone()
    }

    pub fn set_listeners(&self, channel: ChannelId, count: usize) {
        self.listeners.lock().insert(channel, count);
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
    ) -> VoiceResult<Box<dyn VoiceSession>> {
        // Simula la latencia del handshake
        tokio::time::sleep(Duration::from_millis(5)).await;

        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(VoiceError::Connection {
                channel: channel_id,
                reason: "sin permisos".to_string(),
            });
        }

        let mut log = self.log.lock();
        log.connects.push(channel_id);
        log.active_sessions += 1;
        log.max_active_sessions = log.max_active_sessions.max(log.active_sessions);

        Ok(Box::new(FakeSession {
            log: self.log.clone(),
            fail_writes: self.fail_writes.clone(),
            paced: self.paced,
            closed: false,
        }))
    }

    async fn listener_count(&self, _guild_id: GuildId, channel_id: ChannelId) -> usize {
        self.listeners.lock().get(&channel_id).copied().unwrap_or(1)
    }

    fn bot_user_id(&self) -> UserId {
        BOT
    }
}

struct FakeSession {
    log: Arc<Mutex<TransportLog>>,
    fail_writes: Arc<AtomicBool>,
    paced: bool,
    closed: bool,
}

#[async_trait]
impl VoiceSession for FakeSession {
    async fn set_speaking(&mut self, speaking: bool) -> VoiceResult<()> {
        self.log.lock().speaking.push(speaking);
        Ok(())
    }

    async fn write(&mut self, samples: &[i16]) -> VoiceResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(VoiceError::Transport("socket cerrado".to_string()));
        }

        {
            let mut log = self.log.lock();
            log.writes += 1;
            log.samples_written += samples.len();
        }

        if self.paced {
            tokio::time::sleep(PcmFormat::DISCORD.duration_of(samples.len())).await;
        } else {
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    async fn flush(&mut self) -> VoiceResult<()> {
        self.log.lock().flushes += 1;
        Ok(())
    }

    async fn close(&mut self) -> VoiceResult<()> {
        if !self.closed {
            self.closed = true;
            let mut log = self.log.lock();
            log.closes += 1;
            log.active_sessions -= 1;
        }
        Ok(())
    }
}
