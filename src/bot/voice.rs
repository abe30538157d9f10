//! Adaptadores de Discord para las interfaces del núcleo de audio.

use async_trait::async_trait;
use serenity::{
    http::Http,
    model::id::{ChannelId, GuildId},
};
use songbird::{error::JoinError, Songbird};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    audio::{Notifier, VoiceConnection, VoiceConnector},
    error::MusicError,
};

/// Handshake de voz a través de songbird.
///
/// Solo se usa la parte de gateway: el audio lo transmite el nodo, así que
/// los datos del servidor de voz se devuelven para entregárselos a él.
pub struct SongbirdConnector {
    songbird: Arc<Songbird>,
}

impl SongbirdConnector {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self { songbird }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<VoiceConnection, MusicError> {
        let (info, _call) = self
            .songbird
            .join_gateway(guild_id, channel_id)
            .await
            .map_err(|e| MusicError::VoiceJoinFailed(e.to_string()))?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(VoiceConnection {
            channel_id,
            endpoint: info.endpoint,
            session_id: info.session_id,
            token: info.token,
        })
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), MusicError> {
        match self.songbird.remove(guild_id).await {
            Ok(()) => {
                info!("👋 Desconectado del canal de voz en guild {}", guild_id);
                Ok(())
            }
            // Ya estábamos fuera (p. ej. nos desconectó un moderador)
            Err(JoinError::NoCall) => {
                debug!("Sin llamada activa en guild {}", guild_id);
                Ok(())
            }
            Err(e) => Err(MusicError::Discord(e.to_string())),
        }
    }
}

/// Publica avisos en el canal de texto de la sesión.
pub struct ChannelNotifier {
    http: Arc<Http>,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, channel_id: ChannelId, message: &str) -> Result<(), MusicError> {
        channel_id
            .say(self.http.as_ref(), message)
            .await
            .map_err(|e| MusicError::Discord(e.to_string()))?;
        Ok(())
    }
}
