//! Interfaces hacia los colaboradores externos: el nodo de audio, el
//! handshake de voz de Discord y el canal de texto donde se avisa al usuario.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};

use super::track::{ResolvedTracks, Track};
use crate::error::MusicError;

/// Datos del servidor de voz que el nodo de audio necesita para transmitir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceConnection {
    pub channel_id: ChannelId,
    pub endpoint: String,
    pub session_id: String,
    pub token: String,
}

/// Nodo de audio que resuelve búsquedas y reproduce tracks.
///
/// Los eventos de ciclo de vida (fin, atasco, error, cierre) llegan por
/// separado como [`EngineEvent`](super::events::EngineEvent).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    /// Resuelve una búsqueda o URL. `TrackResolutionFailed` si no hay nada.
    async fn resolve(&self, query: &str) -> Result<ResolvedTracks, MusicError>;

    /// Entrega al nodo la conexión de voz del guild.
    async fn connect_voice(&self, guild_id: GuildId, voice: &VoiceConnection) -> Result<(), MusicError>;

    /// Reproduce `track`, reemplazando lo que esté sonando.
    async fn play(&self, guild_id: GuildId, track: &Track) -> Result<(), MusicError>;

    async fn stop(&self, guild_id: GuildId) -> Result<(), MusicError>;

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> Result<(), MusicError>;

    /// Destruye el reproductor del guild en el nodo.
    async fn destroy(&self, guild_id: GuildId) -> Result<(), MusicError>;

    /// Restablece la conexión con el nodo. `true` si el nodo conservó los
    /// reproductores de la sesión anterior.
    async fn reconnect(&self) -> Result<bool, MusicError>;
}

/// Entrada y salida de canales de voz.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<VoiceConnection, MusicError>;

    async fn leave(&self, guild_id: GuildId) -> Result<(), MusicError>;
}

/// Avisos al canal de texto asociado a una sesión.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel_id: ChannelId, message: &str) -> Result<(), MusicError>;
}
