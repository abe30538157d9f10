use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use super::{
    engine::{Notifier, PlaybackEngine, VoiceConnector},
    events::{session_worker, SessionEvent},
    session::PlaybackSession,
};
use crate::error::MusicError;

/// Sesión compartida. El mutex serializa comandos y eventos del guild.
pub type SharedSession = Arc<Mutex<PlaybackSession>>;

struct SessionHandle {
    session: SharedSession,
    events: mpsc::UnboundedSender<SessionEvent>,
}

/// Dueño de todas las sesiones de reproducción, una por guild.
///
/// El mapa está fragmentado ([`DashMap`]) y nunca se mantiene una
/// referencia al mapa a través de un `.await`, así que guilds distintos no
/// se bloquean entre sí.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, SessionHandle>,
    engine: Arc<dyn PlaybackEngine>,
    voice: Arc<dyn VoiceConnector>,
    notifier: Arc<dyn Notifier>,
}

impl SessionRegistry {
    pub fn new(
        engine: Arc<dyn PlaybackEngine>,
        voice: Arc<dyn VoiceConnector>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            engine,
            voice,
            notifier,
        }
    }

    pub fn engine(&self) -> &Arc<dyn PlaybackEngine> {
        &self.engine
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SharedSession> {
        self.sessions.get(&guild_id).map(|h| h.session.clone())
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        let mut ids: Vec<GuildId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    /// Devuelve la sesión del guild o la crea uniéndose al canal de voz.
    pub async fn get_or_create(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: Option<ChannelId>,
    ) -> Result<SharedSession, MusicError> {
        if let Some(session) = self.get(guild_id) {
            return Ok(session);
        }

        let connection = self.voice.join(guild_id, voice_channel).await?;
        if let Err(e) = self.engine.connect_voice(guild_id, &connection).await {
            warn!("El nodo rechazó la conexión de voz de {}: {}", guild_id, e);
            if let Err(leave_err) = self.voice.leave(guild_id).await {
                warn!("Error al salir del canal de voz en {}: {}", guild_id, leave_err);
            }
            return Err(e);
        }

        // Otro comando pudo crear la sesión mientras esperábamos el join
        let session = match self.sessions.entry(guild_id) {
            Entry::Occupied(existing) => existing.get().session.clone(),
            Entry::Vacant(slot) => {
                let session = Arc::new(Mutex::new(PlaybackSession::new(
                    guild_id,
                    connection.channel_id,
                    text_channel,
                )));
                let (tx, rx) = mpsc::unbounded_channel();
                tokio::spawn(session_worker(
                    session.clone(),
                    rx,
                    self.engine.clone(),
                    self.notifier.clone(),
                ));
                slot.insert(SessionHandle {
                    session: session.clone(),
                    events: tx,
                });
                info!(
                    "🔊 Sesión creada en guild {} (canal {})",
                    guild_id, connection.channel_id
                );
                session
            }
        };

        Ok(session)
    }

    /// Encola un evento en el worker de la sesión. `false` si no hay sesión.
    pub fn dispatch(&self, guild_id: GuildId, event: SessionEvent) -> bool {
        self.sessions
            .get(&guild_id)
            .is_some_and(|h| h.events.send(event).is_ok())
    }

    /// El bot quedó en otro canal de voz (lo movió un moderador). `false`
    /// si el guild no tiene sesión.
    pub async fn voice_moved(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        let Some(session) = self.get(guild_id) else {
            return false;
        };
        let mut session = session.lock().await;
        if session.voice_channel() != channel_id {
            info!(
                "🔀 Bot movido en guild {}: {} -> {}",
                guild_id,
                session.voice_channel(),
                channel_id
            );
            session.set_voice_channel(channel_id);
        }
        true
    }

    /// Espera a que se apliquen todos los eventos encolados hasta ahora para
    /// el guild.
    #[cfg(any(test, feature = "test-support"))]
    #[doc(hidden)]
    pub async fn settle(&self, guild_id: GuildId) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        if self.dispatch(guild_id, SessionEvent::Settle(tx)) {
            let _ = rx.await;
        }
    }

    /// Destruye la sesión: descarta la cola, destruye el reproductor en el
    /// nodo y sale del canal de voz. Devuelve `false` si no existía.
    pub async fn remove(&self, guild_id: GuildId) -> bool {
        let Some((_, handle)) = self.sessions.remove(&guild_id) else {
            return false;
        };

        let discarded = handle.session.lock().await.close();
        info!(
            "👋 Sesión de guild {} destruida ({} tracks descartados)",
            guild_id, discarded
        );

        if let Err(e) = self.engine.destroy(guild_id).await {
            warn!("Error al destruir el reproductor de {}: {}", guild_id, e);
        }
        if let Err(e) = self.voice.leave(guild_id).await {
            warn!("Error al salir del canal de voz en {}: {}", guild_id, e);
        }

        true
    }
}
