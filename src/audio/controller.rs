use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info};

use super::{
    engine::PlaybackEngine,
    registry::SessionRegistry,
    session::{LoopType, PlaybackAction, PlaybackSession, PlaybackStatus, SessionSnapshot},
    track::{ResolvedTracks, Track},
};
use crate::error::MusicError;

/// Estado resultante de una operación sobre la cola.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueOutcome {
    pub queue_len: usize,
    pub current: Option<Track>,
    pub status: PlaybackStatus,
}

impl QueueOutcome {
    fn of(session: &PlaybackSession) -> Self {
        Self {
            queue_len: session.queue().len(),
            current: session.current().cloned(),
            status: session.status(),
        }
    }
}

/// Resultado de `/play`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayOutcome {
    pub added: usize,
    /// Si el primer track agregado empezó a sonar de inmediato.
    pub started: bool,
    /// Posición en la cola (desde 1) del primer track agregado.
    pub position: usize,
    /// Tiempo hasta que suene el primer track agregado.
    pub time_until_playing: Duration,
    pub state: QueueOutcome,
}

/// Operaciones públicas sobre la cola de un guild.
///
/// Cada operación toma el lock de la sesión y lo mantiene mientras avisa al
/// nodo de audio, así el nodo ve los comandos en el mismo orden que el
/// estado.
#[derive(Clone)]
pub struct QueueController {
    registry: Arc<SessionRegistry>,
}

impl QueueController {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Agrega tracks al final de la cola sin iniciar la reproducción.
    pub async fn enqueue(&self, guild_id: GuildId, tracks: Vec<Track>) -> Result<QueueOutcome, MusicError> {
        let mut session = self.lock(guild_id).await?;
        session.enqueue(tracks);
        Ok(QueueOutcome::of(&session))
    }

    /// Reproduce la cabeza de la cola si no hay nada sonando.
    pub async fn play_next(&self, guild_id: GuildId) -> Result<QueueOutcome, MusicError> {
        let mut session = self.lock(guild_id).await?;
        let action = session.play_next();
        apply_action(self.engine(), &mut session, action).await?;
        Ok(QueueOutcome::of(&session))
    }

    /// Salta al siguiente track de la cola, ignorando el modo loop.
    pub async fn skip(&self, guild_id: GuildId) -> Result<QueueOutcome, MusicError> {
        let mut session = self.lock(guild_id).await?;
        let skipped = session.current().map(|t| t.title().to_string());
        let action = session.skip();
        apply_action(self.engine(), &mut session, action).await?;
        if let Some(title) = skipped {
            info!("⏭️ Saltado en guild {}: {}", guild_id, title);
        }
        Ok(QueueOutcome::of(&session))
    }

    pub async fn set_loop(
        &self,
        guild_id: GuildId,
        mode: Option<LoopType>,
    ) -> Result<Option<LoopType>, MusicError> {
        let mut session = self.lock(guild_id).await?;
        session.set_loop(mode);
        Ok(session.loop_mode())
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<PlaybackStatus, MusicError> {
        let mut session = self.lock(guild_id).await?;
        let action = session.pause();
        apply_action(self.engine(), &mut session, action).await?;
        Ok(session.status())
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<PlaybackStatus, MusicError> {
        let mut session = self.lock(guild_id).await?;
        let action = session.resume();
        apply_action(self.engine(), &mut session, action).await?;
        Ok(session.status())
    }

    /// Encola lo resuelto por una búsqueda y, si la sesión estaba ociosa,
    /// empieza a reproducir.
    pub async fn play(&self, guild_id: GuildId, resolved: ResolvedTracks) -> Result<PlayOutcome, MusicError> {
        let mut session = self.lock(guild_id).await?;

        let was_active = session.current().is_some();
        let position = session.queue().len() + 1;
        let time_until_playing = session.time_until_end_of_queue();
        let added = session.enqueue(resolved.tracks);

        let started = if was_active {
            false
        } else {
            let action = session.play_next();
            let starts = matches!(action, PlaybackAction::Play(_));
            apply_action(self.engine(), &mut session, action).await?;
            starts
        };

        Ok(PlayOutcome {
            added,
            started,
            position,
            time_until_playing,
            state: QueueOutcome::of(&session),
        })
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> Result<SessionSnapshot, MusicError> {
        let session = self.lock(guild_id).await?;
        Ok(session.snapshot())
    }

    fn engine(&self) -> &dyn PlaybackEngine {
        self.registry.engine().as_ref()
    }

    async fn lock(&self, guild_id: GuildId) -> Result<OwnedMutexGuard<PlaybackSession>, MusicError> {
        let session = self
            .registry
            .get(guild_id)
            .ok_or(MusicError::NoActiveSession)?;
        let guard = session.lock_owned().await;
        // La sesión pudo destruirse mientras esperábamos el lock
        if guard.is_closed() {
            return Err(MusicError::NoActiveSession);
        }
        Ok(guard)
    }
}

/// Ejecuta en el nodo la acción producida por una transición. Si el nodo
/// falla, la sesión vuelve al estado anterior a la transición.
pub(crate) async fn apply_action(
    engine: &dyn PlaybackEngine,
    session: &mut PlaybackSession,
    action: PlaybackAction,
) -> Result<(), MusicError> {
    let guild_id = session.guild_id();
    let result = match &action {
        PlaybackAction::Play(track) => engine.play(guild_id, track).await,
        PlaybackAction::Stop => engine.stop(guild_id).await,
        PlaybackAction::Pause => engine.set_paused(guild_id, true).await,
        PlaybackAction::Resume => engine.set_paused(guild_id, false).await,
        PlaybackAction::Nothing => return Ok(()),
    };

    if let Err(e) = &result {
        error!("❌ El nodo rechazó {:?} en guild {}: {}", action, guild_id, e);
        match action {
            PlaybackAction::Play(_) => session.rollback_start(),
            PlaybackAction::Pause => {
                session.resume();
            }
            PlaybackAction::Resume => {
                session.pause();
            }
            PlaybackAction::Stop | PlaybackAction::Nothing => {}
        }
    }

    result
}
