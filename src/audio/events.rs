//! Enrutado de eventos de ciclo de vida del nodo de audio.
//!
//! Una sola conexión con el nodo multiplexa los eventos de todos los
//! guilds. [`EventRouter`] los reparte sin esperar a que se apliquen: cada
//! evento se encola en el worker de la sesión dueña, que lo aplica bajo el
//! lock de la sesión. Así los eventos de un guild quedan serializados con
//! sus comandos y nunca bloquean a los de otro guild.

use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use super::{
    controller::apply_action,
    engine::{Notifier, PlaybackEngine},
    registry::SessionRegistry,
    session::PlaybackSession,
    track::Track,
};

/// Mensaje que se publica cuando el nodo reporta un track atascado o con error.
pub const STUCK_MESSAGE: &str = "⚠️ El reproductor se atascó, saltando a la siguiente canción.";

/// Motivo por el que el nodo dejó de reproducir un track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    /// Si el reproductor quedó libre para empezar el siguiente track.
    pub fn may_start_next(self) -> bool {
        matches!(self, Self::Finished | Self::LoadFailed)
    }
}

/// Evento tal como lo emite el nodo de audio.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    TrackStarted {
        guild_id: GuildId,
        track: Track,
    },
    TrackEnded {
        guild_id: GuildId,
        track: Track,
        reason: TrackEndReason,
    },
    TrackStuck {
        guild_id: GuildId,
        track: Track,
        threshold: Duration,
    },
    TrackException {
        guild_id: GuildId,
        track: Track,
        message: String,
    },
    PlayerUpdate {
        guild_id: GuildId,
        position: Duration,
    },
    /// Se cerró un transporte con el nodo. `guild_id` es `None` cuando cae
    /// la conexión completa y no solo el socket de voz de un guild.
    ConnectionClosed {
        guild_id: Option<GuildId>,
        code: Option<u16>,
        reason: String,
    },
}

/// Evento ya dirigido a una sesión concreta.
#[derive(Debug)]
pub enum SessionEvent {
    Started(Track),
    Ended { track: Track, reason: TrackEndReason },
    Stuck { track: Track, threshold: Duration },
    Exception { track: Track, message: String },
    Position(Duration),
    /// Se responde cuando todos los eventos previos ya se aplicaron.
    Settle(oneshot::Sender<()>),
}

/// Reparte los eventos del nodo entre las sesiones.
#[derive(Clone)]
pub struct EventRouter {
    registry: Arc<SessionRegistry>,
}

impl EventRouter {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Consume el canal de eventos del nodo hasta que se cierre.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<EngineEvent>) {
        info!("📡 Enrutador de eventos iniciado");
        while let Some(event) = events.recv().await {
            self.route(event);
        }
        warn!("📡 Canal de eventos del nodo cerrado, enrutador detenido");
    }

    /// Entrega un evento a su sesión. Nunca espera a que se aplique.
    pub fn route(&self, event: EngineEvent) {
        let (guild_id, event) = match event {
            EngineEvent::ConnectionClosed {
                guild_id,
                code,
                reason,
            } => {
                warn!(
                    "🔌 Conexión con el nodo cerrada (guild: {:?}, código: {:?}): {}",
                    guild_id, code, reason
                );
                self.spawn_reconnect();
                return;
            }
            EngineEvent::TrackStarted { guild_id, track } => (guild_id, SessionEvent::Started(track)),
            EngineEvent::TrackEnded {
                guild_id,
                track,
                reason,
            } => (guild_id, SessionEvent::Ended { track, reason }),
            EngineEvent::TrackStuck {
                guild_id,
                track,
                threshold,
            } => (guild_id, SessionEvent::Stuck { track, threshold }),
            EngineEvent::TrackException {
                guild_id,
                track,
                message,
            } => (guild_id, SessionEvent::Exception { track, message }),
            EngineEvent::PlayerUpdate { guild_id, position } => {
                (guild_id, SessionEvent::Position(position))
            }
        };

        if !self.registry.dispatch(guild_id, event) {
            debug!("Evento para guild {} sin sesión activa, descartado", guild_id);
        }
    }

    fn spawn_reconnect(&self) {
        let registry = self.registry.clone();
        tokio::spawn(async move {
            info!("🔄 Reconectando con el nodo de audio...");
            match registry.engine().reconnect().await {
                Ok(true) => info!("✅ Reconectado con el nodo de audio"),
                Ok(false) => {
                    let stranded = registry.guild_ids();
                    if !stranded.is_empty() {
                        warn!(
                            "⚠️ Reconectado sin reanudar: los reproductores de {} guilds se perdieron ({:?}), hace falta /skip o /leave",
                            stranded.len(),
                            stranded
                        );
                    }
                }
                // El reintento, si lo hay, es cosa del transporte
                Err(e) => error!("❌ No se pudo reconectar con el nodo de audio: {}", e),
            }
        });
    }
}

/// Bucle de la tarea que serializa los eventos de una sesión.
pub(crate) async fn session_worker(
    session: Arc<Mutex<PlaybackSession>>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    engine: Arc<dyn PlaybackEngine>,
    notifier: Arc<dyn Notifier>,
) {
    while let Some(event) = events.recv().await {
        if let SessionEvent::Settle(done) = event {
            let _ = done.send(());
            continue;
        }

        let notice = {
            let mut guard = session.lock().await;
            if guard.is_closed() {
                break;
            }
            apply_event(&mut guard, event, engine.as_ref()).await
        };

        // El aviso sale fuera del lock: es una llamada de red
        if let Some((channel_id, message)) = notice {
            if let Err(e) = notifier.notify(channel_id, message).await {
                warn!("No se pudo enviar aviso al canal {}: {}", channel_id, e);
            }
        }
    }
    debug!("Worker de sesión terminado");
}

/// Aplica un evento a la sesión. Devuelve el aviso a publicar, si lo hay.
async fn apply_event(
    session: &mut PlaybackSession,
    event: SessionEvent,
    engine: &dyn PlaybackEngine,
) -> Option<(ChannelId, &'static str)> {
    let guild_id = session.guild_id();
    match event {
        SessionEvent::Started(track) => {
            info!("▶️ Reproduciendo: {} en guild {}", track.title(), guild_id);
            None
        }
        SessionEvent::Position(position) => {
            session.update_position(position);
            None
        }
        SessionEvent::Ended { track, reason } => {
            debug!("🎵 Track terminó en guild {} ({:?})", guild_id, reason);
            let action = session.track_ended(&track, reason);
            if let Err(e) = apply_action(engine, session, action).await {
                error!("Error al reproducir siguiente track en {}: {}", guild_id, e);
            }
            None
        }
        SessionEvent::Stuck { track, threshold } => {
            warn!(
                "⏳ Track atascado en guild {} tras {:?}: {}",
                guild_id,
                threshold,
                track.title()
            );
            handle_failure(session, &track, engine).await
        }
        SessionEvent::Exception { track, message } => {
            warn!(
                "❌ Error en track para guild {}: {} ({})",
                guild_id,
                track.title(),
                message
            );
            handle_failure(session, &track, engine).await
        }
        SessionEvent::Settle(done) => {
            let _ = done.send(());
            None
        }
    }
}

async fn handle_failure(
    session: &mut PlaybackSession,
    track: &Track,
    engine: &dyn PlaybackEngine,
) -> Option<(ChannelId, &'static str)> {
    let action = session.track_failed(track)?;
    if let Err(e) = apply_action(engine, session, action).await {
        error!("Error al saltar track fallido en {}: {}", session.guild_id(), e);
    }
    session.text_channel().map(|channel| (channel, STUCK_MESSAGE))
}
