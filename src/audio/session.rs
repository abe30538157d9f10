//! Estado de reproducción por guild y sus transiciones.
//!
//! Todo lo de este módulo es síncrono: cada operación muta la sesión y
//! devuelve un [`PlaybackAction`] que describe lo que el nodo de audio
//! debe hacer a continuación. Quien llama es responsable de mantener el
//! lock de la sesión mientras aplica la acción.

use serenity::model::id::{ChannelId, GuildId};
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use super::{events::TrackEndReason, track::Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    Playing,
    Paused,
}

/// Política de repetición. La ausencia de valor (`None`) desactiva el loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopType {
    /// Repite la canción actual indefinidamente.
    Single,
    /// Reencola cada canción terminada al final de la cola.
    Queue,
}

impl LoopType {
    pub fn parse(value: &str) -> Option<Option<Self>> {
        match value {
            "off" | "none" => Some(None),
            "single" | "track" => Some(Some(Self::Single)),
            "queue" => Some(Some(Self::Queue)),
            _ => None,
        }
    }
}

/// Lo que el nodo de audio tiene que hacer tras una transición.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackAction {
    Play(Track),
    Stop,
    Pause,
    Resume,
    Nothing,
}

/// Estado de reproducción de un guild con conexión de voz activa.
///
/// Invariante: `current` existe si y solo si `status` es `Playing` o `Paused`.
#[derive(Debug)]
pub struct PlaybackSession {
    guild_id: GuildId,
    voice_channel: ChannelId,
    text_channel: Option<ChannelId>,
    queue: VecDeque<Track>,
    current: Option<Track>,
    status: PlaybackStatus,
    loop_mode: Option<LoopType>,
    position: Duration,
    faulted: bool,
    closed: bool,
    /// Contador de entregas al nodo, para distinguir copias del mismo track.
    plays: u64,
}

impl PlaybackSession {
    pub fn new(guild_id: GuildId, voice_channel: ChannelId, text_channel: Option<ChannelId>) -> Self {
        Self {
            guild_id,
            voice_channel,
            text_channel,
            queue: VecDeque::new(),
            current: None,
            status: PlaybackStatus::Idle,
            loop_mode: None,
            position: Duration::ZERO,
            faulted: false,
            closed: false,
            plays: 0,
        }
    }

    // Getters
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }
    pub fn voice_channel(&self) -> ChannelId {
        self.voice_channel
    }
    pub fn text_channel(&self) -> Option<ChannelId> {
        self.text_channel
    }
    pub fn queue(&self) -> &VecDeque<Track> {
        &self.queue
    }
    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }
    pub fn status(&self) -> PlaybackStatus {
        self.status
    }
    pub fn loop_mode(&self) -> Option<LoopType> {
        self.loop_mode
    }
    pub fn position(&self) -> Duration {
        self.position
    }
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn set_text_channel(&mut self, channel: ChannelId) {
        self.text_channel = Some(channel);
    }

    pub fn set_voice_channel(&mut self, channel: ChannelId) {
        self.voice_channel = channel;
    }

    /// Agrega tracks al final de la cola respetando el orden. No inicia la
    /// reproducción. Devuelve cuántos se agregaron.
    pub fn enqueue<I>(&mut self, tracks: I) -> usize
    where
        I: IntoIterator<Item = Track>,
    {
        let before = self.queue.len();
        self.queue.extend(tracks);
        let added = self.queue.len() - before;
        if added > 0 {
            debug!("➕ {} tracks agregados a la cola de {}", added, self.guild_id);
        }
        added
    }

    /// Saca la cabeza de la cola y la reproduce si no hay nada sonando.
    ///
    /// Si ya hay un track actual no toca la cola. Con la cola vacía deja la
    /// sesión en `Idle`.
    pub fn play_next(&mut self) -> PlaybackAction {
        if self.current.is_some() {
            return PlaybackAction::Nothing;
        }
        self.advance()
    }

    /// Pasa al siguiente track ignorando el modo loop.
    pub fn skip(&mut self) -> PlaybackAction {
        let was_playing = self.current.take().is_some();
        match self.advance() {
            PlaybackAction::Nothing if was_playing => PlaybackAction::Stop,
            action => action,
        }
    }

    pub fn set_loop(&mut self, mode: Option<LoopType>) {
        self.loop_mode = mode;
        match mode {
            None => info!("➡️ Repetición desactivada en {}", self.guild_id),
            Some(LoopType::Single) => info!("🔂 Repetir canción activado en {}", self.guild_id),
            Some(LoopType::Queue) => info!("🔁 Repetir cola activado en {}", self.guild_id),
        }
    }

    pub fn pause(&mut self) -> PlaybackAction {
        if self.status == PlaybackStatus::Playing {
            self.status = PlaybackStatus::Paused;
            PlaybackAction::Pause
        } else {
            PlaybackAction::Nothing
        }
    }

    pub fn resume(&mut self) -> PlaybackAction {
        if self.status == PlaybackStatus::Paused {
            self.status = PlaybackStatus::Playing;
            PlaybackAction::Resume
        } else {
            PlaybackAction::Nothing
        }
    }

    /// El nodo terminó de reproducir `track`.
    ///
    /// Solo los finales que liberan al reproductor (`finished`, `loadFailed`)
    /// avanzan la cola; el resto son el eco de nuestros propios
    /// stop/replace. Un evento de una reproducción que ya no es la actual
    /// se ignora, aunque sea otra copia del mismo track.
    pub fn track_ended(&mut self, track: &Track, reason: TrackEndReason) -> PlaybackAction {
        if !reason.may_start_next() || !self.is_current(track) {
            return PlaybackAction::Nothing;
        }

        // Un track con error nunca se repite
        let honor_loop = reason == TrackEndReason::Finished && !self.faulted;
        let loop_mode = if honor_loop { self.loop_mode } else { None };

        match loop_mode {
            Some(LoopType::Single) => {
                let replay = self.stamp(track.clone());
                self.current = Some(replay.clone());
                self.position = Duration::ZERO;
                self.status = PlaybackStatus::Playing;
                debug!("🔂 Repitiendo: {}", replay.title());
                PlaybackAction::Play(replay)
            }
            Some(LoopType::Queue) => {
                if let Some(finished) = self.current.take() {
                    debug!("🔁 Reencolando: {}", finished.title());
                    self.queue.push_back(finished);
                }
                self.advance()
            }
            None => {
                self.current = None;
                self.advance()
            }
        }
    }

    /// El nodo reportó el track atascado o con error.
    ///
    /// Con cola pendiente se salta; si no, el track queda marcado para que
    /// su final nunca dispare una repetición. Devuelve `None` si el evento
    /// es de un track que ya no es el actual.
    pub fn track_failed(&mut self, track: &Track) -> Option<PlaybackAction> {
        if !self.is_current(track) {
            return None;
        }

        if self.queue.is_empty() {
            self.faulted = true;
            Some(PlaybackAction::Nothing)
        } else {
            Some(self.skip())
        }
    }

    pub fn update_position(&mut self, position: Duration) {
        if self.current.is_some() {
            self.position = position;
        }
    }

    /// Deshace el inicio de un track que el nodo no pudo reproducir: vuelve
    /// a la cabeza de la cola y la sesión queda en `Idle`.
    pub fn rollback_start(&mut self) {
        if let Some(track) = self.current.take() {
            self.queue.push_front(track);
        }
        self.go_idle();
    }

    /// Descarta todo el estado. Cualquier operación posterior sobre esta
    /// sesión debe tratarla como inexistente.
    pub fn close(&mut self) -> usize {
        let discarded = self.queue.len();
        self.queue.clear();
        self.current = None;
        self.go_idle();
        self.closed = true;
        discarded
    }

    /// Tiempo hasta que suene un track agregado ahora al final de la cola.
    pub fn time_until_end_of_queue(&self) -> Duration {
        let queued: Duration = self
            .queue
            .iter()
            .filter(|t| !t.is_stream())
            .map(Track::duration)
            .sum();
        let remaining = self
            .current
            .as_ref()
            .filter(|t| !t.is_stream())
            .map(|t| t.duration().saturating_sub(self.position))
            .unwrap_or_default();
        queued + remaining
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            guild_id: self.guild_id,
            current: self.current.clone(),
            queue: self.queue.iter().cloned().collect(),
            status: self.status,
            loop_mode: self.loop_mode,
            position: self.position,
        }
    }

    // Funciones privadas

    fn advance(&mut self) -> PlaybackAction {
        self.faulted = false;
        self.position = Duration::ZERO;
        match self.queue.pop_front() {
            Some(next) => {
                let next = self.stamp(next);
                info!("➡️ Siguiente en cola: {}", next.title());
                self.current = Some(next.clone());
                self.status = PlaybackStatus::Playing;
                PlaybackAction::Play(next)
            }
            None => {
                info!("📭 Cola vacía en {}", self.guild_id);
                self.go_idle();
                PlaybackAction::Nothing
            }
        }
    }

    fn is_current(&self, track: &Track) -> bool {
        self.current.as_ref().is_some_and(|current| current.same_play(track))
    }

    fn stamp(&mut self, track: Track) -> Track {
        self.plays += 1;
        track.with_play_id(self.plays)
    }

    fn go_idle(&mut self) {
        self.current = None;
        self.status = PlaybackStatus::Idle;
        self.position = Duration::ZERO;
        self.faulted = false;
    }
}

/// Vista de solo lectura de una sesión, para `/queue` y `/nowplaying`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub guild_id: GuildId,
    pub current: Option<Track>,
    pub queue: Vec<Track>,
    pub status: PlaybackStatus,
    pub loop_mode: Option<LoopType>,
    pub position: Duration,
}

impl SessionSnapshot {
    /// Página `page` (desde 1) de la cola y el total de páginas.
    pub fn page(&self, page: usize, per_page: usize) -> (&[Track], usize) {
        let per_page = per_page.max(1);
        let total_pages = self.queue.len().div_ceil(per_page).max(1);
        let page = page.clamp(1, total_pages);
        let start = (page - 1) * per_page;
        let end = (start + per_page).min(self.queue.len());
        (&self.queue[start..end], total_pages)
    }

    pub fn total_duration(&self) -> Duration {
        self.queue
            .iter()
            .chain(self.current.iter())
            .filter(|t| !t.is_stream())
            .map(Track::duration)
            .sum()
    }
}
