//! Adaptador de [`PlaybackEngine`] para un nodo Lavalink v4.
//!
//! Los comandos van por la API REST (`reqwest`) y los eventos llegan por un
//! WebSocket (`tokio-tungstenite`) que se lee en una tarea aparte y se
//! reenvía como [`EngineEvent`] al canal del enrutador.

pub mod model;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::{Mutex as SyncMutex, RwLock};
use reqwest::{header::AUTHORIZATION, Response};
use serenity::model::id::{GuildId, UserId};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, protocol::Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};
use url::Url;

use self::model::{
    ErrorResponse, LoadResult, NodeMessage, ReadyOp, TrackUserData, UpdatePlayer, UpdatePlayerTrack,
    UpdateSession, VoiceState,
};
use super::{
    engine::{PlaybackEngine, VoiceConnection},
    events::EngineEvent,
    track::{ResolvedTracks, Track},
};
use crate::{config::Config, error::MusicError};

const CLIENT_NAME: &str = concat!("rhea/", env!("CARGO_PKG_VERSION"));
/// Segundos que el nodo conserva los reproductores tras perder la conexión.
const RESUME_TIMEOUT_SECS: u64 = 60;

type NodeStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, Default)]
struct NodeSession {
    /// Sesión activa; `None` mientras no hay WebSocket.
    current: Option<String>,
    /// Última sesión conocida, para pedir resume al reconectar.
    last: Option<String>,
}

pub struct LavalinkNode {
    http: reqwest::Client,
    rest_url: String,
    ws_url: String,
    password: String,
    user_id: UserId,
    search_prefix: String,
    session: Arc<RwLock<NodeSession>>,
    events: mpsc::UnboundedSender<EngineEvent>,
    reader: SyncMutex<Option<JoinHandle<()>>>,
    connecting: Mutex<()>,
}

impl LavalinkNode {
    pub fn new(config: &Config, user_id: UserId, events: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self {
            http: reqwest::Client::new(),
            rest_url: config.lavalink_rest_url(),
            ws_url: config.lavalink_ws_url(),
            password: config.lavalink_password.clone(),
            user_id,
            search_prefix: config.default_search_prefix.clone(),
            session: Arc::new(RwLock::new(NodeSession::default())),
            events,
            reader: SyncMutex::new(None),
            connecting: Mutex::new(()),
        }
    }

    /// Cliente HTTP compartido, también usado para resolver carátulas.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn is_connected(&self) -> bool {
        self.session.read().current.is_some()
    }

    /// Abre el WebSocket, espera el `ready` y lanza la tarea lectora.
    ///
    /// No hace nada si ya hay una sesión activa. Devuelve `false` cuando el
    /// nodo abrió una sesión nueva en lugar de reanudar la anterior: los
    /// reproductores que existían se perdieron.
    pub async fn connect(&self) -> Result<bool, MusicError> {
        let _guard = self.connecting.lock().await;
        if self.is_connected() {
            return Ok(true);
        }

        info!("🔌 Conectando a Lavalink en {}", self.ws_url);
        let mut stream = self.open_socket().await?;
        let ready = wait_for_ready(&mut stream).await?;

        let had_session = {
            let mut session = self.session.write();
            let had_session = session.last.is_some();
            session.current = Some(ready.session_id.clone());
            session.last = Some(ready.session_id.clone());
            had_session
        };
        if ready.resumed {
            info!("♻️ Sesión de Lavalink {} reanudada", ready.session_id);
        } else if had_session {
            warn!("⚠️ Lavalink abrió una sesión nueva ({}), los reproductores anteriores se perdieron", ready.session_id);
        } else {
            info!("✅ Conectado a Lavalink (sesión {})", ready.session_id);
        }

        if let Err(e) = self.enable_resuming(&ready.session_id).await {
            warn!("No se pudo activar el resume de la sesión: {}", e);
        }

        let task = tokio::spawn(read_loop(stream, self.session.clone(), self.events.clone()));
        if let Some(previous) = self.reader.lock().replace(task) {
            previous.abort();
        }
        Ok(ready.resumed || !had_session)
    }

    async fn open_socket(&self) -> Result<NodeStream, MusicError> {
        let mut request = self
            .ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| MusicError::ConnectionLost(e.to_string()))?;

        let headers = request.headers_mut();
        headers.insert("Authorization", header_value(&self.password)?);
        headers.insert("User-Id", header_value(&self.user_id.get().to_string())?);
        headers.insert("Client-Name", HeaderValue::from_static(CLIENT_NAME));
        let last_session = self.session.read().last.clone();
        if let Some(last) = last_session {
            headers.insert("Session-Id", header_value(&last)?);
        }

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| MusicError::ConnectionLost(e.to_string()))?;
        Ok(stream)
    }

    async fn enable_resuming(&self, session_id: &str) -> Result<(), MusicError> {
        let response = self
            .http
            .patch(format!("{}/sessions/{}", self.rest_url, session_id))
            .header(AUTHORIZATION, &self.password)
            .json(&UpdateSession {
                resuming: true,
                timeout: RESUME_TIMEOUT_SECS,
            })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    fn session_id(&self) -> Result<String, MusicError> {
        self.session
            .read()
            .current
            .clone()
            .ok_or_else(|| MusicError::ConnectionLost("sin sesión con el nodo".to_string()))
    }

    fn player_url(&self, guild_id: GuildId) -> Result<String, MusicError> {
        Ok(format!(
            "{}/sessions/{}/players/{}",
            self.rest_url,
            self.session_id()?,
            guild_id
        ))
    }

    async fn update_player(&self, guild_id: GuildId, body: &UpdatePlayer) -> Result<(), MusicError> {
        let response = self
            .http
            .patch(self.player_url(guild_id)?)
            .header(AUTHORIZATION, &self.password)
            .json(body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    fn identifier_for(&self, query: &str) -> String {
        let query = query.trim();
        match Url::parse(query) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => query.to_string(),
            _ => format!("{}:{}", self.search_prefix, query),
        }
    }
}

#[async_trait]
impl PlaybackEngine for LavalinkNode {
    async fn resolve(&self, query: &str) -> Result<ResolvedTracks, MusicError> {
        let identifier = self.identifier_for(query);
        debug!("🔍 Resolviendo: {}", identifier);

        let response = self
            .http
            .get(format!("{}/loadtracks", self.rest_url))
            .header(AUTHORIZATION, &self.password)
            .query(&[("identifier", identifier.as_str())])
            .send()
            .await?;
        let result: LoadResult = check(response).await?.json().await?;

        let not_found = || MusicError::TrackResolutionFailed(query.to_string());
        match result {
            LoadResult::Track(track) => Ok(ResolvedTracks::single(track.into())),
            LoadResult::Search(tracks) => tracks
                .into_iter()
                .next()
                .map(|track| ResolvedTracks::single(track.into()))
                .ok_or_else(not_found),
            LoadResult::Playlist(playlist) if !playlist.tracks.is_empty() => Ok(ResolvedTracks::playlist(
                playlist.info.name,
                playlist.tracks.into_iter().map(Track::from).collect(),
            )),
            LoadResult::Playlist(_) | LoadResult::Empty(_) => {
                warn!("No se encontraron resultados para: {}", identifier);
                Err(not_found())
            }
            LoadResult::Error(exception) => {
                error!("Error al cargar track: {}", exception.describe());
                Err(not_found())
            }
        }
    }

    async fn connect_voice(&self, guild_id: GuildId, voice: &VoiceConnection) -> Result<(), MusicError> {
        self.update_player(
            guild_id,
            &UpdatePlayer {
                voice: Some(VoiceState {
                    token: voice.token.clone(),
                    endpoint: voice.endpoint.clone(),
                    session_id: voice.session_id.clone(),
                }),
                ..Default::default()
            },
        )
        .await
    }

    async fn play(&self, guild_id: GuildId, track: &Track) -> Result<(), MusicError> {
        self.update_player(
            guild_id,
            &UpdatePlayer {
                track: Some(UpdatePlayerTrack {
                    encoded: Some(track.encoded().to_string()),
                    user_data: track.play_id().map(|play_id| TrackUserData {
                        play_id: Some(play_id),
                    }),
                }),
                paused: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), MusicError> {
        self.update_player(
            guild_id,
            &UpdatePlayer {
                track: Some(UpdatePlayerTrack {
                    encoded: None,
                    user_data: None,
                }),
                ..Default::default()
            },
        )
        .await
    }

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> Result<(), MusicError> {
        self.update_player(
            guild_id,
            &UpdatePlayer {
                paused: Some(paused),
                ..Default::default()
            },
        )
        .await
    }

    async fn destroy(&self, guild_id: GuildId) -> Result<(), MusicError> {
        let response = self
            .http
            .delete(self.player_url(guild_id)?)
            .header(AUTHORIZATION, &self.password)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn reconnect(&self) -> Result<bool, MusicError> {
        self.connect().await
    }
}

fn header_value(value: &str) -> Result<HeaderValue, MusicError> {
    HeaderValue::from_str(value).map_err(|e| MusicError::ConnectionLost(e.to_string()))
}

/// Convierte las respuestas no exitosas en `MusicError::Engine`.
async fn check(response: Response) -> Result<Response, MusicError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => format!(
            "{} {}: {}",
            err.status,
            err.error,
            err.message.unwrap_or_default()
        ),
        Err(_) => format!("{}: {}", status, body),
    };
    Err(MusicError::Engine(detail))
}

async fn wait_for_ready(stream: &mut NodeStream) -> Result<ReadyOp, MusicError> {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match model::decode(&text) {
                Ok(NodeMessage::Ready(ready)) => return Ok(ready),
                Ok(_) => continue,
                Err(e) => warn!("Mensaje del nodo no reconocido: {}", e),
            },
            Ok(Message::Close(frame)) => {
                return Err(MusicError::ConnectionLost(format!(
                    "el nodo cerró la conexión: {:?}",
                    frame
                )));
            }
            Ok(_) => continue,
            Err(e) => return Err(MusicError::ConnectionLost(e.to_string())),
        }
    }
    Err(MusicError::ConnectionLost("conexión cerrada antes del ready".to_string()))
}

/// Lee el WebSocket hasta que se cierre y reenvía los eventos.
async fn read_loop(
    mut stream: NodeStream,
    session: Arc<RwLock<NodeSession>>,
    events: mpsc::UnboundedSender<EngineEvent>,
) {
    let (code, reason) = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match model::decode(&text) {
                Ok(NodeMessage::Event(event)) => {
                    if events.send(event).is_err() {
                        debug!("Enrutador detenido, cerrando lector del nodo");
                        return;
                    }
                }
                Ok(NodeMessage::Ready(ready)) => {
                    session.write().current = Some(ready.session_id);
                }
                Ok(NodeMessage::Ignored) => {}
                Err(e) => warn!("Mensaje del nodo no reconocido: {}", e),
            },
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                    None => (None, "cerrado sin motivo".to_string()),
                };
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break (None, e.to_string()),
            None => break (None, "stream terminado".to_string()),
        }
    };

    session.write().current = None;
    warn!("🔌 WebSocket de Lavalink cerrado: {}", reason);
    let _ = events.send(EngineEvent::ConnectionClosed {
        guild_id: None,
        code,
        reason,
    });
}
