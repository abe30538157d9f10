//! Payloads JSON de Lavalink v4 y su traducción a tipos del dominio.

use serde::{de::IgnoredAny, Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::time::Duration;
use tracing::debug;

use crate::audio::{
    events::{EngineEvent, TrackEndReason},
    track::{Track, TrackInfo},
};

// Mensajes del WebSocket

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LavalinkOpType {
    Ready,
    PlayerUpdate,
    Stats,
    Event,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct OpEnvelope {
    op: LavalinkOpType,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyOp {
    pub resumed: bool,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerUpdateOp {
    guild_id: String,
    state: PlayerState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerState {
    #[serde(default)]
    position: u64,
    #[serde(default)]
    connected: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsOp {
    players: u64,
    playing_players: u64,
    uptime: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum LavalinkEvent {
    TrackStartEvent(TrackStart),
    TrackEndEvent(TrackEnd),
    TrackExceptionEvent(TrackExceptionPayload),
    TrackStuckEvent(TrackStuck),
    WebSocketClosedEvent(WebSocketClosed),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackStart {
    guild_id: String,
    track: LavalinkTrack,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackEnd {
    guild_id: String,
    track: LavalinkTrack,
    reason: EndReason,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
enum EndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl From<EndReason> for TrackEndReason {
    fn from(reason: EndReason) -> Self {
        match reason {
            EndReason::Finished => Self::Finished,
            EndReason::LoadFailed => Self::LoadFailed,
            EndReason::Stopped => Self::Stopped,
            EndReason::Replaced => Self::Replaced,
            EndReason::Cleanup => Self::Cleanup,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackExceptionPayload {
    guild_id: String,
    track: LavalinkTrack,
    exception: LavalinkException,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackStuck {
    guild_id: String,
    track: LavalinkTrack,
    threshold_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebSocketClosed {
    guild_id: String,
    code: u16,
    reason: String,
    by_remote: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LavalinkException {
    pub message: Option<String>,
    pub severity: String,
    #[serde(default)]
    pub cause: String,
}

impl LavalinkException {
    pub fn describe(&self) -> String {
        match &self.message {
            Some(message) => format!("{} ({})", message, self.severity),
            None => format!("{} ({})", self.cause, self.severity),
        }
    }
}

// Tracks y resultados de búsqueda

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LavalinkTrack {
    pub encoded: String,
    pub info: LavalinkTrackInfo,
    #[serde(default)]
    pub user_data: TrackUserData,
}

/// Datos propios que el nodo devuelve tal cual en cada evento del track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackUserData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LavalinkTrackInfo {
    pub identifier: String,
    pub is_seekable: bool,
    pub author: String,
    pub length: u64,
    pub is_stream: bool,
    pub title: String,
    pub uri: Option<String>,
    pub artwork_url: Option<String>,
    pub source_name: String,
}

impl From<LavalinkTrack> for Track {
    fn from(track: LavalinkTrack) -> Self {
        let info = track.info;
        let converted = Track::new(
            track.encoded,
            TrackInfo {
                identifier: info.identifier,
                title: info.title,
                author: info.author,
                uri: info.uri,
                length: Duration::from_millis(info.length),
                is_stream: info.is_stream,
                is_seekable: info.is_seekable,
                source_name: info.source_name,
                artwork_url: info.artwork_url,
            },
        );
        match track.user_data.play_id {
            Some(play_id) => converted.with_play_id(play_id),
            None => converted,
        }
    }
}

/// Respuesta de `GET /v4/loadtracks`.
#[derive(Debug, Deserialize)]
#[serde(tag = "loadType", content = "data", rename_all = "camelCase")]
pub enum LoadResult {
    Track(LavalinkTrack),
    Playlist(PlaylistData),
    Search(Vec<LavalinkTrack>),
    Empty(IgnoredAny),
    Error(LavalinkException),
}

#[derive(Debug, Deserialize)]
pub struct PlaylistData {
    pub info: PlaylistInfo,
    pub tracks: Vec<LavalinkTrack>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistInfo {
    pub name: String,
}

/// Cuerpo de error que devuelve la API REST.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub error: String,
    pub message: Option<String>,
}

// Peticiones REST

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<UpdatePlayerTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceState>,
}

/// `encoded: None` se serializa como `null` y detiene el reproductor.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlayerTrack {
    pub encoded: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<TrackUserData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceState {
    pub token: String,
    pub endpoint: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateSession {
    pub resuming: bool,
    pub timeout: u64,
}

/// Mensaje del nodo ya interpretado.
#[derive(Debug, PartialEq)]
pub enum NodeMessage {
    Ready(ReadyOp),
    Event(EngineEvent),
    Ignored,
}

/// Decodifica un mensaje de texto del WebSocket del nodo.
pub fn decode(text: &str) -> serde_json::Result<NodeMessage> {
    let envelope: OpEnvelope = serde_json::from_str(text)?;
    let message = match envelope.op {
        LavalinkOpType::Ready => NodeMessage::Ready(serde_json::from_str(text)?),
        LavalinkOpType::PlayerUpdate => {
            let update: PlayerUpdateOp = serde_json::from_str(text)?;
            match parse_guild(&update.guild_id) {
                Some(guild_id) if update.state.connected => NodeMessage::Event(EngineEvent::PlayerUpdate {
                    guild_id,
                    position: Duration::from_millis(update.state.position),
                }),
                _ => NodeMessage::Ignored,
            }
        }
        LavalinkOpType::Stats => {
            let stats: StatsOp = serde_json::from_str(text)?;
            debug!(
                "📊 Nodo: {} reproductores ({} activos), uptime {:?}",
                stats.players,
                stats.playing_players,
                Duration::from_millis(stats.uptime)
            );
            NodeMessage::Ignored
        }
        LavalinkOpType::Event => {
            let event: LavalinkEvent = serde_json::from_str(text)?;
            event
                .into_engine_event()
                .map_or(NodeMessage::Ignored, NodeMessage::Event)
        }
        LavalinkOpType::Unknown => NodeMessage::Ignored,
    };
    Ok(message)
}

impl LavalinkEvent {
    fn into_engine_event(self) -> Option<EngineEvent> {
        let event = match self {
            Self::TrackStartEvent(e) => EngineEvent::TrackStarted {
                guild_id: parse_guild(&e.guild_id)?,
                track: e.track.into(),
            },
            Self::TrackEndEvent(e) => EngineEvent::TrackEnded {
                guild_id: parse_guild(&e.guild_id)?,
                track: e.track.into(),
                reason: e.reason.into(),
            },
            Self::TrackExceptionEvent(e) => EngineEvent::TrackException {
                guild_id: parse_guild(&e.guild_id)?,
                track: e.track.into(),
                message: e.exception.describe(),
            },
            Self::TrackStuckEvent(e) => EngineEvent::TrackStuck {
                guild_id: parse_guild(&e.guild_id)?,
                track: e.track.into(),
                threshold: Duration::from_millis(e.threshold_ms),
            },
            Self::WebSocketClosedEvent(e) => {
                debug!("Socket de voz cerrado (remoto: {})", e.by_remote);
                EngineEvent::ConnectionClosed {
                    guild_id: Some(parse_guild(&e.guild_id)?),
                    code: Some(e.code),
                    reason: e.reason,
                }
            }
            Self::Unknown => return None,
        };
        Some(event)
    }
}

/// Los ids de guild llegan como string; cero no es un id válido.
fn parse_guild(raw: &str) -> Option<GuildId> {
    raw.parse::<u64>().ok().filter(|id| *id != 0).map(GuildId::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TRACK_JSON: &str = r#"{
        "encoded": "QAAAjQIAJVJpY2sgQXN0bGV5",
        "info": {
            "identifier": "dQw4w9WgXcQ",
            "isSeekable": true,
            "author": "RickAstleyVEVO",
            "length": 212000,
            "isStream": false,
            "position": 0,
            "title": "Rick Astley - Never Gonna Give You Up",
            "uri": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "artworkUrl": null,
            "isrc": null,
            "sourceName": "youtube"
        },
        "pluginInfo": {},
        "userData": {}
    }"#;

    fn event_json(body: &str) -> String {
        format!(r#"{{"op":"event","guildId":"123",{body},"track":{TRACK_JSON}}}"#)
    }

    #[test]
    fn decodes_ready() {
        let message = decode(r#"{"op":"ready","resumed":false,"sessionId":"la1"}"#).unwrap();
        assert_eq!(
            message,
            NodeMessage::Ready(ReadyOp {
                resumed: false,
                session_id: "la1".to_string()
            })
        );
    }

    #[test]
    fn decodes_track_end_with_reason() {
        let text = event_json(r#""type":"TrackEndEvent","reason":"finished""#);
        let NodeMessage::Event(EngineEvent::TrackEnded {
            guild_id,
            track,
            reason,
        }) = decode(&text).unwrap()
        else {
            panic!("expected track end");
        };
        assert_eq!(guild_id, GuildId::new(123));
        assert_eq!(reason, TrackEndReason::Finished);
        assert_eq!(track.duration(), Duration::from_millis(212000));
        assert_eq!(track.info().source_name, "youtube");
    }

    #[test]
    fn play_id_travels_through_user_data() {
        let play = UpdatePlayer {
            track: Some(UpdatePlayerTrack {
                encoded: Some("QAAA".to_string()),
                user_data: Some(TrackUserData { play_id: Some(7) }),
            }),
            paused: Some(false),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&play).unwrap(),
            serde_json::json!({ "track": { "encoded": "QAAA", "userData": { "playId": 7 } }, "paused": false })
        );

        let text = event_json(r#""type":"TrackEndEvent","reason":"loadFailed""#)
            .replace(r#""userData": {}"#, r#""userData": {"playId": 7}"#);
        let NodeMessage::Event(EngineEvent::TrackEnded { track, .. }) = decode(&text).unwrap() else {
            panic!("expected track end");
        };
        assert_eq!(track.play_id(), Some(7));

        // Tracks de búsqueda llegan sin userData propio
        let plain = event_json(r#""type":"TrackStartEvent""#);
        let NodeMessage::Event(EngineEvent::TrackStarted { track, .. }) = decode(&plain).unwrap() else {
            panic!("expected track start");
        };
        assert_eq!(track.play_id(), None);
    }

    #[test]
    fn decodes_stuck_and_exception() {
        let stuck = event_json(r#""type":"TrackStuckEvent","thresholdMs":10000"#);
        assert!(matches!(
            decode(&stuck).unwrap(),
            NodeMessage::Event(EngineEvent::TrackStuck { threshold, .. }) if threshold == Duration::from_secs(10)
        ));

        let exception = event_json(
            r#""type":"TrackExceptionEvent","exception":{"message":"Video unavailable","severity":"common","cause":"x"}"#,
        );
        let NodeMessage::Event(EngineEvent::TrackException { message, .. }) = decode(&exception).unwrap()
        else {
            panic!("expected exception");
        };
        assert_eq!(message, "Video unavailable (common)");
    }

    #[test]
    fn voice_socket_close_maps_to_connection_closed() {
        let text = r#"{"op":"event","type":"WebSocketClosedEvent","guildId":"9","code":4006,"reason":"Session is no longer valid","byRemote":true}"#;
        assert_eq!(
            decode(text).unwrap(),
            NodeMessage::Event(EngineEvent::ConnectionClosed {
                guild_id: Some(GuildId::new(9)),
                code: Some(4006),
                reason: "Session is no longer valid".to_string(),
            })
        );
    }

    #[test]
    fn player_update_carries_position() {
        let text = r#"{"op":"playerUpdate","guildId":"5","state":{"time":1,"position":42000,"connected":true,"ping":20}}"#;
        assert_eq!(
            decode(text).unwrap(),
            NodeMessage::Event(EngineEvent::PlayerUpdate {
                guild_id: GuildId::new(5),
                position: Duration::from_secs(42),
            })
        );
    }

    #[test]
    fn stats_unknown_ops_and_zero_guilds_are_ignored() {
        let stats = r#"{"op":"stats","players":1,"playingPlayers":1,"uptime":123,"memory":{},"cpu":{}}"#;
        assert_eq!(decode(stats).unwrap(), NodeMessage::Ignored);
        assert_eq!(decode(r#"{"op":"somethingNew"}"#).unwrap(), NodeMessage::Ignored);

        let zero = format!(
            r#"{{"op":"event","type":"TrackStartEvent","guildId":"0","track":{TRACK_JSON}}}"#
        );
        assert_eq!(decode(&zero).unwrap(), NodeMessage::Ignored);
    }

    #[test]
    fn decodes_load_results() {
        let search: LoadResult =
            serde_json::from_str(&format!(r#"{{"loadType":"search","data":[{TRACK_JSON}]}}"#)).unwrap();
        assert!(matches!(search, LoadResult::Search(ref tracks) if tracks.len() == 1));

        let playlist: LoadResult = serde_json::from_str(&format!(
            r#"{{"loadType":"playlist","data":{{"info":{{"name":"Mix","selectedTrack":-1}},"pluginInfo":{{}},"tracks":[{TRACK_JSON},{TRACK_JSON}]}}}}"#
        ))
        .unwrap();
        let LoadResult::Playlist(data) = playlist else {
            panic!("expected playlist");
        };
        assert_eq!(data.info.name, "Mix");
        assert_eq!(data.tracks.len(), 2);

        let empty: LoadResult = serde_json::from_str(r#"{"loadType":"empty","data":{}}"#).unwrap();
        assert!(matches!(empty, LoadResult::Empty(_)));

        let error: LoadResult = serde_json::from_str(
            r#"{"loadType":"error","data":{"message":"boom","severity":"fault","cause":"java"}}"#,
        )
        .unwrap();
        assert!(matches!(error, LoadResult::Error(e) if e.severity == "fault"));
    }

    #[test]
    fn stop_request_serializes_null_track() {
        let body = UpdatePlayer {
            track: Some(UpdatePlayerTrack {
                encoded: None,
                user_data: None,
            }),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "track": { "encoded": null } })
        );

        let voice = UpdatePlayer {
            voice: Some(VoiceState {
                token: "t".to_string(),
                endpoint: "e".to_string(),
                session_id: "s".to_string(),
            }),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&voice).unwrap(),
            serde_json::json!({ "voice": { "token": "t", "endpoint": "e", "sessionId": "s" } })
        );
    }
}
