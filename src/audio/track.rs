use std::{sync::Arc, time::Duration};
use tokio::sync::OnceCell;
use tracing::debug;

/// Metadatos de un track tal como los entrega el nodo de audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub identifier: String,
    pub title: String,
    pub author: String,
    pub uri: Option<String>,
    pub length: Duration,
    pub is_stream: bool,
    pub is_seekable: bool,
    pub source_name: String,
    pub artwork_url: Option<String>,
}

/// Un track reproducible. Es un valor inmutable: `encoded` es el handle
/// opaco que el nodo necesita para reproducirlo.
///
/// La carátula se resuelve bajo demanda y queda cacheada; los clones
/// comparten la misma caché.
///
/// `play_id` identifica cada vez que la sesión entrega el track al nodo; no
/// participa de la igualdad.
#[derive(Debug, Clone)]
pub struct Track {
    encoded: String,
    info: TrackInfo,
    play_id: Option<u64>,
    artwork: Arc<OnceCell<Option<String>>>,
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded && self.info == other.info
    }
}

impl Eq for Track {}

impl Track {
    pub fn new(encoded: impl Into<String>, info: TrackInfo) -> Self {
        Self {
            encoded: encoded.into(),
            info,
            play_id: None,
            artwork: Arc::new(OnceCell::new()),
        }
    }

    // Getters
    pub fn encoded(&self) -> &str {
        &self.encoded
    }
    pub fn info(&self) -> &TrackInfo {
        &self.info
    }
    pub fn title(&self) -> &str {
        &self.info.title
    }
    pub fn author(&self) -> &str {
        &self.info.author
    }
    pub fn url(&self) -> Option<&str> {
        self.info.uri.as_deref()
    }
    pub fn duration(&self) -> Duration {
        self.info.length
    }
    pub fn is_stream(&self) -> bool {
        self.info.is_stream
    }
    pub fn play_id(&self) -> Option<u64> {
        self.play_id
    }

    pub fn with_play_id(mut self, play_id: u64) -> Self {
        self.play_id = Some(play_id);
        self
    }

    /// Si ambos valores se refieren a la misma reproducción. Sin `play_id`
    /// en alguno de los dos solo se compara el track.
    pub fn same_play(&self, other: &Track) -> bool {
        if self != other {
            return false;
        }
        match (self.play_id, other.play_id) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }

    /// URL de la carátula, resolviéndola la primera vez que se pide.
    pub async fn artwork(&self, http: &reqwest::Client) -> Option<String> {
        self.artwork
            .get_or_init(|| resolve_artwork(&self.info, http))
            .await
            .clone()
    }

    /// Carátula ya resuelta, sin tocar la red.
    pub fn cached_artwork(&self) -> Option<&str> {
        self.artwork.get().and_then(|a| a.as_deref())
    }
}

async fn resolve_artwork(info: &TrackInfo, http: &reqwest::Client) -> Option<String> {
    if let Some(url) = &info.artwork_url {
        return Some(url.clone());
    }

    if info.source_name != "youtube" || info.identifier.is_empty() {
        return None;
    }

    // No todos los videos tienen miniatura en máxima resolución
    let maxres = format!(
        "https://img.youtube.com/vi/{}/maxresdefault.jpg",
        info.identifier
    );
    match http.head(&maxres).send().await {
        Ok(response) if response.status().is_success() => Some(maxres),
        _ => {
            debug!("🖼️ Sin maxresdefault para {}, usando hqdefault", info.identifier);
            Some(format!(
                "https://img.youtube.com/vi/{}/hqdefault.jpg",
                info.identifier
            ))
        }
    }
}

/// Resultado de resolver una búsqueda: uno o varios tracks, o una playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTracks {
    pub tracks: Vec<Track>,
    pub playlist_name: Option<String>,
}

impl ResolvedTracks {
    pub fn single(track: Track) -> Self {
        Self {
            tracks: vec![track],
            playlist_name: None,
        }
    }

    pub fn playlist(name: impl Into<String>, tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            playlist_name: Some(name.into()),
        }
    }

    pub fn is_playlist(&self) -> bool {
        self.playlist_name
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty())
    }

    /// Duración total, ignorando los streams en vivo.
    pub fn total_duration(&self) -> Duration {
        self.tracks
            .iter()
            .filter(|t| !t.is_stream())
            .map(Track::duration)
            .sum()
    }
}

#[cfg(test)]
pub(crate) fn test_track(id: &str) -> Track {
    Track::new(
        format!("encoded-{id}"),
        TrackInfo {
            identifier: id.to_string(),
            title: format!("Track {id}"),
            author: "Tester".to_string(),
            uri: Some(format!("https://example.com/{id}")),
            length: Duration::from_secs(180),
            is_stream: false,
            is_seekable: true,
            source_name: "http".to_string(),
            artwork_url: None,
        },
    )
}
