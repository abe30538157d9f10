use thiserror::Error;

/// Errores recuperables del núcleo de reproducción.
///
/// Todos se traducen a un mensaje para el usuario en la capa de comandos;
/// ninguno debe tumbar el proceso.
#[derive(Debug, Error)]
pub enum MusicError {
    /// La operación necesita una sesión que no existe (el bot no está en voz).
    #[error("no hay una sesión de reproducción activa en este servidor")]
    NoActiveSession,

    /// Discord rechazó la conexión al canal de voz.
    #[error("no se pudo conectar al canal de voz: {0}")]
    VoiceJoinFailed(String),

    /// El nodo de audio no encontró nada reproducible para la búsqueda.
    #[error("no se encontró nada para `{0}`")]
    TrackResolutionFailed(String),

    /// Se perdió el transporte con el nodo de audio. Se recupera solo.
    #[error("conexión con el nodo de audio perdida: {0}")]
    ConnectionLost(String),

    /// El nodo de audio respondió con un error.
    #[error("error del nodo de audio: {0}")]
    Engine(String),

    /// Fallo al hablar con la API de Discord.
    #[error("error de Discord: {0}")]
    Discord(String),

    #[error("el usuario no está en un canal de voz")]
    NotInVoice,

    #[error("el usuario está en otro canal de voz")]
    WrongChannel,
}

impl MusicError {
    /// Mensaje que se muestra al usuario en Discord.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoActiveSession => {
                "No estoy conectado a ningún canal de voz. Usa `/play` o `/join` primero.".to_string()
            }
            Self::VoiceJoinFailed(_) => {
                "No pude unirme a tu canal de voz. Revisa que tenga permisos para conectar y hablar."
                    .to_string()
            }
            Self::TrackResolutionFailed(query) => {
                format!("No encontré nada para `{}`", sanitize(query))
            }
            Self::ConnectionLost(_) => {
                "Perdí la conexión con el servidor de audio, reconectando. Inténtalo de nuevo en unos segundos."
                    .to_string()
            }
            Self::Engine(_) | Self::Discord(_) => {
                "Tuve un problema ejecutando tu comando. Si sigue pasando, avisa en el servidor de soporte."
                    .to_string()
            }
            Self::NotInVoice => "Debes estar en un canal de voz para usar este comando.".to_string(),
            Self::WrongChannel => {
                "Debes estar en el mismo canal de voz que yo para usar este comando.".to_string()
            }
        }
    }
}

impl From<reqwest::Error> for MusicError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::ConnectionLost(err.to_string())
        } else {
            Self::Engine(err.to_string())
        }
    }
}

/// Escapa el markdown de Discord dentro de texto controlado por el usuario.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '~' | '`' | '|' | '>') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
