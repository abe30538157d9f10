use serenity::{
    all::{Timestamp, User},
    builder::{CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{LoopType, PlaybackStatus, SessionSnapshot, Track},
    error::sanitize,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Rhea";

/// Canciones por página en `/queue`
pub const QUEUE_PAGE_SIZE: usize = 10;

/// Footer con el usuario que pidió la canción, o el estándar.
fn requester_footer(requester: Option<&User>) -> CreateEmbedFooter {
    match requester {
        Some(user) => {
            let footer = CreateEmbedFooter::new(user.name.clone());
            match user.avatar_url() {
                Some(avatar) => footer.icon_url(avatar),
                None => footer,
            }
        }
        None => CreateEmbedFooter::new(STANDARD_FOOTER),
    }
}

fn track_duration_label(track: &Track) -> String {
    if track.is_stream() {
        "🔴 Stream".to_string()
    } else {
        format_duration(track.duration())
    }
}

fn base_track_embed(author: &str, track: &Track, artwork: Option<&str>) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .author(CreateEmbedAuthor::new(author))
        .title(track.title())
        .field("🎤 Canal", track.author(), true)
        .field("⏱️ Duración", track_duration_label(track), true);

    if let Some(url) = track.url() {
        embed = embed.url(url);
    }
    if let Some(artwork) = artwork {
        embed = embed.thumbnail(artwork);
    }

    embed
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(
    track: &Track,
    artwork: Option<&str>,
    position: Option<Duration>,
    requester: Option<&User>,
) -> CreateEmbed {
    let mut embed = base_track_embed("Reproduciendo Ahora", track, artwork).color(colors::SUCCESS_GREEN);

    if let Some(position) = position.filter(|_| !track.is_stream()) {
        embed = embed.field(
            "⏩ Progreso",
            format!(
                "{} / {}",
                format_duration(position),
                format_duration(track.duration())
            ),
            true,
        );
    }

    embed
        .timestamp(Timestamp::now())
        .footer(requester_footer(requester))
}

/// Crea un embed para una canción que quedó en cola
pub fn create_track_queued_embed(
    track: &Track,
    artwork: Option<&str>,
    time_until_playing: Duration,
    queue_position: usize,
    requester: Option<&User>,
) -> CreateEmbed {
    base_track_embed("Canción en Cola", track, artwork)
        .field("⏳ Tiempo hasta reproducir", format_duration(time_until_playing), true)
        .field("📍 Posición en cola", queue_position.to_string(), false)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(requester_footer(requester))
}

/// Crea un embed para mostrar que una playlist fue agregada
pub fn create_playlist_queued_embed(
    name: &str,
    url: Option<&str>,
    track_count: usize,
    total_duration: Duration,
    requester: Option<&User>,
) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .author(CreateEmbedAuthor::new("Playlist en Cola"))
        .title(name)
        .field("📊 Canciones", track_count.to_string(), true)
        .field("⏱️ Duración total", format_duration(total_duration), true)
        .color(colors::MUSIC_PURPLE);

    if let Some(url) = url {
        embed = embed.url(url);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(requester_footer(requester))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &SessionSnapshot, page: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.current.is_none() && snapshot.queue.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    // Canción actual
    if let Some(current) = &snapshot.current {
        let status = match (snapshot.status, snapshot.loop_mode) {
            (PlaybackStatus::Paused, _) => "⏸️",
            (_, Some(LoopType::Single)) => "🔂",
            (_, Some(LoopType::Queue)) => "🔁",
            (_, None) => "▶️",
        };

        embed = embed.field(
            format!("{} Reproduciendo", status),
            format!(
                "**{}** - {} `[{}]`",
                sanitize(current.title()),
                sanitize(current.author()),
                track_duration_label(current)
            ),
            false,
        );
    }

    // Próximas canciones
    let (items, total_pages) = snapshot.page(page, QUEUE_PAGE_SIZE);
    let current_page = page.clamp(1, total_pages);
    if !items.is_empty() {
        let mut description = String::new();

        for (i, item) in items.iter().enumerate() {
            let position = (current_page - 1) * QUEUE_PAGE_SIZE + i + 1;
            description.push_str(&format!(
                "**{}**. {} - {} `[{}]`\n",
                position,
                sanitize(item.title()),
                sanitize(item.author()),
                track_duration_label(item)
            ));
        }

        embed = embed.field("Próximas canciones", description, false);
    }

    // Información adicional
    let mut info = format!("**Total:** {} canciones", snapshot.queue.len());

    let total = snapshot.total_duration();
    if total > Duration::ZERO {
        info.push_str(&format!(" • **Duración:** {}", format_duration(total)));
    }

    if let Some(mode) = snapshot.loop_mode {
        info.push_str(&format!(" • {}", loop_mode_label(Some(mode))));
    }

    embed = embed.field("Información", info, false);

    // Paginación
    if total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Rhea",
            current_page, total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

/// Texto del modo de repetición para las respuestas de `/loop`.
pub fn loop_mode_label(mode: Option<LoopType>) -> &'static str {
    match mode {
        Some(LoopType::Single) => "🔂 Repetir canción",
        Some(LoopType::Queue) => "🔁 Repetir cola",
        None => "➡️ Sin repetición",
    }
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Formatea una duración como `hh:mm:ss`
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
