use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{error, info, warn};

use crate::{
    audio::{LoopType, PlaybackStatus},
    bot::RheaBot,
    error::{sanitize, MusicError},
    ui::embeds,
};

/// Maneja comandos slash
///
/// Los errores de los handlers se responden al usuario aquí mismo; solo se
/// propaga un error si ni siquiera se pudo responder.
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &RheaBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    let options: Vec<String> = command
        .data
        .options
        .iter()
        .map(|opt| format!("{}={:?}", opt.name, opt.value))
        .collect();

    let result = match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await,
        "join" => handle_join(ctx, &command, bot, guild_id).await,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await,
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Comando no reconocido")
                            .ephemeral(true),
                    ),
                )
                .await?;
            return Ok(());
        }
    };

    match result {
        Ok(()) => {
            info!(
                "📝 /{} ejecutado por {} en guild {} (canal {}) [{}]",
                command.data.name,
                command.user.name,
                guild_id,
                command.channel_id,
                options.join(", ")
            );
            Ok(())
        }
        Err(e) => respond_error(ctx, &command, e).await,
    }
}

// Handlers específicos para cada comando

async fn handle_play(ctx: &Context, command: &CommandInteraction, bot: &RheaBot, guild_id: GuildId) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "search")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Búsqueda no proporcionada"))?;

    let voice_channel = user_voice_channel(ctx, guild_id, command.user.id).ok_or(MusicError::NotInVoice)?;
    ensure_same_channel(bot, guild_id, voice_channel).await?;

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    bot.registry()
        .get_or_create(guild_id, voice_channel, Some(command.channel_id))
        .await?;

    let resolved = bot.registry().engine().resolve(query).await?;
    let first = resolved
        .tracks
        .first()
        .cloned()
        .ok_or_else(|| MusicError::TrackResolutionFailed(query.to_string()))?;
    let playlist_name = resolved
        .is_playlist()
        .then(|| resolved.playlist_name.clone())
        .flatten();
    let total_duration = resolved.total_duration();

    let outcome = bot.controller().play(guild_id, resolved).await?;

    let embed = match playlist_name {
        Some(name) => embeds::create_playlist_queued_embed(
            &name,
            Some(query),
            outcome.added,
            total_duration,
            Some(&command.user),
        ),
        None => {
            let artwork = first.artwork(bot.http()).await;
            if outcome.started {
                embeds::create_now_playing_embed(&first, artwork.as_deref(), None, Some(&command.user))
            } else {
                embeds::create_track_queued_embed(
                    &first,
                    artwork.as_deref(),
                    outcome.time_until_playing,
                    outcome.position,
                    Some(&command.user),
                )
            }
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_skip(ctx: &Context, command: &CommandInteraction, bot: &RheaBot, guild_id: GuildId) -> Result<()> {
    let outcome = bot.controller().skip(guild_id).await?;

    let message = match &outcome.current {
        Some(next) => format!("⏭️ Saltado. Ahora suena **{}**", sanitize(next.title())),
        None => "⏹️ Saltado. No quedan canciones en la cola".to_string(),
    };
    respond(ctx, command, CreateInteractionResponseMessage::new().content(message)).await
}

async fn handle_loop(ctx: &Context, command: &CommandInteraction, bot: &RheaBot, guild_id: GuildId) -> Result<()> {
    let mode = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "mode")
        .and_then(|opt| opt.value.as_str());

    let Some(raw) = mode else {
        let snapshot = bot.controller().snapshot(guild_id).await?;
        let embed = embeds::create_info_embed(
            "Repetición",
            &format!("Modo actual: {}", embeds::loop_mode_label(snapshot.loop_mode)),
        );
        return respond(ctx, command, CreateInteractionResponseMessage::new().embed(embed)).await;
    };

    let mode = LoopType::parse(raw).ok_or_else(|| anyhow::anyhow!("Modo de repetición inválido: {}", raw))?;
    let mode = bot.controller().set_loop(guild_id, mode).await?;
    let message = format!("{} activado", embeds::loop_mode_label(mode));

    respond(ctx, command, CreateInteractionResponseMessage::new().content(message)).await
}

async fn handle_pause(ctx: &Context, command: &CommandInteraction, bot: &RheaBot, guild_id: GuildId) -> Result<()> {
    let message = match bot.controller().pause(guild_id).await? {
        PlaybackStatus::Paused => "⏸️ Reproducción pausada",
        _ => "❌ No hay nada reproduciéndose actualmente",
    };
    respond(ctx, command, CreateInteractionResponseMessage::new().content(message)).await
}

async fn handle_resume(ctx: &Context, command: &CommandInteraction, bot: &RheaBot, guild_id: GuildId) -> Result<()> {
    let message = match bot.controller().resume(guild_id).await? {
        PlaybackStatus::Playing => "▶️ Reproducción reanudada",
        PlaybackStatus::Paused => "❌ No se pudo reanudar la reproducción",
        PlaybackStatus::Idle => "❌ No hay nada en pausa",
    };
    respond(ctx, command, CreateInteractionResponseMessage::new().content(message)).await
}

async fn handle_queue(ctx: &Context, command: &CommandInteraction, bot: &RheaBot, guild_id: GuildId) -> Result<()> {
    let page = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "page")
        .and_then(|opt| opt.value.as_i64())
        .unwrap_or(1)
        .max(1) as usize;

    let snapshot = bot.controller().snapshot(guild_id).await?;
    let embed = embeds::create_queue_embed(&snapshot, page);

    respond(ctx, command, CreateInteractionResponseMessage::new().embed(embed)).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &RheaBot,
    guild_id: GuildId,
) -> Result<()> {
    let snapshot = bot.controller().snapshot(guild_id).await?;

    let Some(current) = &snapshot.current else {
        return respond(
            ctx,
            command,
            CreateInteractionResponseMessage::new()
                .content("❌ No hay nada reproduciéndose actualmente")
                .ephemeral(true),
        )
        .await;
    };

    let artwork = current.artwork(bot.http()).await;
    let embed = embeds::create_now_playing_embed(current, artwork.as_deref(), Some(snapshot.position), None);
    respond(ctx, command, CreateInteractionResponseMessage::new().embed(embed)).await
}

async fn handle_join(ctx: &Context, command: &CommandInteraction, bot: &RheaBot, guild_id: GuildId) -> Result<()> {
    let voice_channel = user_voice_channel(ctx, guild_id, command.user.id).ok_or(MusicError::NotInVoice)?;
    ensure_same_channel(bot, guild_id, voice_channel).await?;

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let session = bot
        .registry()
        .get_or_create(guild_id, voice_channel, Some(command.channel_id))
        .await?;
    session.lock().await.set_text_channel(command.channel_id);

    let embed = embeds::create_success_embed("Conectado", &format!("🔊 Conectado a <#{}>", voice_channel));
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_leave(ctx: &Context, command: &CommandInteraction, bot: &RheaBot, guild_id: GuildId) -> Result<()> {
    if !bot.registry().remove(guild_id).await {
        return Err(MusicError::NoActiveSession.into());
    }

    respond(
        ctx,
        command,
        CreateInteractionResponseMessage::new().content("👋 Desconectado del canal de voz"),
    )
    .await
}

// Funciones auxiliares

async fn respond(ctx: &Context, command: &CommandInteraction, message: CreateInteractionResponseMessage) -> Result<()> {
    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

/// Responde un error al usuario: mensaje efímero si la interacción aún no
/// tiene respuesta, o edición de la respuesta diferida si ya la tiene.
async fn respond_error(ctx: &Context, command: &CommandInteraction, err: anyhow::Error) -> Result<()> {
    let embed = match err.downcast_ref::<MusicError>() {
        Some(music_err) => {
            warn!("⚠️ /{} falló en {:?}: {}", command.data.name, command.guild_id, music_err);
            error_embed(music_err)
        }
        None => {
            error!("❌ Error inesperado en /{}: {:?}", command.data.name, err);
            embeds::create_error_embed(
                "Error",
                "Tuve un problema ejecutando tu comando. Inténtalo de nuevo en unos segundos.",
            )
        }
    };

    let created = command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed.clone())
                    .ephemeral(true),
            ),
        )
        .await;

    if created.is_err() {
        command
            .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
            .await?;
    }

    Ok(())
}

fn error_embed(err: &MusicError) -> CreateEmbed {
    let title = match err {
        MusicError::TrackResolutionFailed(_) => "Sin resultados",
        MusicError::NotInVoice | MusicError::WrongChannel => "Canal de voz",
        MusicError::NoActiveSession => "Sin sesión",
        MusicError::ConnectionLost(_) => "Conexión perdida",
        _ => "Error",
    };
    embeds::create_error_embed(title, &err.user_message())
}

/// Falla con `WrongChannel` si el bot ya está en otro canal de voz del guild.
async fn ensure_same_channel(bot: &RheaBot, guild_id: GuildId, channel: ChannelId) -> Result<(), MusicError> {
    if let Some(session) = bot.registry().get(guild_id) {
        if session.lock().await.voice_channel() != channel {
            return Err(MusicError::WrongChannel);
        }
    }
    Ok(())
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
