//! # Bot Module
//!
//! Discord event handling for Rhea.
//!
//! This module contains:
//! - Command registration and handling
//! - Voice state tracking (cleanup on disconnect, auto-leave when alone)
//! - The Discord adapters of the audio core ([`voice`])
//!
//! ## Architecture
//!
//! The bot is built around the [`RheaBot`] struct which implements
//! Serenity's [`EventHandler`] trait. It holds:
//!
//! - The Lavalink node, connected once the gateway is ready
//! - The [`SessionRegistry`] with one playback session per guild
//! - The [`QueueController`] used by every command

use anyhow::Result;
use serenity::{
    all::{ActivityData, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod voice;

use crate::{
    audio::{lavalink::LavalinkNode, QueueController, SessionRegistry},
    config::Config,
};

/// Main Discord event handler.
///
/// All shared state lives behind [`Arc`]s; per-guild state is owned by the
/// [`SessionRegistry`].
pub struct RheaBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    /// Nodo Lavalink (REST + WebSocket de eventos)
    node: Arc<LavalinkNode>,
    registry: Arc<SessionRegistry>,
    controller: QueueController,
}

impl RheaBot {
    pub fn new(config: Arc<Config>, node: Arc<LavalinkNode>, registry: Arc<SessionRegistry>) -> Self {
        let controller = QueueController::new(registry.clone());
        Self {
            config,
            node,
            registry,
            controller,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn controller(&self) -> &QueueController {
        &self.controller
    }

    /// Cliente HTTP usado para resolver carátulas.
    pub fn http(&self) -> &reqwest::Client {
        self.node.http()
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands are registered per guild when a development guild is
    /// configured (instant propagation) and globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for RheaBot {
    /// Called when the bot is ready and connected to Discord.
    ///
    /// Connects the Lavalink node (once; reconnections go through the event
    /// router) and registers the slash commands.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        let application_id = ready.application.id;
        info!("🔧 Application ID: {}", application_id);
        if !self.config.matches_application(application_id.get()) {
            warn!(
                "⚠️ APPLICATION_ID ({:?}) no coincide con la aplicación del token ({}); los comandos se registran para esta última",
                self.config.application_id, application_id
            );
        }

        if !self.node.is_connected() {
            if let Err(e) = self.node.connect().await {
                error!("❌ Error al conectar con Lavalink: {}", e);
            }
        }

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        ctx.set_activity(Some(ActivityData::listening("/play")));
    }

    /// Handles incoming slash commands. Errors are answered inside the
    /// handler; what reaches this point is only logged.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Tracks voice membership.
    ///
    /// - **Bot disconnected**: destroys the guild's session
    /// - **Bot moved**: the session follows it to the new channel
    /// - **Bot left alone**: destroys the session when auto-leave is enabled
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let current_user_id = ctx.cache.current_user().id;

        // Detectar si el bot fue desconectado o movido
        if new.user_id == current_user_id {
            match new.channel_id {
                None => {
                    if self.registry.remove(guild_id).await {
                        info!("🔌 Bot desconectado en guild {}, sesión eliminada", guild_id);
                    }
                }
                Some(channel_id) => {
                    self.registry.voice_moved(guild_id, channel_id).await;
                }
            }
            return;
        }

        if !self.config.auto_leave_empty {
            return;
        }

        let Some(session) = self.registry.get(guild_id) else {
            return;
        };
        let bot_channel = session.lock().await.voice_channel();

        // Solo interesa alguien que salió del canal del bot
        let left_bot_channel = old.as_ref().and_then(|o| o.channel_id) == Some(bot_channel)
            && new.channel_id != Some(bot_channel);
        if !left_bot_channel {
            return;
        }

        // El guard de la caché no puede cruzar un .await
        let listeners = {
            let Some(guild) = ctx.cache.guild(guild_id) else {
                warn!("Guild {} no encontrada en caché", guild_id);
                return;
            };
            guild
                .voice_states
                .values()
                .filter(|vs| vs.channel_id == Some(bot_channel) && vs.user_id != current_user_id)
                .filter(|vs| !vs.member.as_ref().is_some_and(|m| m.user.bot))
                .count()
        };

        if listeners == 0 && self.registry.remove(guild_id).await {
            info!("🚪 Canal vacío en guild {}, desconectando", guild_id);
        }
    }
}
