use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use rhea::{
    audio::{lavalink::LavalinkNode, EventRouter, SessionRegistry},
    bot::{
        voice::{ChannelNotifier, SongbirdConnector},
        RheaBot,
    },
    config::Config,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rhea=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Rhea v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // El nodo necesita el id del bot antes de abrir el WebSocket
    let http = Arc::new(Http::new(&config.discord_token));
    let user_id = http.get_current_user().await?.id;
    info!("🤖 Bot ID: {}", user_id);

    // Nodo Lavalink y canal de eventos hacia el enrutador
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let node = Arc::new(LavalinkNode::new(&config, user_id, events_tx));

    // Sesiones por guild
    let songbird = Songbird::serenity();
    let registry = Arc::new(SessionRegistry::new(
        node.clone(),
        Arc::new(SongbirdConnector::new(songbird.clone())),
        Arc::new(ChannelNotifier::new(http.clone())),
    ));

    tokio::spawn(EventRouter::new(registry.clone()).run(events_rx));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Crear handler del bot
    let handler = RheaBot::new(config.clone(), node, registry);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                std::process::exit(0);
            }
            Err(e) => error!("Error al registrar Ctrl+C: {}", e),
        }
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
