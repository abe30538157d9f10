//! # Audio Module
//!
//! Per-guild playback queues driven by a Lavalink audio node.
//!
//! ## Architecture
//!
//! ### [`session`] - Playback State
//! - Queue, current track, loop mode and status of one guild
//! - Pure state transitions that return the action the node must perform
//!
//! ### [`registry`] - Session Ownership
//! - One session per guild, created on voice join and destroyed on leave
//! - Sharded map, so guilds never block each other
//!
//! ### [`controller`] - Queue Operations
//! - Enqueue, play-next, skip, loop, pause and resume for the command layer
//!
//! ### [`events`] - Lifecycle Events
//! - Routes node events (ended, stuck, exception, closed) to the owning
//!   session's serialized worker
//!
//! ### [`lavalink`] - Node Adapter
//! - REST commands and WebSocket events for a Lavalink v4 node
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use rhea::audio::{controller::QueueController, registry::SessionRegistry};
//! use serenity::all::GuildId;
//! use std::sync::Arc;
//!
//! # async fn example(registry: Arc<SessionRegistry>) -> Result<(), rhea::error::MusicError> {
//! let controller = QueueController::new(registry.clone());
//! let guild_id = GuildId::new(123456789);
//!
//! let resolved = registry.engine().resolve("never gonna give you up").await?;
//! let outcome = controller.play(guild_id, resolved).await?;
//! println!("en cola en la posición {}", outcome.position);
//!
//! controller.skip(guild_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod engine;
pub mod events;
pub mod lavalink;
pub mod registry;
pub mod session;
pub mod track;

pub use controller::{PlayOutcome, QueueController, QueueOutcome};
pub use engine::{Notifier, PlaybackEngine, VoiceConnection, VoiceConnector};
pub use events::{EngineEvent, EventRouter, TrackEndReason};
pub use registry::SessionRegistry;
pub use session::{LoopType, PlaybackStatus, SessionSnapshot};
pub use track::{ResolvedTracks, Track, TrackInfo};
