//! # Rhea
//!
//! Discord music bot: slash commands resolve searches through a Lavalink
//! node and feed a per-guild playback queue with loop modes. Track
//! lifecycle events reported by the node drive the queue forward.
//!
//! - [`audio`]: sessions, queue operations, event routing and the Lavalink adapter
//! - [`bot`]: serenity event handler, slash commands and Discord adapters
//! - [`config`]: environment-based configuration
//! - [`error`]: recoverable errors and their user-facing messages
//! - [`ui`]: response embeds

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod ui;
