use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: Option<u64>,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Lavalink
    pub lavalink_host: String,
    pub lavalink_port: u16,
    pub lavalink_password: String,
    pub lavalink_secure: bool,

    // Búsqueda
    pub default_search_prefix: String,

    // Features
    pub auto_leave_empty: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_env_with(|key| std::env::var(key).ok())?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// `load()` passes the process environment; tests pass a map.
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            application_id: var("APPLICATION_ID")
                .map(|v| v.parse())
                .transpose()
                .context("APPLICATION_ID inválido")?,
            guild_id: var("GUILD_ID").and_then(|s| s.parse().ok()),

            // Lavalink
            lavalink_host: var("LAVALINK_HOST").unwrap_or(defaults.lavalink_host),
            lavalink_port: var("LAVALINK_PORT")
                .map(|v| v.parse())
                .transpose()
                .context("LAVALINK_PORT inválido")?
                .unwrap_or(defaults.lavalink_port),
            lavalink_password: var("LAVALINK_PASSWORD")
                .or_else(|| var("LAVALINK_AUTH"))
                .unwrap_or(defaults.lavalink_password),
            lavalink_secure: var("LAVALINK_SECURE")
                .map(|v| v.parse())
                .transpose()
                .context("LAVALINK_SECURE debe ser true o false")?
                .unwrap_or(defaults.lavalink_secure),

            // Búsqueda
            default_search_prefix: var("DEFAULT_SEARCH_PREFIX")
                .unwrap_or(defaults.default_search_prefix),

            // Features
            auto_leave_empty: var("AUTO_LEAVE_EMPTY")
                .map(|v| v.parse())
                .transpose()
                .context("AUTO_LEAVE_EMPTY debe ser true o false")?
                .unwrap_or(defaults.auto_leave_empty),
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The Discord token must not be empty
    /// - The Lavalink host must not be empty and the port must not be 0
    /// - The search prefix must not be empty
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("Discord token must not be empty");
        }

        // Validate Lavalink settings
        if self.lavalink_host.trim().is_empty() {
            anyhow::bail!("Lavalink host must not be empty");
        }

        if self.lavalink_port == 0 {
            anyhow::bail!("Lavalink port must be greater than 0");
        }

        if self.default_search_prefix.trim().is_empty() {
            anyhow::bail!("Default search prefix must not be empty");
        }

        Ok(())
    }

    /// Whether the configured `APPLICATION_ID`, if any, belongs to the
    /// application behind the token.
    pub fn matches_application(&self, actual: u64) -> bool {
        self.application_id.is_none_or(|id| id == actual)
    }

    /// Base URL of the Lavalink REST API (`/v4`).
    pub fn lavalink_rest_url(&self) -> String {
        let scheme = if self.lavalink_secure { "https" } else { "http" };
        format!("{}://{}:{}/v4", scheme, self.lavalink_host, self.lavalink_port)
    }

    /// URL of the Lavalink event WebSocket.
    pub fn lavalink_ws_url(&self) -> String {
        let scheme = if self.lavalink_secure { "wss" } else { "ws" };
        format!("{}://{}:{}/v4/websocket", scheme, self.lavalink_host, self.lavalink_port)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token and the Lavalink password.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Lavalink: {}:{} (TLS={})\n  \
            Search: prefix {}\n  \
            Features: AutoLeave={}",
            self.application_id.map_or("auto".to_string(), |id| id.to_string()),
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.lavalink_host,
            self.lavalink_port,
            self.lavalink_secure,
            self.default_search_prefix,
            self.auto_leave_empty
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: None,
            guild_id: None,

            // Lavalink defaults
            lavalink_host: "localhost".to_string(),
            lavalink_port: 2333,
            lavalink_password: "youshallnotpass".to_string(),
            lavalink_secure: false,

            default_search_prefix: "ytsearch".to_string(),

            auto_leave_empty: true,
        }
    }
}
