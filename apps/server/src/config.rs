//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tunequeue_core::{CommandCooldowns, Identity, InMemoryCredentialStore};

/// Server configuration loaded from YAML with environment overrides.
///
/// Not `Debug`: it carries access tokens.
#[derive(Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the control-panel server to.
    /// Override: `TUNEQUEUE_BIND_PORT`
    pub bind_port: u16,

    /// `host:port` of the player's local API.
    /// Override: `TUNEQUEUE_PLAYER_HOST`
    pub player_host: String,

    /// Chat platform application client id.
    /// Override: `TUNEQUEUE_CLIENT_ID`
    pub client_id: String,

    /// Channel-point reward that counts as a song request.
    /// Override: `TUNEQUEUE_REWARD_ID`
    pub reward_id: Option<String>,

    /// Broadcaster access token.
    /// Override: `TUNEQUEUE_TWITCH_TOKEN`
    pub twitch_token: Option<String>,

    /// Bot access token. Without one, the broadcaster account reads and
    /// replies to chat.
    /// Override: `TUNEQUEUE_TWITCH_BOT_TOKEN`
    pub twitch_bot_token: Option<String>,

    /// Per-command cooldowns in seconds.
    pub cooldowns: CommandCooldowns,

    /// Accepted song duration range in seconds.
    pub min_song_duration_secs: u64,
    pub max_song_duration_secs: u64,

    /// Directory for the request history file.
    /// Override: `TUNEQUEUE_DATA_DIR` (handled by clap)
    pub data_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = tunequeue_core::Config::default();
        Self {
            bind_port: core.preferred_port,
            player_host: core.player_host,
            client_id: core.client_id,
            reward_id: None,
            twitch_token: None,
            twitch_bot_token: None,
            cooldowns: core.cooldowns,
            min_song_duration_secs: core.min_song_duration_secs,
            max_song_duration_secs: core.max_song_duration_secs,
            data_dir: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies overrides looked up by variable name.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(port) = var("TUNEQUEUE_BIND_PORT").and_then(|v| v.parse().ok()) {
            self.bind_port = port;
        }
        if let Some(host) = var("TUNEQUEUE_PLAYER_HOST").filter(|v| !v.trim().is_empty()) {
            self.player_host = host;
        }
        if let Some(client_id) = var("TUNEQUEUE_CLIENT_ID") {
            self.client_id = client_id;
        }
        if let Some(reward_id) = var("TUNEQUEUE_REWARD_ID") {
            self.reward_id = Some(reward_id).filter(|v| !v.is_empty());
        }
        if let Some(token) = var("TUNEQUEUE_TWITCH_TOKEN") {
            self.twitch_token = Some(token);
        }
        if let Some(token) = var("TUNEQUEUE_TWITCH_BOT_TOKEN") {
            self.twitch_bot_token = Some(token);
        }
    }

    /// Converts to tunequeue-core's Config type.
    pub fn to_core_config(&self) -> tunequeue_core::Config {
        tunequeue_core::Config {
            preferred_port: self.bind_port,
            player_host: self.player_host.clone(),
            client_id: self.client_id.clone(),
            reward_id: self.reward_id.clone(),
            cooldowns: self.cooldowns.clone(),
            min_song_duration_secs: self.min_song_duration_secs,
            max_song_duration_secs: self.max_song_duration_secs,
            data_dir: self.data_dir.clone(),
            ..Default::default()
        }
    }

    /// Seeds a credential store with the configured tokens.
    pub fn credentials(&self) -> InMemoryCredentialStore {
        let store = InMemoryCredentialStore::new();
        if let Some(token) = &self.twitch_token {
            store.set_token(Identity::Main, token.as_str());
        }
        if let Some(token) = &self.twitch_bot_token {
            store.set_token(Identity::Bot, token.as_str());
        }
        store
    }
}
