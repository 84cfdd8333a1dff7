use crate::channels::discord::{DiscordBotConfig, DEFAULT_API_BASE};
use crate::channels::{ChannelId, RoleId};
use anyhow::{anyhow, Context};
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_CLOSE_GRACE_SECS: u64 = 5;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub discord: DiscordBotConfig,
    pub helpdesk: HelpdeskConfig,
    pub server: ServerConfig,
}

#[derive(Clone, Debug)]
pub struct HelpdeskConfig {
    /// Guild id, which doubles as the id of the `@everyone` role.
    pub guild_id: String,
    pub staff_role: RoleId,
    /// Parent category under which ticket channels are created.
    pub ticket_parent: ChannelId,
    pub log_channel: ChannelId,
    pub close_grace: Duration,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Self::from_vars(&std::env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, anyhow::Error> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| get(key).ok_or_else(|| anyhow!("{key} is not set"));

        let token = get("DISCORD_TOKEN")
            .or_else(|| get("TOKEN"))
            .ok_or_else(|| anyhow!("DISCORD_TOKEN is not set"))?;
        let guild_id = require("GUILD_ID")?;

        let close_grace = match get("CLOSE_GRACE_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("CLOSE_GRACE_SECS must be a number of seconds, got {raw}"))?,
            None => DEFAULT_CLOSE_GRACE_SECS,
        };

        let port = match get("HELPDESK_PORT").or_else(|| get("PORT")) {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("HELPDESK_PORT must be a port number, got {raw}"))?,
            None => 3000,
        };

        Ok(AppConfig {
            discord: DiscordBotConfig {
                token,
                guild_id: guild_id.clone(),
                api_base: get("DISCORD_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            },
            helpdesk: HelpdeskConfig {
                guild_id,
                staff_role: RoleId::new(require("STAFF_ROLE_ID")?),
                ticket_parent: ChannelId::new(require("CATEGORY_ID")?),
                log_channel: ChannelId::new(require("LOG_CHANNEL_ID")?),
                close_grace: Duration::from_secs(close_grace),
            },
            server: ServerConfig {
                host: get("HELPDESK_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
                port,
            },
        })
    }
}
