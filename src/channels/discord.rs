use crate::channels::{
    Button, ButtonStyle, ChannelError, ChannelId, ChannelKind, ChannelRef, ChannelSpec,
    ChatPlatform, Embed, Member, OutgoingMessage, OverwriteTarget, Permission, RoleId, UserId,
};
use async_trait::async_trait;
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Clone)]
pub struct DiscordBotConfig {
    pub token: String,
    pub guild_id: String,
    pub api_base: String,
}

/// REST client for a single guild.
pub struct DiscordClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    guild_id: String,
}

impl DiscordClient {
    pub fn new(config: &DiscordBotConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            guild_id: config.guild_id.clone(),
        }
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// Resolves the bot's own account; fails with `AuthenticationFailed` on a bad token.
    pub async fn current_user(&self) -> Result<DiscordUser, ChannelError> {
        let response = self
            .client
            .get(format!("{}/users/@me", self.base_url))
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| ChannelError::NetworkError(e.to_string()))?;

        let response = check_status(response).await?;
        parse_json(response).await
    }

    async fn open_dm_channel(&self, user: &UserId) -> Result<ChannelId, ChannelError> {
        let response = self
            .client
            .post(format!("{}/users/@me/channels", self.base_url))
            .header("Authorization", self.auth())
            .json(&CreateDMChannel {
                recipient_id: user.as_str().to_string(),
            })
            .send()
            .await
            .map_err(|e| ChannelError::NetworkError(e.to_string()))?;

        let response = check_status(response).await?;
        let channel: DiscordChannel = parse_json(response).await?;
        Ok(ChannelId::new(channel.id))
    }

    fn build_overwrite(
        target: &OverwriteTarget,
        allow: &[Permission],
        deny: &[Permission],
    ) -> DiscordOverwrite {
        let (id, kind) = match target {
            OverwriteTarget::Role(role) => (role.as_str().to_string(), 0),
            OverwriteTarget::Member(user) => (user.as_str().to_string(), 1),
        };
        DiscordOverwrite {
            id,
            kind,
            allow: Permission::mask(allow).to_string(),
            deny: Permission::mask(deny).to_string(),
        }
    }

    fn create_embeds(embeds: &[Embed]) -> Vec<DiscordEmbed> {
        embeds
            .iter()
            .map(|embed| DiscordEmbed {
                title: embed.title.clone(),
                description: embed.description.clone(),
                color: embed.color,
                image: embed.image_url.clone().map(|url| EmbedImage { url }),
                fields: embed
                    .fields
                    .iter()
                    .map(|f| EmbedField {
                        name: f.name.clone(),
                        value: f.value.clone(),
                        inline: Some(f.inline),
                    })
                    .collect(),
                footer: embed.footer.clone().map(|text| EmbedFooter { text }),
                timestamp: embed.timestamp.map(|t| t.to_rfc3339()),
            })
            .collect()
    }

    fn create_components(rows: &[Vec<Button>]) -> Vec<ActionRow> {
        rows.iter()
            .filter(|row| !row.is_empty())
            .map(|row| ActionRow {
                kind: 1,
                components: row
                    .iter()
                    .map(|button| ButtonComponent {
                        kind: 2,
                        style: match button.style {
                            ButtonStyle::Primary => 1,
                            ButtonStyle::Secondary => 2,
                            ButtonStyle::Danger => 4,
                        },
                        label: button.label.clone(),
                        custom_id: button.custom_id.clone(),
                        emoji: button.emoji.clone().map(|name| ComponentEmoji { name }),
                    })
                    .collect(),
            })
            .collect()
    }

    fn build_payload(message: &OutgoingMessage) -> MessagePayload {
        MessagePayload {
            content: message.content.clone(),
            embeds: Self::create_embeds(&message.embeds),
            components: Self::create_components(&message.components),
            attachments: message
                .attachments
                .iter()
                .enumerate()
                .map(|(id, a)| AttachmentRef {
                    id,
                    filename: a.filename.clone(),
                })
                .collect(),
        }
    }

    async fn post_message(
        &self,
        channel: &ChannelId,
        message: &OutgoingMessage,
    ) -> Result<(), ChannelError> {
        let payload = Self::build_payload(message);
        let request = self
            .client
            .post(format!("{}/channels/{}/messages", self.base_url, channel))
            .header("Authorization", self.auth());

        let request = if message.attachments.is_empty() {
            request.json(&payload)
        } else {
            let payload_json = serde_json::to_string(&payload).map_err(|e| ChannelError::ApiError {
                code: None,
                message: e.to_string(),
            })?;
            let mut form = Form::new().text("payload_json", payload_json);
            for (index, attachment) in message.attachments.iter().enumerate() {
                let part = Part::bytes(attachment.content.clone())
                    .file_name(attachment.filename.clone())
                    .mime_str("text/plain; charset=utf-8")
                    .map_err(|e| ChannelError::ApiError {
                        code: None,
                        message: e.to_string(),
                    })?;
                form = form.part(format!("files[{index}]"), part);
            }
            request.multipart(form)
        };

        let response = request
            .send()
            .await
            .map_err(|e| ChannelError::NetworkError(e.to_string()))?;
        check_status(response).await?;
        debug!("Message delivered to channel {channel}");
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ChannelError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());
        return Err(ChannelError::RateLimited { retry_after });
    }

    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED => Err(ChannelError::AuthenticationFailed(error_text)),
        StatusCode::NOT_FOUND => Err(ChannelError::NotFound(error_text)),
        _ => Err(ChannelError::ApiError {
            code: Some(status.to_string()),
            message: error_text,
        }),
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ChannelError> {
    response.json::<T>().await.map_err(|e| ChannelError::ApiError {
        code: None,
        message: e.to_string(),
    })
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn create_channel(&self, spec: &ChannelSpec) -> Result<ChannelRef, ChannelError> {
        let body = CreateGuildChannel {
            name: spec.name.clone(),
            kind: match spec.kind {
                ChannelKind::Text => 0,
                ChannelKind::Voice => 2,
            },
            parent_id: spec.parent.as_ref().map(|p| p.as_str().to_string()),
            permission_overwrites: spec
                .overwrites
                .iter()
                .map(|o| Self::build_overwrite(&o.target, &o.allow, &o.deny))
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/guilds/{}/channels", self.base_url, self.guild_id))
            .header("Authorization", self.auth())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::NetworkError(e.to_string()))?;

        let response = check_status(response).await?;
        let channel: DiscordChannel = parse_json(response).await?;
        Ok(ChannelRef::new(
            channel.id,
            channel.name.unwrap_or_else(|| spec.name.clone()),
        ))
    }

    async fn delete_channel(&self, channel: &ChannelId) -> Result<(), ChannelError> {
        let response = self
            .client
            .delete(format!("{}/channels/{}", self.base_url, channel))
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| ChannelError::NetworkError(e.to_string()))?;

        check_status(response).await?;
        Ok(())
    }

    async fn send_message(
        &self,
        channel: &ChannelId,
        message: &OutgoingMessage,
    ) -> Result<(), ChannelError> {
        self.post_message(channel, message).await
    }

    async fn send_direct_message(
        &self,
        user: &UserId,
        message: &OutgoingMessage,
    ) -> Result<(), ChannelError> {
        let dm_channel = self.open_dm_channel(user).await?;
        self.post_message(&dm_channel, message).await
    }

    async fn fetch_member(&self, user: &UserId) -> Result<Option<Member>, ChannelError> {
        let response = self
            .client
            .get(format!(
                "{}/guilds/{}/members/{}",
                self.base_url, self.guild_id, user
            ))
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| ChannelError::NetworkError(e.to_string()))?;

        let response = match check_status(response).await {
            Ok(response) => response,
            Err(ChannelError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let member: DiscordMember = parse_json(response).await?;
        Ok(Some(Member {
            id: UserId::new(member.user.id.clone()),
            tag: member.user.tag(),
            username: member.user.username,
            roles: member.roles.into_iter().map(RoleId::new).collect(),
        }))
    }
}

#[derive(Debug, Serialize)]
struct CreateGuildChannel {
    name: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    permission_overwrites: Vec<DiscordOverwrite>,
}

#[derive(Debug, Serialize)]
struct DiscordOverwrite {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    allow: String,
    deny: String,
}

#[derive(Debug, Deserialize)]
struct DiscordChannel {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateDMChannel {
    recipient_id: String,
}

#[derive(Debug, Serialize)]
struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    embeds: Vec<DiscordEmbed>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    components: Vec<ActionRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentRef>,
}

#[derive(Debug, Serialize)]
struct AttachmentRef {
    id: usize,
    filename: String,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbedImage {
    url: String,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: String,
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline: Option<bool>,
}

#[derive(Debug, Serialize)]
struct EmbedFooter {
    text: String,
}

#[derive(Debug, Serialize)]
struct ActionRow {
    #[serde(rename = "type")]
    kind: u8,
    components: Vec<ButtonComponent>,
}

#[derive(Debug, Serialize)]
struct ButtonComponent {
    #[serde(rename = "type")]
    kind: u8,
    style: u8,
    label: String,
    custom_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    emoji: Option<ComponentEmoji>,
}

#[derive(Debug, Serialize)]
struct ComponentEmoji {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DiscordMember {
    user: DiscordUser,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
}

impl DiscordUser {
    /// Legacy `name#1234` tag, or the bare username for migrated accounts.
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(d) if !d.is_empty() && d != "0" => format!("{}#{}", self.username, d),
            _ => self.username.clone(),
        }
    }
}
