use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channels::{
    ChannelError, ChannelId, ChannelKind, ChannelSpec, ChatPlatform, Member, OutgoingMessage,
    OverwriteTarget, Permission, PermissionOverwrite, RoleId, UserId,
};
use crate::core::config::HelpdeskConfig;
use crate::tickets::categories::{self, Category};
use crate::tickets::directory::{ClosingTransition, Ticket, TicketDirectory, TicketStatus};
use crate::tickets::transcript::{TranscriptHeader, TranscriptStore};
use crate::tickets::{ui, TicketError};

pub const MIN_DESCRIPTION_CHARS: usize = 10;
pub const MAX_DESCRIPTION_CHARS: usize = 1000;

const TEXT_MEMBER_PERMISSIONS: &[Permission] = &[
    Permission::ViewChannel,
    Permission::SendMessages,
    Permission::ReadMessageHistory,
];
const VOICE_MEMBER_PERMISSIONS: &[Permission] = &[
    Permission::ViewChannel,
    Permission::Connect,
    Permission::Speak,
];

#[derive(Debug, Clone)]
pub struct CreateTicketRequest {
    pub owner: Member,
    pub category_id: String,
    pub description: String,
}

#[derive(Debug)]
pub enum CloseOutcome {
    /// Closure runs when the handle completes, unless cancelled first.
    Scheduled(JoinHandle<()>),
    AlreadyClosing,
    NotATicket,
    Forbidden,
}

impl CloseOutcome {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled(_))
    }
}

#[derive(Debug, Clone)]
pub struct ClosedTicket {
    pub ticket: Ticket,
    pub transcript: String,
    pub delivery_failures: Vec<TicketError>,
    pub teardown_failures: Vec<TicketError>,
}

/// Trims the description and checks its length in characters.
pub fn validate_description(raw: &str) -> Result<String, TicketError> {
    let description = raw.trim();
    let length = description.chars().count();
    if length < MIN_DESCRIPTION_CHARS {
        return Err(TicketError::Validation(format!(
            "The description must have at least {MIN_DESCRIPTION_CHARS} characters (got {length})."
        )));
    }
    if length > MAX_DESCRIPTION_CHARS {
        return Err(TicketError::Validation(format!(
            "The description must have at most {MAX_DESCRIPTION_CHARS} characters (got {length})."
        )));
    }
    Ok(description.to_string())
}

/// `ticket-` followed by the lowercased username with whitespace runs collapsed to `-`.
pub fn ticket_channel_name(username: &str) -> String {
    let slug = username
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    format!("ticket-{slug}")
}

pub fn voice_channel_name(category: &Category, username: &str) -> String {
    format!("🔊︱{}-{}", category.display_name, username)
}

pub struct TicketController {
    platform: Arc<dyn ChatPlatform>,
    directory: Arc<TicketDirectory>,
    transcripts: Arc<TranscriptStore>,
    settings: HelpdeskConfig,
    pending_closes: RwLock<HashMap<ChannelId, CancellationToken>>,
}

impl TicketController {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        directory: Arc<TicketDirectory>,
        transcripts: Arc<TranscriptStore>,
        settings: HelpdeskConfig,
    ) -> Self {
        Self {
            platform,
            directory,
            transcripts,
            settings,
            pending_closes: RwLock::new(HashMap::new()),
        }
    }

    pub fn directory(&self) -> &Arc<TicketDirectory> {
        &self.directory
    }

    pub fn transcripts(&self) -> &Arc<TranscriptStore> {
        &self.transcripts
    }

    pub fn settings(&self) -> &HelpdeskConfig {
        &self.settings
    }

    pub async fn pending_close_count(&self) -> usize {
        self.pending_closes.read().await.len()
    }

    /// Posts the category picker into `target`.
    pub async fn setup(&self, target: &ChannelId) -> Result<(), TicketError> {
        self.platform
            .send_message(target, &ui::picker_message())
            .await
            .map_err(|e| TicketError::Delivery(format!("category picker to {target}: {e}")))?;
        info!("Ticket picker posted in channel {target}");
        Ok(())
    }

    /// Fails with `Conflict` when the user already holds an open ticket.
    pub async fn check_eligibility(&self, owner: &UserId) -> Result<(), TicketError> {
        match self.directory.find_by_owner(owner).await {
            Some(existing) => Err(TicketError::Conflict {
                existing: existing.channel,
            }),
            None => Ok(()),
        }
    }

    pub async fn create_ticket(&self, request: CreateTicketRequest) -> Result<Ticket, TicketError> {
        let description = validate_description(&request.description)?;
        let category = categories::resolve(&request.category_id)
            .ok_or_else(|| TicketError::UnknownCategory(request.category_id.clone()))?;
        let owner = &request.owner;

        self.directory
            .try_reserve(&owner.id, &owner.tag, category)
            .await?;

        let mut created = Vec::new();
        match self
            .provision(owner, category, &description, &mut created)
            .await
        {
            Ok(ticket) => {
                info!(
                    "Ticket {} opened by {} ({})",
                    ticket.channel.as_ref().map(|c| c.name.as_str()).unwrap_or("?"),
                    owner.tag,
                    category.id
                );
                Ok(ticket)
            }
            Err(e) => {
                error!("Failed to create ticket for {}: {e}", owner.tag);
                self.rollback(&owner.id, &created).await;
                Err(TicketError::Provisioning(e))
            }
        }
    }

    async fn provision(
        &self,
        owner: &Member,
        category: &'static Category,
        description: &str,
        created: &mut Vec<ChannelId>,
    ) -> Result<Ticket, ChannelError> {
        let text = self
            .platform
            .create_channel(&self.text_channel_spec(owner))
            .await?;
        created.push(text.id.clone());

        let voice = self
            .platform
            .create_channel(&self.voice_channel_spec(owner, category))
            .await?;
        created.push(voice.id.clone());

        let ticket = self
            .directory
            .attach_channels(&owner.id, text.clone(), Some(voice))
            .await
            .ok_or_else(|| {
                ChannelError::NotFound(format!("reservation for {} was released", owner.id))
            })?;

        self.transcripts.open(&text.id).await;

        self.platform
            .send_message(
                &text.id,
                &ui::intro_message(&ticket, category, description, &self.settings.staff_role),
            )
            .await?;

        self.platform
            .send_message(
                &self.settings.log_channel,
                &ui::opened_log_message(&ticket, category),
            )
            .await?;

        Ok(ticket)
    }

    /// Undoes a partial creation. Every step tolerates resources that never existed.
    async fn rollback(&self, owner: &UserId, created: &[ChannelId]) {
        self.directory.release_owner(owner).await;
        for channel in created.iter().rev() {
            self.transcripts.discard(channel).await;
            if let Err(e) = self.platform.delete_channel(channel).await {
                warn!("Rollback could not delete channel {channel}: {e}");
            }
        }
    }

    fn private_overwrites(
        &self,
        owner: &UserId,
        granted: &[Permission],
        hidden: &[Permission],
    ) -> Vec<PermissionOverwrite> {
        vec![
            PermissionOverwrite::deny(
                OverwriteTarget::Role(RoleId::new(self.settings.guild_id.clone())),
                hidden,
            ),
            PermissionOverwrite::allow(OverwriteTarget::Member(owner.clone()), granted),
            PermissionOverwrite::allow(
                OverwriteTarget::Role(self.settings.staff_role.clone()),
                granted,
            ),
        ]
    }

    fn text_channel_spec(&self, owner: &Member) -> ChannelSpec {
        ChannelSpec {
            name: ticket_channel_name(&owner.username),
            kind: ChannelKind::Text,
            parent: Some(self.settings.ticket_parent.clone()),
            overwrites: self.private_overwrites(
                &owner.id,
                TEXT_MEMBER_PERMISSIONS,
                &[Permission::ViewChannel],
            ),
        }
    }

    fn voice_channel_spec(&self, owner: &Member, category: &Category) -> ChannelSpec {
        ChannelSpec {
            name: voice_channel_name(category, &owner.username),
            kind: ChannelKind::Voice,
            parent: Some(self.settings.ticket_parent.clone()),
            overwrites: self.private_overwrites(
                &owner.id,
                VOICE_MEMBER_PERMISSIONS,
                &[Permission::ViewChannel, Permission::Connect],
            ),
        }
    }

    fn may_close(&self, ticket: &Ticket, member: &Member) -> bool {
        member.id == ticket.owner || member.has_role(&self.settings.staff_role)
    }

    /// Moves the ticket to `Closing` and schedules closure after the grace period.
    pub async fn request_close(
        self: &Arc<Self>,
        channel: &ChannelId,
        requested_by: &Member,
    ) -> CloseOutcome {
        let Some(ticket) = self.directory.find(channel).await else {
            return CloseOutcome::NotATicket;
        };
        if !self.may_close(&ticket, requested_by) {
            warn!("{} tried to close ticket {channel} without permission", requested_by.tag);
            return CloseOutcome::Forbidden;
        }

        match self.directory.begin_closing(channel).await {
            ClosingTransition::Started(_) => {}
            ClosingTransition::AlreadyClosing => return CloseOutcome::AlreadyClosing,
            ClosingTransition::NotFound => return CloseOutcome::NotATicket,
        }

        let token = CancellationToken::new();
        self.pending_closes
            .write()
            .await
            .insert(channel.clone(), token.clone());

        let grace = self.settings.close_grace;
        if let Err(e) = self
            .platform
            .send_message(channel, &ui::close_countdown_message(grace))
            .await
        {
            warn!("Could not post close countdown in {channel}: {e}");
        }

        info!(
            "Ticket {channel} closing in {}s (requested by {})",
            grace.as_secs(),
            requested_by.tag
        );

        let controller = Arc::clone(self);
        let channel = channel.clone();
        let closed_by = requested_by.tag.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Pending close of {channel} was cancelled");
                }
                _ = tokio::time::sleep(grace) => {
                    controller.fire_scheduled_close(&channel, &closed_by, &token).await;
                }
            }
        });

        CloseOutcome::Scheduled(handle)
    }

    /// Cancels a pending close; the ticket returns to `Open`.
    pub async fn cancel_close(&self, channel: &ChannelId, requested_by: &Member) -> bool {
        if let Some(ticket) = self.directory.find(channel).await {
            if !self.may_close(&ticket, requested_by) {
                return false;
            }
        }

        {
            let mut pending = self.pending_closes.write().await;
            let Some(token) = pending.remove(channel) else {
                return false;
            };
            token.cancel();
        }
        self.directory.abort_closing(channel).await;

        if let Err(e) = self
            .platform
            .send_message(channel, &ui::close_cancelled_message(&requested_by.tag))
            .await
        {
            warn!("Could not post close cancellation in {channel}: {e}");
        }
        info!("Close of ticket {channel} cancelled by {}", requested_by.tag);
        true
    }

    async fn fire_scheduled_close(
        &self,
        channel: &ChannelId,
        closed_by: &str,
        token: &CancellationToken,
    ) {
        // Tokens are only cancelled under this lock, so an uncancelled token is still the pending entry.
        {
            let mut pending = self.pending_closes.write().await;
            if token.is_cancelled() || pending.remove(channel).is_none() {
                debug!("Close of {channel} no longer pending");
                return;
            }
        }
        if let Err(e) = self.close_now(channel, closed_by).await {
            warn!("Scheduled close of {channel} did nothing: {e}");
        }
    }

    /// Renders, delivers and tears down a ticket immediately.
    pub async fn close_now(
        &self,
        channel: &ChannelId,
        closed_by: &str,
    ) -> Result<ClosedTicket, TicketError> {
        {
            let mut pending = self.pending_closes.write().await;
            if let Some(token) = pending.remove(channel) {
                token.cancel();
            }
        }

        let ticket = self
            .directory
            .find(channel)
            .await
            .ok_or_else(|| TicketError::NotATicket(channel.clone()))?;
        let channel_name = ticket
            .channel
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| channel.to_string());

        let closed_at = Utc::now();
        let header = TranscriptHeader {
            channel_name: channel_name.clone(),
            opened_at: ticket.created_at,
            closed_at,
            closed_by: closed_by.to_string(),
        };
        let transcript = self
            .transcripts
            .render_and_close(channel, &header)
            .await
            .ok_or_else(|| TicketError::NotATicket(channel.clone()))?;

        let mut delivery_failures = Vec::new();

        let dm = ui::transcript_dm_message(
            &channel_name,
            &transcript,
            &ticket.created_at,
            &closed_at,
            closed_by,
        );
        match self.deliver_to_owner(&ticket, &dm).await {
            Ok(()) => info!("Transcript sent to {}", ticket.owner_tag),
            Err(e) => {
                warn!("Transcript for {channel_name} not delivered to owner: {e}");
                delivery_failures.push(e);
            }
        }

        let log = ui::closed_log_message(
            &channel_name,
            channel.as_str(),
            &transcript,
            &ticket.created_at,
            &closed_at,
            closed_by,
        );
        if let Err(e) = self
            .platform
            .send_message(&self.settings.log_channel, &log)
            .await
        {
            warn!("Transcript for {channel_name} not delivered to log channel: {e}");
            delivery_failures.push(TicketError::Delivery(format!("log channel: {e}")));
        }

        let ticket = self.directory.release(channel).await.unwrap_or_else(|| {
            debug!("Ticket {channel} was already released");
            Ticket {
                status: TicketStatus::Closed,
                ..ticket
            }
        });

        let mut teardown_failures = Vec::new();
        if let Some(voice) = &ticket.voice_channel {
            if let Some(e) = self.teardown(&voice.id).await {
                teardown_failures.push(e);
            }
        }
        if let Some(e) = self.teardown(channel).await {
            teardown_failures.push(e);
        }

        info!("Ticket {channel_name} closed by {closed_by}");
        Ok(ClosedTicket {
            ticket,
            transcript,
            delivery_failures,
            teardown_failures,
        })
    }

    async fn deliver_to_owner(
        &self,
        ticket: &Ticket,
        message: &OutgoingMessage,
    ) -> Result<(), TicketError> {
        let member = self
            .platform
            .fetch_member(&ticket.owner)
            .await
            .map_err(|e| TicketError::Delivery(format!("lookup of {}: {e}", ticket.owner_tag)))?
            .ok_or_else(|| {
                TicketError::Delivery(format!("{} is no longer a member", ticket.owner_tag))
            })?;

        self.platform
            .send_direct_message(&member.id, message)
            .await
            .map_err(|e| TicketError::Delivery(format!("direct message to {}: {e}", member.tag)))
    }

    async fn teardown(&self, channel: &ChannelId) -> Option<TicketError> {
        match self.platform.delete_channel(channel).await {
            Ok(()) => None,
            Err(ChannelError::NotFound(_)) => {
                debug!("Channel {channel} was already deleted");
                None
            }
            Err(e) => {
                error!("Could not delete channel {channel}: {e}");
                Some(TicketError::Teardown(format!("channel {channel}: {e}")))
            }
        }
    }
}
