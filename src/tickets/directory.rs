use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::channels::{ChannelId, ChannelRef, UserId};
use crate::tickets::categories::Category;
use crate::tickets::TicketError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticket {
    pub owner: UserId,
    pub owner_tag: String,
    pub category: &'static Category,
    /// `None` while the reservation is still being provisioned.
    pub channel: Option<ChannelRef>,
    pub voice_channel: Option<ChannelRef>,
    pub created_at: DateTime<Utc>,
    pub status: TicketStatus,
}

impl Ticket {
    fn reserved(owner: UserId, owner_tag: String, category: &'static Category) -> Self {
        Self {
            owner,
            owner_tag,
            category,
            channel: None,
            voice_channel: None,
            created_at: Utc::now(),
            status: TicketStatus::Open,
        }
    }

    pub fn channel_id(&self) -> Option<&ChannelId> {
        self.channel.as_ref().map(|c| &c.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClosingTransition {
    Started(Ticket),
    AlreadyClosing,
    NotFound,
}

#[derive(Debug, Default)]
struct DirectoryState {
    by_owner: HashMap<UserId, Ticket>,
    by_channel: HashMap<ChannelId, UserId>,
}

impl DirectoryState {
    fn remove_owner(&mut self, owner: &UserId) -> Option<Ticket> {
        let mut ticket = self.by_owner.remove(owner)?;
        if let Some(channel) = ticket.channel_id() {
            self.by_channel.remove(channel);
        }
        ticket.status = TicketStatus::Closed;
        Some(ticket)
    }

    fn ticket_for_channel_mut(&mut self, channel: &ChannelId) -> Option<&mut Ticket> {
        let owner = self.by_channel.get(channel)?;
        self.by_owner.get_mut(owner)
    }
}

/// Active tickets, keyed by owner so that each user holds at most one.
#[derive(Debug, Default)]
pub struct TicketDirectory {
    state: RwLock<DirectoryState>,
}

impl TicketDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the owner's ticket slot. The check and the insert happen under one write lock.
    pub async fn try_reserve(
        &self,
        owner: &UserId,
        owner_tag: &str,
        category: &'static Category,
    ) -> Result<Ticket, TicketError> {
        let mut state = self.state.write().await;

        if let Some(existing) = state.by_owner.get(owner) {
            if existing.status != TicketStatus::Closed {
                return Err(TicketError::Conflict {
                    existing: existing.channel.clone(),
                });
            }
        }

        let ticket = Ticket::reserved(owner.clone(), owner_tag.to_string(), category);
        state.by_owner.insert(owner.clone(), ticket.clone());
        debug!("Reserved ticket slot for {owner} ({})", category.id);
        Ok(ticket)
    }

    /// Binds provisioned channels to an existing reservation.
    pub async fn attach_channels(
        &self,
        owner: &UserId,
        channel: ChannelRef,
        voice_channel: Option<ChannelRef>,
    ) -> Option<Ticket> {
        let mut state = self.state.write().await;
        let ticket = state.by_owner.get_mut(owner)?;
        let previous = ticket.channel.replace(channel.clone());
        ticket.voice_channel = voice_channel;
        let ticket = ticket.clone();
        if let Some(previous) = previous {
            state.by_channel.remove(&previous.id);
        }
        state.by_channel.insert(channel.id, owner.clone());
        Some(ticket)
    }

    pub async fn release(&self, channel: &ChannelId) -> Option<Ticket> {
        let mut state = self.state.write().await;
        let owner = state.by_channel.get(channel).cloned()?;
        state.remove_owner(&owner)
    }

    pub async fn release_owner(&self, owner: &UserId) -> Option<Ticket> {
        self.state.write().await.remove_owner(owner)
    }

    pub async fn find(&self, channel: &ChannelId) -> Option<Ticket> {
        let state = self.state.read().await;
        let owner = state.by_channel.get(channel)?;
        state.by_owner.get(owner).cloned()
    }

    pub async fn find_by_owner(&self, owner: &UserId) -> Option<Ticket> {
        self.state.read().await.by_owner.get(owner).cloned()
    }

    pub async fn begin_closing(&self, channel: &ChannelId) -> ClosingTransition {
        let mut state = self.state.write().await;
        match state.ticket_for_channel_mut(channel) {
            None => ClosingTransition::NotFound,
            Some(ticket) if ticket.status == TicketStatus::Open => {
                ticket.status = TicketStatus::Closing;
                ClosingTransition::Started(ticket.clone())
            }
            Some(_) => ClosingTransition::AlreadyClosing,
        }
    }

    /// Returns a closing ticket to `Open`. False if the ticket is gone or was not closing.
    pub async fn abort_closing(&self, channel: &ChannelId) -> bool {
        let mut state = self.state.write().await;
        match state.ticket_for_channel_mut(channel) {
            Some(ticket) if ticket.status == TicketStatus::Closing => {
                ticket.status = TicketStatus::Open;
                true
            }
            _ => false,
        }
    }

    pub async fn list(&self) -> Vec<Ticket> {
        let state = self.state.read().await;
        let mut tickets: Vec<Ticket> = state.by_owner.values().cloned().collect();
        tickets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.owner.cmp(&b.owner)));
        tickets
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.by_owner.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
