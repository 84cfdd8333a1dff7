//! Ticket lifecycle: reservation, provisioning, message capture and closure.

pub mod api;
pub mod capture;
pub mod categories;
pub mod directory;
pub mod interactions;
pub mod lifecycle;
pub mod transcript;
pub mod ui;

pub use capture::MessageCapture;
pub use categories::Category;
pub use directory::{Ticket, TicketDirectory, TicketStatus};
pub use interactions::{handle_interaction, Interaction, InteractionReply};
pub use lifecycle::{CloseOutcome, ClosedTicket, CreateTicketRequest, TicketController};
pub use transcript::{TranscriptEntry, TranscriptStore};

use crate::channels::{ChannelError, ChannelId, ChannelRef};

#[derive(Debug, Clone, thiserror::Error)]
pub enum TicketError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Unknown category: {0}")]
    UnknownCategory(String),
    #[error("User already has an open ticket{}", .existing.as_ref().map(|c| format!(" in {}", c.name)).unwrap_or_default())]
    Conflict { existing: Option<ChannelRef> },
    #[error("Provisioning failed: {0}")]
    Provisioning(#[source] ChannelError),
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Teardown failed: {0}")]
    Teardown(String),
    #[error("Channel {0} is not a ticket")]
    NotATicket(ChannelId),
}

impl TicketError {
    /// Text shown to the member who triggered the failing request.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(reason) => format!("❌ {reason}"),
            Self::UnknownCategory(id) => format!("❌ Unknown ticket category `{id}`."),
            Self::Conflict {
                existing: Some(channel),
            } => format!("❌ You already have an open ticket in {}", channel.id.mention()),
            Self::Conflict { existing: None } => {
                "❌ Your ticket is already being created, please wait.".to_string()
            }
            Self::NotATicket(_) => "❌ This command can only be used in ticket channels.".to_string(),
            Self::Provisioning(_) | Self::Delivery(_) | Self::Teardown(_) => {
                "❌ An error occurred while processing your ticket. Please try again later."
                    .to_string()
            }
        }
    }
}
