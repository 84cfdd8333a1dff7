//! Button, modal and slash-command dispatch for the helpdesk.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::channels::{ChannelId, Member};
use crate::tickets::categories;
use crate::tickets::lifecycle::{
    CloseOutcome, CreateTicketRequest, TicketController, MAX_DESCRIPTION_CHARS,
    MIN_DESCRIPTION_CHARS,
};
use crate::tickets::ui::{
    CANCEL_CLOSE_ID, CLOSE_ID, CREATE_PREFIX, DESCRIPTION_FIELD, MODAL_PREFIX,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interaction {
    Button {
        custom_id: String,
        channel_id: ChannelId,
        user: Member,
    },
    ModalSubmit {
        custom_id: String,
        channel_id: ChannelId,
        user: Member,
        #[serde(default)]
        fields: HashMap<String, String>,
    },
    Command {
        name: String,
        channel_id: ChannelId,
        user: Member,
        #[serde(default)]
        target_channel: Option<ChannelId>,
        #[serde(default)]
        is_admin: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModalPrompt {
    pub custom_id: String,
    pub title: String,
    pub field_id: String,
    pub label: String,
    pub placeholder: String,
    pub min_length: usize,
    pub max_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionReply {
    pub content: Option<String>,
    pub ephemeral: bool,
    pub modal: Option<ModalPrompt>,
}

impl InteractionReply {
    pub fn public(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ephemeral: false,
            modal: None,
        }
    }

    pub fn private(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ephemeral: true,
            modal: None,
        }
    }

    pub fn modal(prompt: ModalPrompt) -> Self {
        Self {
            content: None,
            ephemeral: true,
            modal: Some(prompt),
        }
    }
}

pub async fn handle_interaction(
    controller: &Arc<TicketController>,
    interaction: Interaction,
) -> InteractionReply {
    match interaction {
        Interaction::Button {
            custom_id,
            channel_id,
            user,
        } => {
            if let Some(category_id) = custom_id.strip_prefix(CREATE_PREFIX) {
                prompt_description(controller, category_id, &user).await
            } else if custom_id == CLOSE_ID {
                close(controller, &channel_id, &user).await
            } else if custom_id == CANCEL_CLOSE_ID {
                cancel_close(controller, &channel_id, &user).await
            } else {
                InteractionReply::private("❌ Unknown action.")
            }
        }
        Interaction::ModalSubmit {
            custom_id,
            user,
            fields,
            ..
        } => match custom_id.strip_prefix(MODAL_PREFIX) {
            Some(category_id) => {
                let description = fields.get(DESCRIPTION_FIELD).cloned().unwrap_or_default();
                submit_ticket(controller, category_id, user, description).await
            }
            None => InteractionReply::private("❌ Unknown form."),
        },
        Interaction::Command {
            name,
            channel_id,
            user,
            target_channel,
            is_admin,
        } => match name.as_str() {
            "setup" => setup(controller, target_channel, is_admin).await,
            "fechar" | "close" => close(controller, &channel_id, &user).await,
            _ => InteractionReply::private(format!("❌ Unknown command `{name}`.")),
        },
    }
}

async fn prompt_description(
    controller: &TicketController,
    category_id: &str,
    user: &Member,
) -> InteractionReply {
    let Some(category) = categories::resolve(category_id) else {
        return InteractionReply::private(format!("❌ Unknown ticket category `{category_id}`."));
    };

    if let Err(e) = controller.check_eligibility(&user.id).await {
        return InteractionReply::private(e.user_message());
    }

    InteractionReply::modal(ModalPrompt {
        custom_id: format!("{MODAL_PREFIX}{}", category.id),
        title: format!("New Ticket - {}", category.display_name),
        field_id: DESCRIPTION_FIELD.to_string(),
        label: "Describe your problem".to_string(),
        placeholder: "Give us details about your request...".to_string(),
        min_length: MIN_DESCRIPTION_CHARS,
        max_length: MAX_DESCRIPTION_CHARS,
    })
}

async fn submit_ticket(
    controller: &TicketController,
    category_id: &str,
    user: Member,
    description: String,
) -> InteractionReply {
    let request = CreateTicketRequest {
        owner: user,
        category_id: category_id.to_string(),
        description,
    };

    match controller.create_ticket(request).await {
        Ok(ticket) => {
            let text = ticket
                .channel
                .as_ref()
                .map(|c| c.id.mention())
                .unwrap_or_default();
            let voice = ticket
                .voice_channel
                .as_ref()
                .map(|c| c.id.mention())
                .unwrap_or_default();
            InteractionReply::private(format!(
                "✅ Your ticket was created in {text}! A private voice room was also created in {voice}."
            ))
        }
        Err(e) => InteractionReply::private(e.user_message()),
    }
}

async fn close(
    controller: &Arc<TicketController>,
    channel_id: &ChannelId,
    user: &Member,
) -> InteractionReply {
    match controller.request_close(channel_id, user).await {
        CloseOutcome::Scheduled(_) => InteractionReply::public(format!(
            "Closing ticket in {} seconds...",
            controller.settings().close_grace.as_secs()
        )),
        CloseOutcome::AlreadyClosing => {
            InteractionReply::private("⏳ This ticket is already being closed.")
        }
        CloseOutcome::NotATicket => {
            InteractionReply::private("❌ This command can only be used in ticket channels.")
        }
        CloseOutcome::Forbidden => {
            InteractionReply::private("❌ You do not have permission to close this ticket.")
        }
    }
}

async fn cancel_close(
    controller: &TicketController,
    channel_id: &ChannelId,
    user: &Member,
) -> InteractionReply {
    if controller.cancel_close(channel_id, user).await {
        InteractionReply::public("↩️ Closing cancelled.")
    } else {
        InteractionReply::private("❌ There is no pending close to cancel.")
    }
}

async fn setup(
    controller: &TicketController,
    target_channel: Option<ChannelId>,
    is_admin: bool,
) -> InteractionReply {
    if !is_admin {
        return InteractionReply::private("❌ You do not have permission to use this command.");
    }
    let Some(target) = target_channel else {
        return InteractionReply::private("❌ Pick the channel that should receive the ticket panel.");
    };

    match controller.setup(&target).await {
        Ok(()) => {
            info!("Ticket system configured in {target}");
            InteractionReply::private(format!(
                "✅ Ticket system configured in {}!",
                target.mention()
            ))
        }
        Err(e) => {
            warn!("Setup in {target} failed: {e}");
            InteractionReply::private(e.user_message())
        }
    }
}
