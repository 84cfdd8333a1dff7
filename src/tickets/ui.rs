use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::channels::{Attachment, Button, ButtonStyle, Embed, OutgoingMessage, RoleId};
use crate::tickets::categories::{self, Category};
use crate::tickets::directory::Ticket;
use crate::tickets::transcript::{artifact_name, format_timestamp};

pub const CREATE_PREFIX: &str = "ticket_create_";
pub const MODAL_PREFIX: &str = "ticket_modal_";
pub const CLOSE_ID: &str = "ticket_close";
pub const CANCEL_CLOSE_ID: &str = "ticket_cancel_close";
pub const DESCRIPTION_FIELD: &str = "descricao";

const BUTTONS_PER_ROW: usize = 3;
const PICKER_COLOR: u32 = 0x0099ff;
const TRANSCRIPT_COLOR: u32 = 0xff9900;
const CLOSED_LOG_COLOR: u32 = 0xff5555;

pub fn picker_message() -> OutgoingMessage {
    let embed = categories::list_all().fold(
        Embed::titled("📩 Support Desk")
            .description("To open a support ticket, pick the matching category below.")
            .color(PICKER_COLOR)
            .footer("Ticket System")
            .timestamp(Utc::now()),
        |embed, cat| embed.field(format!("{} {}", cat.emoji, cat.display_name), cat.description, true),
    );

    let buttons: Vec<Button> = categories::list_all()
        .map(|cat| Button {
            custom_id: format!("{CREATE_PREFIX}{}", cat.id),
            label: cat.display_name.to_string(),
            emoji: Some(cat.emoji.to_string()),
            style: ButtonStyle::Primary,
        })
        .collect();

    buttons
        .chunks(BUTTONS_PER_ROW)
        .fold(OutgoingMessage::embed(embed), |message, row| {
            message.with_row(row.to_vec())
        })
}

pub fn close_button() -> Button {
    Button {
        custom_id: CLOSE_ID.to_string(),
        label: "Close Ticket".to_string(),
        emoji: Some("🔒".to_string()),
        style: ButtonStyle::Danger,
    }
}

pub fn intro_message(
    ticket: &Ticket,
    category: &Category,
    description: &str,
    staff_role: &RoleId,
) -> OutgoingMessage {
    let channel_id = ticket.channel_id().map(ToString::to_string).unwrap_or_default();
    let embed = Embed::titled(format!("{} Ticket: {}", category.emoji, category.display_name))
        .description("Our support team will be with you shortly.")
        .color(category.accent_color)
        .field("User", ticket.owner.mention(), true)
        .field("Category", category.display_name, true)
        .field("Problem description", description, false)
        .image(category.illustration_url)
        .footer(format!("Ticket ID: {channel_id}"))
        .timestamp(ticket.created_at);

    OutgoingMessage::embed(embed)
        .with_content(format!("{} {}", ticket.owner.mention(), staff_role.mention()))
        .with_row(vec![close_button()])
}

pub fn opened_log_message(ticket: &Ticket, category: &Category) -> OutgoingMessage {
    let (mention, id) = ticket
        .channel
        .as_ref()
        .map(|c| (c.id.mention(), c.id.to_string()))
        .unwrap_or_default();

    OutgoingMessage::embed(
        Embed::titled("📩 New Ticket Created")
            .description(format!("Ticket opened by {}", ticket.owner.mention()))
            .field("Channel", mention, true)
            .field("Category", category.display_name, true)
            .field("Ticket ID", id, true)
            .color(category.accent_color)
            .timestamp(ticket.created_at),
    )
}

pub fn close_countdown_message(grace: Duration) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "🔒 This ticket will be closed in {} seconds...",
        grace.as_secs()
    ))
    .with_row(vec![Button {
        custom_id: CANCEL_CLOSE_ID.to_string(),
        label: "Keep Open".to_string(),
        emoji: Some("↩️".to_string()),
        style: ButtonStyle::Secondary,
    }])
}

pub fn close_cancelled_message(by: &str) -> OutgoingMessage {
    OutgoingMessage::text(format!("↩️ Closing cancelled by {by}. The ticket stays open."))
}

pub fn transcript_dm_message(
    channel_name: &str,
    transcript: &str,
    opened_at: &DateTime<Utc>,
    closed_at: &DateTime<Utc>,
    closed_by: &str,
) -> OutgoingMessage {
    OutgoingMessage::embed(
        Embed::titled("📜 Ticket Transcript")
            .description(format!("Your ticket `{channel_name}` was closed."))
            .color(TRANSCRIPT_COLOR)
            .field("Opened at", format_timestamp(opened_at), true)
            .field("Closed at", format_timestamp(closed_at), true)
            .field("Closed by", closed_by, true)
            .footer("Ticket System")
            .timestamp(*closed_at),
    )
    .with_attachment(Attachment::text(artifact_name(channel_name), transcript))
}

pub fn closed_log_message(
    channel_name: &str,
    channel_id: &str,
    transcript: &str,
    opened_at: &DateTime<Utc>,
    closed_at: &DateTime<Utc>,
    closed_by: &str,
) -> OutgoingMessage {
    OutgoingMessage::embed(
        Embed::titled("🔒 Ticket Closed")
            .description(format!("Ticket `{channel_name}` was closed by {closed_by}"))
            .field("Ticket ID", channel_id, true)
            .field("Opened at", format_timestamp(opened_at), true)
            .field("Closed at", format_timestamp(closed_at), true)
            .color(CLOSED_LOG_COLOR)
            .timestamp(*closed_at),
    )
    .with_attachment(Attachment::text(artifact_name(channel_name), transcript))
}
