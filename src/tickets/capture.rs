use chrono::Utc;
use log::debug;
use std::sync::Arc;

use crate::channels::MessageReceived;
use crate::tickets::transcript::{TranscriptEntry, TranscriptStore};

/// Feeds inbound chat messages into the transcript of the ticket they belong to.
#[derive(Clone)]
pub struct MessageCapture {
    transcripts: Arc<TranscriptStore>,
}

impl MessageCapture {
    pub fn new(transcripts: Arc<TranscriptStore>) -> Self {
        Self { transcripts }
    }

    /// Returns whether the message was recorded. Bot messages and non-ticket channels are skipped.
    pub async fn on_message(&self, event: &MessageReceived) -> bool {
        if event.is_bot {
            return false;
        }

        let entry = TranscriptEntry {
            author_tag: event.author_tag.clone(),
            content: event.content.clone(),
            attachments: event.attachment_urls.clone(),
            captured_at: Utc::now(),
        };

        let captured = self.transcripts.append(&event.channel_id, entry).await;
        if captured {
            debug!(
                "Captured message from {} in {}",
                event.author_tag, event.channel_id
            );
        }
        captured
    }
}
