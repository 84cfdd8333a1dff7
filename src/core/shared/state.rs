use std::sync::Arc;

use crate::channels::ChatPlatform;
use crate::core::config::HelpdeskConfig;
use crate::tickets::{MessageCapture, TicketController, TicketDirectory, TranscriptStore};

/// Process-wide helpdesk state shared by the HTTP handlers.
pub struct AppState {
    pub controller: Arc<TicketController>,
    pub capture: MessageCapture,
}

impl AppState {
    pub fn new(platform: Arc<dyn ChatPlatform>, settings: HelpdeskConfig) -> Self {
        let directory = Arc::new(TicketDirectory::new());
        let transcripts = Arc::new(TranscriptStore::new());
        let capture = MessageCapture::new(Arc::clone(&transcripts));
        let controller = Arc::new(TicketController::new(
            platform,
            directory,
            transcripts,
            settings,
        ));
        Self {
            controller,
            capture,
        }
    }
}
