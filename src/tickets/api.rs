use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::channels::{ChannelId, MessageReceived};
use crate::core::shared::state::AppState;
use crate::tickets::categories::{self, Category};
use crate::tickets::directory::Ticket;
use crate::tickets::interactions::{handle_interaction, Interaction, InteractionReply};
use crate::tickets::TicketError;

#[derive(Debug, Serialize)]
pub struct CaptureResult {
    pub captured: bool,
}

impl IntoResponse for TicketError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            Self::Validation(_) | Self::UnknownCategory(_) => StatusCode::BAD_REQUEST,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::NotATicket(_) => StatusCode::NOT_FOUND,
            Self::Provisioning(_) | Self::Delivery(_) => StatusCode::BAD_GATEWAY,
            Self::Teardown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

async fn health() -> &'static str {
    "Helpdesk bot is online!"
}

pub async fn message_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<MessageReceived>,
) -> Json<CaptureResult> {
    let captured = state.capture.on_message(&event).await;
    Json(CaptureResult { captured })
}

pub async fn interaction_event(
    State(state): State<Arc<AppState>>,
    Json(interaction): Json<Interaction>,
) -> Json<InteractionReply> {
    Json(handle_interaction(&state.controller, interaction).await)
}

pub async fn list_tickets(State(state): State<Arc<AppState>>) -> Json<Vec<Ticket>> {
    Json(state.controller.directory().list().await)
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
) -> Result<Json<Ticket>, TicketError> {
    let channel = ChannelId::new(channel_id);
    state
        .controller
        .directory()
        .find(&channel)
        .await
        .map(Json)
        .ok_or(TicketError::NotATicket(channel))
}

pub async fn list_categories() -> Json<Vec<Category>> {
    Json(categories::list_all().copied().collect())
}

pub fn configure_helpdesk_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health))
        .route("/api/events/message", post(message_event))
        .route("/api/events/interaction", post(interaction_event))
        .route("/api/tickets", get(list_tickets))
        .route("/api/tickets/categories", get(list_categories))
        .route("/api/tickets/:channel_id", get(get_ticket))
}
