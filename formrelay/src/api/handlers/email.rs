use axum::{Json, extract::State, extract::rejection::JsonRejection};
use tracing::instrument;

use crate::{
    AppState,
    api::models::{MessageResponse, email::SendEmailRequest},
    email::OutboundNotification,
    errors::{ErrorBody, Result},
};

#[utoipa::path(
    post,
    path = "/send-email",
    tag = "email",
    summary = "Relay a contact form message",
    description = "Forwards the submitted fields to the email provider's template. Fields are not validated.",
    request_body = SendEmailRequest,
    responses(
        (status = 200, description = "Email accepted by the provider", body = MessageResponse),
        (status = 400, description = "Body is missing or not valid JSON", body = ErrorBody),
        (status = 500, description = "Provider rejected the message or could not be reached", body = ErrorBody)
    )
)]
#[instrument(skip_all)]
pub async fn send_email(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SendEmailRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    let Json(request) = payload?;
    let notification: OutboundNotification = request.into();

    state.email.send(&notification).await?;

    Ok(Json(MessageResponse::new("Email sent successfully")))
}
