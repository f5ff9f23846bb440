use axum::Json;

use crate::api::models::MessageResponse;

pub const GREETING: &str = "Backend is working!";

#[utoipa::path(
    get,
    path = "/test",
    tag = "health",
    summary = "Liveness check",
    responses(
        (status = 200, description = "Service is up", body = MessageResponse)
    )
)]
pub async fn liveness() -> Json<MessageResponse> {
    Json(MessageResponse::new(GREETING))
}
