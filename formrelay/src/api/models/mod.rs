//! Request and response bodies of the public API.

pub mod email;
pub mod uploads;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Generic success body carrying a human readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}
