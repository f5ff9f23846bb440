use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::email::OutboundNotification;

/// Contact form submission. Every field is optional and forwarded untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SendEmailRequest {
    /// Sender's display name
    pub from_name: Option<String>,
    /// Sender's reply address
    pub from_email: Option<String>,
    /// Message body
    pub message: Option<String>,
    /// Link to a previously uploaded CV, usually the `secure_url` from `/upload-cv`
    pub cv_link: Option<String>,
}

impl From<SendEmailRequest> for OutboundNotification {
    fn from(request: SendEmailRequest) -> Self {
        Self {
            from_name: request.from_name,
            from_email: request.from_email,
            message: request.message,
            cv_link: request.cv_link,
        }
    }
}
