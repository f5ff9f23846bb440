//! Email relay for contact-form submissions, backed by the EmailJS REST API.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::config::EmailConfig;
use crate::errors::{Error, Result};

const PROVIDER: &str = "EmailJS";

/// Template parameters forwarded to the email provider.
///
/// Fields are opaque: nothing is validated here, and absent fields stay absent so the
/// provider's template decides what is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundNotification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_link: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendPayload<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    #[serde(rename = "accessToken", skip_serializing_if = "Option::is_none")]
    access_token: Option<&'a str>,
    template_params: &'a OutboundNotification,
}

pub struct EmailService {
    client: reqwest::Client,
    api_url: Url,
    service_id: String,
    template_id: String,
    public_key: String,
    private_key: Option<String>,
}

impl EmailService {
    pub fn new(config: &EmailConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            api_url: config.api_url.clone(),
            service_id: config.service_id.clone(),
            template_id: config.template_id.clone(),
            public_key: config.public_key.clone(),
            private_key: config.private_key.clone(),
        }
    }

    /// Send one notification and wait for the provider's full response.
    #[instrument(skip_all)]
    pub async fn send(&self, notification: &OutboundNotification) -> Result<()> {
        debug!(template_params = ?notification, "Sending email via EmailJS");

        let payload = SendPayload {
            service_id: &self.service_id,
            template_id: &self.template_id,
            user_id: &self.public_key,
            access_token: self.private_key.as_deref(),
            template_params: notification,
        };

        let response = self.client.post(self.api_url.clone()).json(&payload).send().await.map_err(|e| {
            error!(error = %e, "Email request failed");
            Error::Internal {
                operation: "send email".to_string(),
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!(error = %e, "Failed to read EmailJS response body");
            Error::Internal {
                operation: "send email".to_string(),
            }
        })?;

        info!(status = status.as_u16(), response = %body, "EmailJS response");

        interpret_response(status, &body)
    }
}

/// Map the provider's reply onto the gateway's outcome.
///
/// EmailJS answers with a plain-text body (`OK`, or a sentence describing the problem), but
/// error pages from anything in between may be JSON, so decoding is attempted and the raw text
/// is the fallback.
fn interpret_response(status: StatusCode, body: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }

    Err(Error::Upstream {
        provider: PROVIDER,
        status: status.as_u16(),
        detail: response_detail(body),
    })
}

fn response_detail(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => ["error", "message"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|v| v.as_str()).map(str::to_string))
            .unwrap_or_else(|| serde_json::Value::Object(map).to_string()),
        Ok(serde_json::Value::String(text)) => text,
        Ok(other) => other.to_string(),
        Err(_) => body.to_string(),
    }
}
