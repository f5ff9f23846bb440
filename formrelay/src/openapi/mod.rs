//! OpenAPI documentation for the relay endpoints.
//!
//! The document is served as JSON at `/openapi.json` and rendered with Scalar at `/docs`.

use utoipa::OpenApi;

use crate::{api, errors};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "formrelay",
        description = "Relays contact-form messages to an email provider and file uploads to a media store."
    ),
    paths(
        api::handlers::health::liveness,
        api::handlers::email::send_email,
        api::handlers::uploads::upload_cv,
    ),
    components(
        schemas(
            api::models::MessageResponse,
            api::models::email::SendEmailRequest,
            api::models::uploads::UploadResponse,
            api::models::uploads::UploadForm,
            errors::ErrorBody,
        )
    ),
    tags(
        (name = "health", description = "Liveness checks."),
        (name = "email", description = "Contact form relay. The submitted fields become the provider template's parameters."),
        (name = "uploads", description = "Single file relay. The response carries the provider's `secure_url`."),
    )
)]
pub struct ApiDoc;
