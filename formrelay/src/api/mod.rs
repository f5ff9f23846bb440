//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for every endpoint
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! - `GET /test`: liveness greeting
//! - `POST /send-email`: contact-form relay to the email provider
//! - `POST /upload-cv`: single file relay to the storage provider
//! - `GET /*`: pre-built frontend with entry document fallback
//!
//! All error responses share one shape, `{"error": "<message>"}`; see [`crate::errors`].

pub mod handlers;
pub mod models;
