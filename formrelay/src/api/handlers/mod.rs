//! HTTP request handlers for all API endpoints.
//!
//! # Handler Modules
//!
//! - [`health`]: liveness greeting
//! - [`email`]: contact-form relay
//! - [`uploads`]: single file upload relay
//! - [`static_assets`]: frontend asset serving and SPA routing
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`], which converts to the mapped HTTP status and a
//! `{"error": "<message>"}` body.

pub mod email;
pub mod health;
pub mod static_assets;
pub mod uploads;
