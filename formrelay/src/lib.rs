//! # formrelay: contact-form and upload relay
//!
//! `formrelay` is the backend of a static portfolio site. It keeps provider credentials out of
//! the browser by relaying two kinds of requests to third-party APIs:
//!
//! - **Notifications**: `POST /send-email` forwards a contact-form message to an EmailJS
//!   template ([`email::EmailService`]).
//! - **Uploads**: `POST /upload-cv` stages a single file ([`staging::Stager`]) and stores it
//!   with Cloudinary ([`storage::CloudinaryStore`]), answering with the public `secure_url`.
//!
//! It can also serve the pre-built frontend from a directory, falling back to `index.html` for
//! client-side routes, and exposes a fixed liveness greeting at `GET /test`.
//!
//! ## Request flow
//!
//! ```text
//! browser ──► CORS ──► TraceLayer ──► handler ──► provider API
//!                                        │
//!                                        └──► {"error": ...} on any failure
//! ```
//!
//! Each request performs at most one outbound call and waits for the full response. There is no
//! shared mutable state: [`AppState`] holds the configuration and the provider clients, built
//! once in [`Application::new`].
//!
//! ## Configuration
//!
//! See [`config`] for the YAML file, the `FORMRELAY_` environment prefix and the well-known
//! provider variables (`CLOUDINARY_*`, `EMAILJS_*`, `PORT`).

pub mod api;
pub mod config;
pub mod email;
pub mod errors;
mod openapi;
pub mod staging;
pub mod storage;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
};
use bon::Builder;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;

use crate::{
    api::handlers::{
        email::send_email,
        health::liveness,
        static_assets::{method_not_allowed, not_found, serve_static_asset},
        uploads::upload_cv,
    },
    config::CorsOrigin,
    email::EmailService,
    openapi::ApiDoc,
    staging::Stager,
    storage::{CloudinaryStore, MediaStore},
};

/// Install the process-wide rustls crypto provider used by the outbound HTTP clients.
///
/// Safe to call more than once; later calls are no-ops.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Shared state handed to every handler.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .email(Arc::new(email))
///     .media_store(Arc::new(store))
///     .stager(Stager::new(&config.uploads))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub email: Arc<EmailService>,
    pub media_store: Arc<dyn MediaStore>,
    pub stager: Stager,
}

fn http_client(timeout: std::time::Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Create CORS layer from configuration
///
/// A wildcard origin is mirrored back from the request rather than sent as `*`, which browsers
/// reject on credentialed requests.
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.cors;
    let wildcard = cors_config
        .allowed_origins
        .iter()
        .any(|origin| matches!(origin, CorsOrigin::Wildcard));

    let allow_origin = if wildcard {
        AllowOrigin::mirror_request()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                // Origins never carry a path; Url always renders one
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(cors_config.allow_credentials);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// - `/test`, `/send-email` and `/upload-cv`
/// - OpenAPI document at `/openapi.json`, rendered at `/docs`
/// - static asset serving and SPA fallback for every other GET
/// - CORS and request tracing
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let upload_limit = match state.config.upload_body_limit() {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    let cors_layer = create_cors_layer(&state.config)?;
    let fallback = get(serve_static_asset).fallback(not_found).with_state(state.clone());

    let router = Router::new()
        .route("/test", get(liveness))
        .route("/send-email", post(send_email))
        .route("/upload-cv", post(upload_cv).layer(upload_limit))
        .route("/openapi.json", get(|| async { axum::Json(ApiDoc::openapi()) }))
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .fallback_service(fallback)
        .layer(cors_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// The configured HTTP service, ready to be served or wrapped in a test server.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Build provider clients and the router from configuration
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let missing = config.missing_credentials();
        if !missing.is_empty() {
            warn!(
                missing = ?missing,
                "Provider credentials are not configured; affected requests will be rejected by the provider"
            );
        }

        info!(
            staging = ?config.uploads.staging,
            max_file_size = config.uploads.max_file_size,
            folder = %config.storage.folder,
            resource_type = config.storage.resource_type.as_str(),
            static_assets = ?config.static_assets.dir,
            "Configuring relay"
        );

        let email = EmailService::new(&config.email, http_client(config.email.timeout)?);
        let media_store = CloudinaryStore::new(&config.storage, http_client(config.storage.timeout)?);

        let state = AppState::builder()
            .config(config.clone())
            .email(Arc::new(email))
            .media_store(Arc::new(media_store))
            .stager(Stager::new(&config.uploads))
            .build();

        let router = build_router(state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Relay listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{CorsConfig, StagingStrategy};
    use crate::test_utils::{create_test_app, create_test_config};
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use std::path::Path;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EMAIL_PATH: &str = "/api/v1.0/email/send";
    const UPLOAD_PATH: &str = "/v1_1/demo/auto/upload";

    fn cv_form(bytes: &'static [u8]) -> MultipartForm {
        MultipartForm::new().add_part("file", Part::bytes(bytes).file_name("cv.txt").mime_type("text/plain"))
    }

    fn disk_config(server: &MockServer, dir: &Path) -> Config {
        let mut config = create_test_config(&server.uri(), &server.uri());
        config.uploads.staging = StagingStrategy::Disk;
        config.uploads.temp_dir = Some(dir.to_path_buf());
        config
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test_log::test(tokio::test)]
    async fn test_liveness_route() {
        let server = create_test_app(create_test_config("http://127.0.0.1:9", "http://127.0.0.1:9"));

        let response = server.get("/test").await;

        response.assert_status_ok();
        response.assert_json(&serde_json::json!({ "message": "Backend is working!" }));
    }

    #[test_log::test(tokio::test)]
    async fn test_send_email_success() {
        let provider = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EMAIL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "ok" })))
            .expect(1)
            .mount(&provider)
            .await;
        let server = create_test_app(create_test_config(&provider.uri(), "http://127.0.0.1:9"));

        let response = server
            .post("/send-email")
            .json(&serde_json::json!({
                "from_name": "A",
                "from_email": "a@x.com",
                "message": "hi",
                "cv_link": ""
            }))
            .await;

        response.assert_status_ok();
        response.assert_json(&serde_json::json!({ "message": "Email sent successfully" }));
    }

    #[test_log::test(tokio::test)]
    async fn test_send_email_downstream_failure_is_surfaced() {
        let provider = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EMAIL_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_string("The template ID is invalid"))
            .mount(&provider)
            .await;
        let server = create_test_app(create_test_config(&provider.uri(), "http://127.0.0.1:9"));

        let response = server.post("/send-email").json(&serde_json::json!({ "message": "hi" })).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.assert_json(&serde_json::json!({ "error": "The template ID is invalid" }));
    }

    #[test_log::test(tokio::test)]
    async fn test_send_email_rejects_non_json_body() {
        let provider = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&provider).await;
        let server = create_test_app(create_test_config(&provider.uri(), "http://127.0.0.1:9"));

        let response = server.post("/send-email").text("from_name=A").await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert!(body["error"].is_string());
    }

    #[test_log::test(tokio::test)]
    async fn test_upload_without_file_is_rejected_without_provider_call() {
        let provider = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&provider).await;
        let server = create_test_app(create_test_config("http://127.0.0.1:9", &provider.uri()));

        let form = MultipartForm::new().add_text("note", "no file here");
        let response = server.post("/upload-cv").multipart(form).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&serde_json::json!({ "error": "No file uploaded" }));
    }

    #[test_log::test(tokio::test)]
    async fn test_upload_with_empty_file_input_is_rejected() {
        let provider = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&provider).await;
        let server = create_test_app(create_test_config("http://127.0.0.1:9", &provider.uri()));

        let form = MultipartForm::new().add_part("file", Part::bytes(Vec::<u8>::new()).file_name(""));
        let response = server.post("/upload-cv").multipart(form).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&serde_json::json!({ "error": "No file uploaded" }));
    }

    #[test_log::test(tokio::test)]
    async fn test_upload_returns_secure_url_and_cleans_up() {
        let provider = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UPLOAD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "secure_url": "https://cdn.example/cv_uploads/abc.txt"
            })))
            .expect(1)
            .mount(&provider)
            .await;
        let temp_dir = tempfile::tempdir().unwrap();
        let server = create_test_app(disk_config(&provider, temp_dir.path()));

        let response = server.post("/upload-cv").multipart(cv_form(b"0123456789")).await;

        response.assert_status_ok();
        response.assert_json(&serde_json::json!({ "secure_url": "https://cdn.example/cv_uploads/abc.txt" }));
        assert_eq!(entries(temp_dir.path()), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_upload_from_memory_ignores_extra_fields() {
        let provider = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UPLOAD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "secure_url": "https://cdn.example/cv_uploads/first.txt"
            })))
            .expect(1)
            .mount(&provider)
            .await;
        let server = create_test_app(create_test_config("http://127.0.0.1:9", &provider.uri()));

        let form = MultipartForm::new()
            .add_text("name", "A")
            .add_part("file", Part::bytes(b"first".as_slice()).file_name("first.txt"))
            .add_part("file", Part::bytes(b"second".as_slice()).file_name("second.txt"));
        let response = server.post("/upload-cv").multipart(form).await;

        response.assert_status_ok();
        response.assert_json(&serde_json::json!({ "secure_url": "https://cdn.example/cv_uploads/first.txt" }));
    }

    #[test_log::test(tokio::test)]
    async fn test_provider_failure_leaves_no_temp_file() {
        let provider = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UPLOAD_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "message": "Invalid image file" }
            })))
            .expect(1)
            .mount(&provider)
            .await;
        let temp_dir = tempfile::tempdir().unwrap();
        let server = create_test_app(disk_config(&provider, temp_dir.path()));

        let response = server.post("/upload-cv").multipart(cv_form(b"0123456789")).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.assert_json(&serde_json::json!({ "error": "Invalid image file" }));
        assert_eq!(entries(temp_dir.path()), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_slow_email_provider_times_out() {
        let provider = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EMAIL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK").set_delay(Duration::from_secs(5)))
            .mount(&provider)
            .await;
        let mut config = create_test_config(&provider.uri(), "http://127.0.0.1:9");
        config.email.timeout = Duration::from_millis(200);
        let server = create_test_app(config);

        let response = server.post("/send-email").json(&serde_json::json!({ "message": "hi" })).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.assert_json(&serde_json::json!({ "error": "Failed to send email" }));
    }

    #[test_log::test(tokio::test)]
    async fn test_slow_storage_provider_times_out_and_cleans_up() {
        let provider = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UPLOAD_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "secure_url": "https://cdn.example/late.txt" }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&provider)
            .await;
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = disk_config(&provider, temp_dir.path());
        config.storage.timeout = Duration::from_millis(200);
        let server = create_test_app(config);

        let response = server.post("/upload-cv").multipart(cv_form(b"0123456789")).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.assert_json(&serde_json::json!({ "error": "Failed to upload file" }));
        assert_eq!(entries(temp_dir.path()), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_unreachable_storage_provider_cleans_up() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config("http://127.0.0.1:9", "http://127.0.0.1:9");
        config.uploads.staging = StagingStrategy::Disk;
        config.uploads.temp_dir = Some(temp_dir.path().to_path_buf());
        let server = create_test_app(config);

        let response = server.post("/upload-cv").multipart(cv_form(b"0123456789")).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.assert_json(&serde_json::json!({ "error": "Failed to upload file" }));
        assert_eq!(entries(temp_dir.path()), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_blank_file_part_does_not_hide_a_later_file() {
        let provider = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UPLOAD_PATH))
            .and(body_string_contains("real contents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "secure_url": "https://cdn.example/cv_uploads/real.txt"
            })))
            .expect(1)
            .mount(&provider)
            .await;
        let server = create_test_app(create_test_config("http://127.0.0.1:9", &provider.uri()));

        let form = MultipartForm::new()
            .add_part("file", Part::bytes(Vec::<u8>::new()).file_name(""))
            .add_part("file", Part::bytes(b"real contents".as_slice()).file_name("real.txt"));
        let response = server.post("/upload-cv").multipart(form).await;

        response.assert_status_ok();
        response.assert_json(&serde_json::json!({ "secure_url": "https://cdn.example/cv_uploads/real.txt" }));
    }

    #[test_log::test(tokio::test)]
    async fn test_text_field_named_file_is_not_an_upload() {
        let provider = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&provider).await;
        let server = create_test_app(create_test_config("http://127.0.0.1:9", &provider.uri()));

        let form = MultipartForm::new().add_text("file", "just some text");
        let response = server.post("/upload-cv").multipart(form).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&serde_json::json!({ "error": "No file uploaded" }));
    }

    #[test_log::test(tokio::test)]
    async fn test_unmatched_methods_answer_with_json_errors() {
        let server = create_test_app(create_test_config("http://127.0.0.1:9", "http://127.0.0.1:9"));

        let response = server.post("/nope").await;
        response.assert_status(StatusCode::NOT_FOUND);
        response.assert_json(&serde_json::json!({ "error": "Not found" }));

        let response = server.get("/send-email").await;
        response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
        response.assert_json(&serde_json::json!({ "error": "Method not allowed" }));
    }

    #[test_log::test(tokio::test)]
    async fn test_oversized_upload_is_rejected_before_provider_call() {
        let provider = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&provider).await;
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = disk_config(&provider, temp_dir.path());
        config.uploads.max_file_size = 8;
        let server = create_test_app(config);

        let response = server.post("/upload-cv").multipart(cv_form(b"0123456789")).await;

        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        let body: serde_json::Value = response.json();
        assert!(body["error"].as_str().unwrap().contains("maximum allowed size"));
        assert_eq!(entries(temp_dir.path()), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_body_over_framework_limit_is_payload_too_large() {
        let provider = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&provider).await;
        let mut config = create_test_config("http://127.0.0.1:9", &provider.uri());
        config.uploads.max_file_size = 1024;
        let server = create_test_app(config);

        // Well past the file limit plus multipart allowance
        let payload = vec![b'x'; 256 * 1024];
        let form = MultipartForm::new().add_part("file", Part::bytes(payload).file_name("big.bin"));
        let response = server.post("/upload-cv").multipart(form).await;

        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test_log::test(tokio::test)]
    async fn test_cors_mirrors_origin_with_credentials() {
        let server = create_test_app(create_test_config("http://127.0.0.1:9", "http://127.0.0.1:9"));

        let response = server
            .get("/test")
            .add_header("origin", "https://portfolio.example")
            .await;

        response.assert_status_ok();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "https://portfolio.example"
        );
        assert_eq!(response.headers().get("access-control-allow-credentials").unwrap(), "true");
    }

    #[test_log::test(tokio::test)]
    async fn test_cors_explicit_origin_list() {
        let mut config = create_test_config("http://127.0.0.1:9", "http://127.0.0.1:9");
        config.cors = CorsConfig {
            allowed_origins: vec![CorsOrigin::Url("https://portfolio.example".parse().unwrap())],
            ..Default::default()
        };
        let server = create_test_app(config);

        let allowed = server.get("/test").add_header("origin", "https://portfolio.example").await;
        assert_eq!(
            allowed.headers().get("access-control-allow-origin").unwrap(),
            "https://portfolio.example"
        );

        let denied = server.get("/test").add_header("origin", "https://elsewhere.example").await;
        assert!(denied.headers().get("access-control-allow-origin").is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_openapi_document_is_served() {
        let server = create_test_app(create_test_config("http://127.0.0.1:9", "http://127.0.0.1:9"));

        let response = server.get("/openapi.json").await;

        response.assert_status_ok();
        let doc: serde_json::Value = response.json();
        assert!(doc["paths"]["/upload-cv"]["post"].is_object());
        server.get("/docs").await.assert_status_ok();
    }
}
