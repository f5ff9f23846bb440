//! Test helpers for building configurations and in-process servers.

use axum_test::TestServer;

use crate::{Application, config::Config};

/// Configuration pointing both providers at the given base URIs (usually wiremock servers).
pub fn create_test_config(email_uri: &str, storage_uri: &str) -> Config {
    let mut config = Config::default();

    config.email.api_url = format!("{email_uri}/api/v1.0/email/send")
        .parse()
        .expect("Invalid email provider URI");
    config.email.service_id = "service_test".to_string();
    config.email.template_id = "template_test".to_string();
    config.email.public_key = "public_test".to_string();

    config.storage.api_base_url = storage_uri.parse().expect("Invalid storage provider URI");
    config.storage.cloud_name = "demo".to_string();
    config.storage.api_key = "1234".to_string();
    config.storage.api_secret = "secret".to_string();

    config
}

pub fn create_test_app(config: Config) -> TestServer {
    crate::install_crypto_provider();
    Application::new(config)
        .expect("Failed to build application")
        .into_test_server()
}
