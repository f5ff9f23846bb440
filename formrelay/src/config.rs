//! Application configuration management.
//!
//! Configuration is loaded from an optional YAML file with environment variable overrides. The
//! configuration file path defaults to `config.yaml` but can be specified via `-f` flag or
//! `FORMRELAY_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **Defaults** - see the `Default` implementations below
//! 2. **YAML config file** - optional, a missing file is not an error
//! 3. **Environment variables** - variables prefixed with `FORMRELAY_` override YAML values
//! 4. **Provider variables** - `PORT`, `CLOUDINARY_*` and `EMAILJS_*` are accepted unprefixed,
//!    the names most hosting dashboards already use for these credentials
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `FORMRELAY_UPLOADS__STAGING=disk` sets the `uploads.staging` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use formrelay::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! PORT=8080
//! CLOUDINARY_CLOUD_NAME=demo
//! EMAILJS_SERVICE_ID=service_abc
//!
//! # Nested values
//! FORMRELAY_UPLOADS__MAX_FILE_SIZE=10485760
//! FORMRELAY_STORAGE__RESOURCE_TYPE=raw
//! FORMRELAY_STATIC_ASSETS__DIR=./dist
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;

/// Unprefixed variables and the config keys they populate.
const PROVIDER_ENV_ALIASES: &[(&str, &str)] = &[
    ("PORT", "port"),
    ("CLOUDINARY_CLOUD_NAME", "storage.cloud_name"),
    ("CLOUDINARY_API_KEY", "storage.api_key"),
    ("CLOUDINARY_API_SECRET", "storage.api_secret"),
    ("EMAILJS_SERVICE_ID", "email.service_id"),
    ("EMAILJS_TEMPLATE_ID", "email.template_id"),
    ("EMAILJS_PUBLIC_KEY", "email.public_key"),
    ("EMAILJS_PRIVATE_KEY", "email.private_key"),
];

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "FORMRELAY_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have defaults, so an empty environment yields a runnable (if credential-less)
/// gateway on port 5000.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
    /// Transactional email provider (EmailJS)
    pub email: EmailConfig,
    /// Media storage provider (Cloudinary)
    pub storage: StorageConfig,
    /// Inbound upload handling
    pub uploads: UploadConfig,
    /// Pre-built single page application
    pub static_assets: StaticAssetsConfig,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// Allowed CORS origin.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

/// Accepts a string, or the number figment produces when an environment value is all digits.
struct StringOrNumber(String);

impl<'de> Deserialize<'de> for StringOrNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;

        impl serde::de::Visitor<'_> for Visitor {
            type Value = StringOrNumber;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a string or a number")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(StringOrNumber(v.to_string()))
            }

            fn visit_string<E: serde::de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(StringOrNumber(v))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(StringOrNumber(v.to_string()))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(StringOrNumber(v.to_string()))
            }

            fn visit_u128<E: serde::de::Error>(self, v: u128) -> Result<Self::Value, E> {
                Ok(StringOrNumber(v.to_string()))
            }

            fn visit_i128<E: serde::de::Error>(self, v: i128) -> Result<Self::Value, E> {
                Ok(StringOrNumber(v.to_string()))
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    StringOrNumber::deserialize(deserializer).map(|value| value.0)
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<StringOrNumber>::deserialize(deserializer).map(|value| value.map(|v| v.0))
}

/// EmailJS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmailConfig {
    /// Send endpoint of the EmailJS REST API
    pub api_url: Url,
    /// EmailJS service identifier
    #[serde(deserialize_with = "string_or_number")]
    pub service_id: String,
    /// EmailJS template identifier
    #[serde(deserialize_with = "string_or_number")]
    pub template_id: String,
    /// EmailJS public key (sent as `user_id`)
    #[serde(deserialize_with = "string_or_number")]
    pub public_key: String,
    /// EmailJS private key (sent as `accessToken`), required when the account enforces it
    #[serde(
        default,
        deserialize_with = "optional_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub private_key: Option<String>,
    /// Timeout for the outbound send call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// How the storage provider should interpret uploaded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// Let the provider detect the content type; images and PDFs render inline
    Auto,
    /// Store as opaque binary; browsers download the asset
    Raw,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Auto => "auto",
            ResourceType::Raw => "raw",
        }
    }
}

/// Digest used to sign storage upload requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    Sha1,
    Sha256,
}

/// Cloudinary configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Base URL of the upload API
    pub api_base_url: Url,
    #[serde(deserialize_with = "string_or_number")]
    pub cloud_name: String,
    /// Cloudinary API keys are all digits
    #[serde(deserialize_with = "string_or_number")]
    pub api_key: String,
    #[serde(deserialize_with = "string_or_number")]
    pub api_secret: String,
    /// Folder that uploaded assets are placed in
    pub folder: String,
    /// Content type resolution policy
    pub resource_type: ResourceType,
    pub signature_algorithm: SignatureAlgorithm,
    /// Timeout for the outbound upload call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Where uploaded bytes are held before forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingStrategy {
    /// Buffer the whole file in memory
    Memory,
    /// Spool the file to a temporary file that is removed after forwarding
    Disk,
}

/// Inbound upload configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// Maximum accepted file size in bytes (0 = unlimited)
    pub max_file_size: u64,
    pub staging: StagingStrategy,
    /// Directory for disk staging; the OS temp directory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

/// Static asset configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticAssetsConfig {
    /// Directory containing the built frontend (must contain `index.html`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            enable_otel_export: false,
            cors: CorsConfig::default(),
            email: EmailConfig::default(),
            storage: StorageConfig::default(),
            uploads: UploadConfig::default(),
            static_assets: StaticAssetsConfig::default(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            allow_credentials: true,
            max_age: Some(3600), // Cache preflight for 1 hour
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse("https://api.emailjs.com/api/v1.0/email/send").expect("static URL is valid"),
            service_id: String::new(),
            template_id: String::new(),
            public_key: String::new(),
            private_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            api_base_url: Url::parse("https://api.cloudinary.com").expect("static URL is valid"),
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            folder: "cv_uploads".to_string(),
            resource_type: ResourceType::Auto,
            signature_algorithm: SignatureAlgorithm::Sha1,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 5 * 1024 * 1024, // 5 MiB
            staging: StagingStrategy::Memory,
            temp_dir: None,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<(), Error> {
        if self.cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        if self.storage.folder.trim().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: storage.folder cannot be empty".to_string(),
            });
        }

        if self.email.timeout.is_zero() || self.storage.timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: outbound timeouts must be greater than zero".to_string(),
            });
        }

        if self.uploads.staging == StagingStrategy::Disk
            && let Some(dir) = &self.uploads.temp_dir
            && !dir.is_dir()
        {
            return Err(Error::Internal {
                operation: format!("Config validation: uploads.temp_dir ({}) is not an existing directory", dir.display()),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        let aliases = Env::raw()
            .only(&PROVIDER_ENV_ALIASES.iter().map(|(var, _)| *var).collect::<Vec<_>>())
            .map(|var| {
                PROVIDER_ENV_ALIASES
                    .iter()
                    .find(|(name, _)| var == *name)
                    .map(|(_, key)| (*key).into())
                    .unwrap_or_else(|| var.as_str().into())
            });

        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            // FORMRELAY_CONFIG names the file itself and is read by clap
            .merge(Env::prefixed("FORMRELAY_").ignore(&["config"]).split("__"))
            // Provider credentials under the names the hosting platform exposes
            .merge(aliases)
    }

    /// Names of provider settings that are still empty. The providers reject calls without them,
    /// so this only feeds a startup warning.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        [
            ("storage.cloud_name", self.storage.cloud_name.is_empty()),
            ("storage.api_key", self.storage.api_key.is_empty()),
            ("storage.api_secret", self.storage.api_secret.is_empty()),
            ("email.service_id", self.email.service_id.is_empty()),
            ("email.template_id", self.email.template_id.is_empty()),
            ("email.public_key", self.email.public_key.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Request body limit for the upload route: the file limit plus room for multipart framing.
    pub fn upload_body_limit(&self) -> Option<usize> {
        match self.uploads.max_file_size {
            0 => None,
            max => Some(max as usize + 64 * 1024),
        }
    }
}
