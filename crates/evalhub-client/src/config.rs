//! Client configuration.

use serde::Deserialize;
use std::path::Path;

/// Backend connection settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL (default: `"http://localhost:54321"`).
    pub backend_url: String,

    /// Public anon key sent with every request.
    pub anon_key: String,

    /// Service role key for admin identity management (optional).
    pub service_role_key: Option<String>,

    /// Web app URL serving the payment routes (default: `"http://localhost:3000"`).
    pub app_url: String,

    /// Publishable payment gateway key (optional; routes may return one).
    pub payment_key_id: Option<String>,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Backend secrets file structure.
#[derive(Debug, Deserialize)]
struct BackendSecrets {
    url: String,
    anon_key: String,
    #[serde(default)]
    service_role_key: Option<String>,
}

impl ClientConfig {
    /// Load configuration from a secrets file, falling back to environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let (backend_url, anon_key, service_role_key) = load_backend_secrets();

        Self {
            backend_url: backend_url.unwrap_or_else(|| "http://localhost:54321".into()),
            anon_key: anon_key.unwrap_or_default(),
            service_role_key,
            app_url: std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".into()),
            payment_key_id: std::env::var("PAYMENT_KEY_ID").ok(),
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }

    /// Configuration pointing both the backend and the payment routes at one URL.
    #[must_use]
    pub fn for_url(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            app_url: url.clone(),
            backend_url: url,
            anon_key: anon_key.into(),
            ..Self::default()
        }
    }
}

/// Load backend secrets from file or environment.
fn load_backend_secrets() -> (Option<String>, Option<String>, Option<String>) {
    let secret_paths = [
        ".secrets/backend.json",
        "evalhub/.secrets/backend.json",
        "../.secrets/backend.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<BackendSecrets>(path) {
            tracing::info!(path = %path, "Loaded backend secrets from file");
            return (
                Some(secrets.url),
                Some(secrets.anon_key),
                secrets.service_role_key,
            );
        }
    }

    tracing::debug!("Backend secrets file not found, using environment variables");
    (
        std::env::var("BACKEND_URL").ok(),
        std::env::var("BACKEND_ANON_KEY").ok(),
        std::env::var("BACKEND_SERVICE_ROLE_KEY").ok(),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:54321".into(),
            anon_key: String::new(),
            service_role_key: None,
            app_url: "http://localhost:3000".into(),
            payment_key_id: None,
            request_timeout_seconds: 30,
        }
    }
}
