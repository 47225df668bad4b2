//! Playroom API
//!
//! Backend-for-frontend for a children's multiplayer story-gaming platform:
//! - Auth0-issued bearer tokens verified against a cached signing-key set
//! - Postgres with row-level security scoped per request
//! - Profiles, friend graph, game room / invitation lifecycle
//! - Stripe checkout and ElevenLabs speech synthesis at the edges

pub mod api;
pub mod auth;
pub mod billing;
pub mod rooms;
pub mod speech;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub database: DatabaseYamlConfig,
    pub cors: CorsYamlConfig,
    /// Identity provider section — if absent, every request is rejected
    /// (deny-by-default)
    pub auth: Option<IdentityConfig>,
    pub stripe: Option<StripeConfig>,
    pub elevenlabs: Option<ElevenLabsConfig>,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub port: u16,
    /// Public URL for reverse-proxy setups (used in CORS)
    pub public_url: Option<String>,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            public_url: None,
        }
    }
}

/// Database configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseYamlConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseYamlConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/playroom".into(),
            max_connections: 10,
        }
    }
}

/// CORS configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsYamlConfig {
    /// Comma-separated list of allowed origins, or "*" for any
    pub allowed_origins: String,
}

impl Default for CorsYamlConfig {
    fn default() -> Self {
        Self {
            allowed_origins: "*".into(),
        }
    }
}

/// Identity provider configuration (Auth0 or compatible).
///
/// `issuer` and `jwks_url` can be omitted and are derived from `domain`
/// using the provider's conventional layout.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Provider tenant domain, e.g. "my-tenant.us.auth0.com"
    pub domain: String,
    /// API audience expected in access tokens
    pub audience: String,
    /// OAuth2 client id — accepted as a second audience so id tokens work too
    pub client_id: String,
    /// Expected `iss` claim (default: "https://{domain}/")
    #[serde(default)]
    pub issuer: Option<String>,
    /// Signing-key-set endpoint (default: "https://{domain}/.well-known/jwks.json")
    #[serde(default)]
    pub jwks_url: Option<String>,
}

impl IdentityConfig {
    pub fn issuer(&self) -> String {
        self.issuer
            .clone()
            .unwrap_or_else(|| format!("https://{}/", self.domain))
    }

    pub fn jwks_url(&self) -> String {
        self.jwks_url
            .clone()
            .unwrap_or_else(|| format!("https://{}/.well-known/jwks.json", self.domain))
    }
}

/// Stripe configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    /// Price id for the voice-cloning subscription plan
    pub price_id: String,
}

/// ElevenLabs configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct ElevenLabsConfig {
    pub api_key: String,
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub public_url: Option<String>,
    pub database_url: String,
    pub max_connections: u32,
    pub allowed_origins: String,
    /// Identity config — None means deny-by-default (no auth section)
    pub auth: Option<IdentityConfig>,
    pub stripe: Option<StripeConfig>,
    pub elevenlabs: Option<ElevenLabsConfig>,
}

impl Config {
    /// Load configuration from environment variables only.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let auth = match env_identity()? {
            Some(idp) => Some(idp),
            None => yaml.auth,
        };

        let stripe = match std::env::var("STRIPE_SECRET_KEY") {
            Ok(secret_key) if !secret_key.is_empty() => Some(StripeConfig {
                secret_key,
                price_id: std::env::var("STRIPE_PRICE_ID").unwrap_or_else(|_| {
                    yaml.stripe
                        .as_ref()
                        .map(|s| s.price_id.clone())
                        .unwrap_or_default()
                }),
            }),
            _ => yaml.stripe,
        };

        let elevenlabs = match std::env::var("ELEVENLABS_API_KEY") {
            Ok(api_key) if !api_key.is_empty() => Some(ElevenLabsConfig { api_key }),
            _ => yaml.elevenlabs,
        };

        Ok(Self {
            server_port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(yaml.server.port),
            public_url: std::env::var("PUBLIC_URL").ok().or(yaml.server.public_url),
            database_url: std::env::var("DATABASE_URL").unwrap_or(yaml.database.url),
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(yaml.database.max_connections),
            allowed_origins: std::env::var("ALLOWED_ORIGINS").unwrap_or(yaml.cors.allowed_origins),
            auth,
            stripe,
            elevenlabs,
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

/// Build an IdentityConfig from AUTH0_* env vars when the required ones are set.
fn env_identity() -> Result<Option<IdentityConfig>> {
    let domain = match std::env::var("AUTH0_DOMAIN") {
        Ok(d) if !d.is_empty() => d,
        _ => return Ok(None),
    };
    let audience = std::env::var("AUTH0_AUDIENCE")
        .context("AUTH0_AUDIENCE is required when AUTH0_DOMAIN is set")?;
    let client_id = std::env::var("AUTH0_CLIENT_ID")
        .context("AUTH0_CLIENT_ID is required when AUTH0_DOMAIN is set")?;

    Ok(Some(IdentityConfig {
        domain,
        audience,
        client_id,
        issuer: std::env::var("AUTH0_ISSUER").ok().filter(|s| !s.is_empty()),
        jwks_url: std::env::var("AUTH0_JWKS_URL").ok().filter(|s| !s.is_empty()),
    }))
}

// ============================================================================
// Server bootstrap
// ============================================================================

/// Build application state, bind the listener, and serve until shutdown.
pub async fn start_server(config: Config) -> Result<()> {
    let pool = store::connect(&config.database_url, config.max_connections).await?;
    tracing::info!("Connected to database");

    let verifier = config.auth.as_ref().map(auth::TokenVerifier::from_config);
    if verifier.is_none() {
        tracing::warn!("No identity provider configured — all API requests will be rejected");
    }

    let stripe = config
        .stripe
        .as_ref()
        .map(|c| billing::StripeClient::new(&c.secret_key, &c.price_id));
    let speech = config
        .elevenlabs
        .as_ref()
        .map(|c| speech::SpeechClient::new(&c.api_key));

    let port = config.server_port;
    let state = Arc::new(api::handlers::ServerState {
        pool,
        verifier,
        stripe,
        speech,
        config: Arc::new(config),
    });

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
