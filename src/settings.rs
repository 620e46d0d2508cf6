use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub payments: PaymentSettings,
    /// Upper bound for every call to mail or payment collaborators.
    pub external_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub backend: Backend,
    pub uri: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSettings {
    pub api_base: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub currency: String,
}

impl Settings {
    /// Defaults overlaid with `PROPRUST__*` environment variables,
    /// e.g. `PROPRUST__SERVER__PORT=9000`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(
                Environment::with_prefix("PROPRUST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8082_i64)?
            .set_default("database.backend", "mongo")?
            .set_default("database.uri", "mongodb://127.0.0.1:27017")?
            .set_default("database.name", "proprust")?
            .set_default("auth.jwt_secret", "change-me")?
            .set_default("payments.api_base", "https://api.stripe.com")?
            .set_default("payments.secret_key", "")?
            .set_default("payments.webhook_secret", "")?
            .set_default("payments.currency", "INR")?
            .set_default("external_timeout_secs", 10_i64)
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_timeout_secs)
    }
}
