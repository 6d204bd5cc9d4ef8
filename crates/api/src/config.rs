//! Layered API configuration.
//!
//! Sources, later ones winning:
//! 1. defaults in code
//! 2. `config/{environment}.toml`, if present
//! 3. `MATFLOW__SECTION__KEY` environment variables

use config::{ConfigError, Environment, File};
use serde::Deserialize;

use matflow_observability::LogFormat;

/// Secret used when none is configured. Only fit for local runs.
pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub environment: String,
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    pub events: EventsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// HS256 shared secret for bearer tokens.
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Buffer of the realtime broadcast channel. Slow SSE clients lag past it.
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl ApiConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("MATFLOW_ENVIRONMENT").unwrap_or_else(|_| "development".into());
        Self::load_from(&environment, Environment::with_prefix("MATFLOW"))
    }

    fn load_from(environment: &str, env_source: Environment) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .set_default("environment", environment)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("jwt.secret", DEV_JWT_SECRET)?
            .set_default("events.channel_capacity", 256)?
            .set_default("log.level", "info")?
            .set_default("log.format", "json")?
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(
                env_source
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt.secret == DEV_JWT_SECRET
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            environment: "development".into(),
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8080,
            },
            jwt: JwtConfig {
                secret: DEV_JWT_SECRET.into(),
            },
            events: EventsConfig { channel_capacity: 256 },
            log: LogConfig {
                level: "info".into(),
                format: LogFormat::Json,
            },
        }
    }
}
