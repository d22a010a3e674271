use serde::Deserialize;
use snapfeed_common::{
    snowflake::{ProcessId, WorkerId},
    util::{NonPositiveDurationError, PositiveDuration},
};
use std::{
    fmt::{Debug, Formatter},
    net::{IpAddr, Ipv4Addr, SocketAddr},
};
use thiserror::Error;
use time::Duration;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("JWT_SECRET must not be empty")]
    EmptySecret,
    #[error("Invalid TOKEN_LIFETIME_SECONDS: {0}")]
    TokenLifetime(#[from] NonPositiveDurationError),
    #[error("TOKEN_LIFETIME_SECONDS must be at most {max}, got {0}", max = MAX_TOKEN_LIFETIME.whole_seconds())]
    TokenLifetimeTooLong(i64),
}

const MAX_TOKEN_LIFETIME: Duration = Duration::days(365);

/// Raw process environment, as read by `envy`.
#[derive(Clone, Eq, PartialEq, Deserialize)]
struct Env {
    #[serde(default = "default_server_address")]
    server_address: IpAddr,
    #[serde(default = "default_server_port")]
    server_port: u16,
    database_url: Option<String>,
    #[serde(default = "default_database_max_connections")]
    database_max_connections: u32,
    jwt_secret: String,
    #[serde(default = "default_token_lifetime_seconds")]
    token_lifetime_seconds: i64,
    #[serde(default)]
    worker_id: WorkerId,
    #[serde(default)]
    process_id: ProcessId,
}

fn default_server_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_server_port() -> u16 {
    5000
}

fn default_database_max_connections() -> u32 {
    5
}

fn default_token_lifetime_seconds() -> i64 {
    3600
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Config {
    pub server_address: SocketAddr,
    pub database: Option<DatabaseConfig>,
    pub auth: AuthConfig,
    pub worker_id: WorkerId,
    pub process_id: ProcessId,
}

#[derive(Clone, Eq, PartialEq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone, Eq, PartialEq)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_lifetime: PositiveDuration,
}

impl Config {
    /// Reads the configuration from the environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if e.not_found() {
                debug!("No .env file found");
            } else {
                return Err(e.into());
            }
        }

        envy::from_env::<Env>()?.try_into()
    }
}

impl TryFrom<Env> for Config {
    type Error = ConfigError;

    fn try_from(env: Env) -> Result<Self, Self::Error> {
        if env.jwt_secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }

        let token_lifetime = Duration::seconds(env.token_lifetime_seconds);
        if token_lifetime > MAX_TOKEN_LIFETIME {
            return Err(ConfigError::TokenLifetimeTooLong(env.token_lifetime_seconds));
        }

        Ok(Self {
            server_address: SocketAddr::new(env.server_address, env.server_port),
            database: env.database_url.map(|url| DatabaseConfig {
                url,
                max_connections: env.database_max_connections,
            }),
            auth: AuthConfig {
                jwt_secret: env.jwt_secret,
                token_lifetime: token_lifetime.try_into()?,
            },
            worker_id: env.worker_id,
            process_id: env.process_id,
        })
    }
}

impl Debug for DatabaseConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // Connection strings usually carry a password.
        f.debug_struct("DatabaseConfig")
            .field("url", &"[redacted]")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl Debug for AuthConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[redacted]")
            .field("token_lifetime", &self.token_lifetime)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{Config, ConfigError, Env};

    fn env(vars: &[(&str, &str)]) -> Env {
        envy::from_iter(
            vars.iter()
                .map(|(key, value)| ((*key).to_owned(), (*value).to_owned())),
        )
        .unwrap()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::try_from(env(&[("JWT_SECRET", "secret")])).unwrap();

        assert_eq!(config.server_address.to_string(), "127.0.0.1:5000");
        assert!(config.database.is_none());
        assert_eq!(config.auth.token_lifetime.get().whole_seconds(), 3600);
        assert_eq!(config.worker_id.get(), 0);
    }

    #[test]
    fn explicit_values_are_used() {
        let config = Config::try_from(env(&[
            ("JWT_SECRET", "secret"),
            ("SERVER_ADDRESS", "0.0.0.0"),
            ("SERVER_PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/snapfeed"),
            ("TOKEN_LIFETIME_SECONDS", "60"),
            ("WORKER_ID", "3"),
        ]))
        .unwrap();

        assert_eq!(config.server_address.to_string(), "0.0.0.0:8080");
        let database = config.database.unwrap();
        assert_eq!(database.url, "postgres://localhost/snapfeed");
        assert_eq!(database.max_connections, 5);
        assert_eq!(config.auth.token_lifetime.get().whole_seconds(), 60);
        assert_eq!(config.worker_id.get(), 3);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            Config::try_from(env(&[("JWT_SECRET", "")])),
            Err(ConfigError::EmptySecret)
        ));
        assert!(matches!(
            Config::try_from(env(&[("JWT_SECRET", "s"), ("TOKEN_LIFETIME_SECONDS", "0")])),
            Err(ConfigError::TokenLifetime(_))
        ));
        assert!(matches!(
            Config::try_from(env(&[
                ("JWT_SECRET", "s"),
                ("TOKEN_LIFETIME_SECONDS", "1000000000000")
            ])),
            Err(ConfigError::TokenLifetimeTooLong(1_000_000_000_000))
        ));
        assert!(
            envy::from_iter::<_, Env>([
                ("JWT_SECRET".to_owned(), "s".to_owned()),
                ("WORKER_ID".to_owned(), "32".to_owned()),
            ])
            .is_err()
        );
    }
}
