use std::env;
use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    pub session_ttl_minutes: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://courses.db".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            db_max_connections: 5,
            run_migrations: true,
            session_ttl_minutes: 60,
        }
    }
}

impl AppConfig {
    pub fn new_from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: parse_var("BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS")?
                .unwrap_or(defaults.db_max_connections),
            run_migrations: parse_var("RUN_MIGRATIONS")?.unwrap_or(defaults.run_migrations),
            session_ttl_minutes: parse_var("SESSION_TTL_MINUTES")?
                .unwrap_or(defaults.session_ttl_minutes),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(None),
    }
}
