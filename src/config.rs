use crate::error::ConfigError;

const MAX_DB_CONNECTIONS: u32 = 1024;
const MAX_OUTBOUND_BUFFER: usize = 65_536;
/// One year.
const MAX_SESSION_IDLE_MINUTES: i64 = 525_600;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
    pub session_idle_minutes: i64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "sqlite://ridechat.db?mode=rwc".to_owned(),
            bind_addr: "0.0.0.0:8080".to_owned(),
            db_max_connections: 16,
            outbound_buffer: 64,
            session_idle_minutes: 60,
        }
    }
}

impl Config {
    /// Reads the environment, honouring a `.env` file when present.
    pub fn from_env() -> Result<Config, ConfigError> {
        let _ = dotenv::dotenv();
        Config::from_lookup(|name| dotenv::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let defaults = Config::default();

        fn number<T: std::str::FromStr + PartialOrd + Default>(
            name: &'static str,
            value: Option<String>,
            default: T,
            max: T,
        ) -> Result<T, ConfigError> {
            let Some(value) = value else {
                return Ok(default);
            };
            match value.trim().parse::<T>() {
                Ok(n) if n > T::default() && n <= max => Ok(n),
                _ => Err(ConfigError::InvalidNumber { name, value }),
            }
        }

        let db_max_connections = number(
            "DB_MAX_CONNECTIONS",
            lookup("DB_MAX_CONNECTIONS"),
            defaults.db_max_connections,
            MAX_DB_CONNECTIONS,
        )?;
        let outbound_buffer = number(
            "OUTBOUND_BUFFER",
            lookup("OUTBOUND_BUFFER"),
            defaults.outbound_buffer,
            MAX_OUTBOUND_BUFFER,
        )?;
        let session_idle_minutes = number(
            "SESSION_IDLE_MINUTES",
            lookup("SESSION_IDLE_MINUTES"),
            defaults.session_idle_minutes,
            MAX_SESSION_IDLE_MINUTES,
        )?;

        Ok(Config {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            db_max_connections,
            outbound_buffer,
            session_idle_minutes,
        })
    }
}
