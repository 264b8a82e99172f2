use std::str::FromStr;
use std::time::Duration;

use crate::actors::CoordinatorSettings;
use crate::outbox::OutboxRelayConfig;
use crate::utils::RetryConfig;

// ============================================================================
// Settings - loaded from the environment (optionally via .env)
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("environment variable {0} cannot be empty")]
    EmptyValue(&'static str),
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Unset means the in-memory store seeded with demo inventory.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Unset means the in-process publisher.
    pub brokers: Option<String>,
    pub message_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub progression_enabled: bool,
    pub progression_interval: Duration,
    pub health_log_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct OutboxSettings {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub max_attempts: i32,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub http: HttpSettings,
    pub database: DatabaseSettings,
    pub broker: BrokerSettings,
    pub scheduler: SchedulerSettings,
    pub outbox: OutboxSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http: HttpSettings {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseSettings {
                url: None,
                max_connections: 10,
            },
            broker: BrokerSettings {
                brokers: None,
                message_timeout_ms: 5000,
            },
            scheduler: SchedulerSettings {
                progression_enabled: true,
                progression_interval: Duration::from_millis(300_000),
                health_log_interval: Duration::from_secs(30),
            },
            outbox: OutboxSettings {
                poll_interval: Duration::from_millis(1000),
                batch_size: 100,
                max_attempts: 5,
            },
        }
    }
}

impl Settings {
    /// Reads the process environment, loading `.env` first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let defaults = Settings::default();

        let http = HttpSettings {
            host: env.string("HTTP_HOST")?.unwrap_or(defaults.http.host),
            port: env.parse("HTTP_PORT", defaults.http.port)?,
        };

        let database = DatabaseSettings {
            url: env.string("DATABASE_URL")?,
            max_connections: env.parse("DATABASE_MAX_CONNECTIONS", defaults.database.max_connections)?,
        };

        let broker = BrokerSettings {
            brokers: env.string("KAFKA_BROKERS")?,
            message_timeout_ms: env.parse("KAFKA_MESSAGE_TIMEOUT_MS", defaults.broker.message_timeout_ms)?,
        };

        let scheduler = SchedulerSettings {
            progression_enabled: env.parse(
                "ORDER_STATUS_PROGRESSION_ENABLED",
                defaults.scheduler.progression_enabled,
            )?,
            progression_interval: env.millis(
                "ORDER_STATUS_PROGRESSION_INTERVAL_MS",
                defaults.scheduler.progression_interval,
            )?,
            health_log_interval: env
                .parse(
                    "HEALTH_LOG_INTERVAL_SECS",
                    defaults.scheduler.health_log_interval.as_secs(),
                )
                .map(Duration::from_secs)?,
        };

        let outbox = OutboxSettings {
            poll_interval: env.millis("OUTBOX_POLL_INTERVAL_MS", defaults.outbox.poll_interval)?,
            batch_size: env.parse("OUTBOX_BATCH_SIZE", defaults.outbox.batch_size)?,
            max_attempts: env.parse("OUTBOX_MAX_ATTEMPTS", defaults.outbox.max_attempts)?,
        };

        let settings = Self {
            http,
            database,
            broker,
            scheduler,
            outbox,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("DATABASE_MAX_CONNECTIONS", self.database.max_connections as u64),
            ("OUTBOX_BATCH_SIZE", self.outbox.batch_size as u64),
            ("OUTBOX_MAX_ATTEMPTS", self.outbox.max_attempts.max(0) as u64),
            ("ORDER_STATUS_PROGRESSION_INTERVAL_MS", self.scheduler.progression_interval.as_millis() as u64),
            ("OUTBOX_POLL_INTERVAL_MS", self.outbox.poll_interval.as_millis() as u64),
            ("HEALTH_LOG_INTERVAL_SECS", self.scheduler.health_log_interval.as_secs()),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.http.host.clone(), self.http.port)
    }

    pub fn relay_config(&self) -> OutboxRelayConfig {
        OutboxRelayConfig {
            batch_size: self.outbox.batch_size,
            max_attempts: self.outbox.max_attempts,
            retry: RetryConfig::default(),
        }
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            progression_enabled: self.scheduler.progression_enabled,
            progression_interval: self.scheduler.progression_interval,
            outbox_poll_interval: self.outbox.poll_interval,
            health_log_interval: self.scheduler.health_log_interval,
        }
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Unset is `None`; set-but-blank is an error.
    fn string(&self, key: &'static str) -> Result<Option<String>, ConfigError> {
        match (self.lookup)(key) {
            None => Ok(None),
            Some(v) if v.trim().is_empty() => Err(ConfigError::EmptyValue(key)),
            Some(v) => Ok(Some(v.trim().to_string())),
        }
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(key)? {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn millis(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse(key, default.as_millis() as u64).map(Duration::from_millis)
    }
}
