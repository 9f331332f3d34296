use std::env;
use std::time::Duration;

use adrbac_core::{AppError, AppResult};
use adrbac_infrastructure::HttpEmployeeSourceConfig;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub cache_ttl_seconds: u32,
    pub cache_key_prefix: String,
    pub sweep_interval_seconds: u64,
    pub expiring_soon_days: u32,
    pub employee_api: Option<HttpEmployeeSourceConfig>,
}

impl WorkerConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let optional = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let database_url = optional("DATABASE_URL")
            .ok_or_else(|| AppError::Validation("DATABASE_URL is required".to_owned()))?;
        let redis_url = optional("REDIS_URL");
        let cache_ttl_seconds =
            parse_or("PERMISSION_CACHE_TTL_SECONDS", optional("PERMISSION_CACHE_TTL_SECONDS"), 3600)?;
        let cache_key_prefix = optional("PERMISSION_CACHE_KEY_PREFIX")
            .unwrap_or_else(|| "adrbac:permissions".to_owned());
        let sweep_interval_seconds = parse_or(
            "EXPIRY_SWEEP_INTERVAL_SECONDS",
            optional("EXPIRY_SWEEP_INTERVAL_SECONDS"),
            300,
        )?;
        let expiring_soon_days =
            parse_or("EXPIRING_SOON_DAYS", optional("EXPIRING_SOON_DAYS"), 7)?;

        if sweep_interval_seconds == 0 {
            return Err(AppError::Validation(
                "EXPIRY_SWEEP_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        let employee_api = match optional("EMPLOYEE_API_URL") {
            Some(base_url) => {
                let timeout_seconds = parse_or(
                    "EMPLOYEE_API_TIMEOUT_SECONDS",
                    optional("EMPLOYEE_API_TIMEOUT_SECONDS"),
                    30,
                )?;
                Some(HttpEmployeeSourceConfig {
                    base_url,
                    secret: optional("EMPLOYEE_API_SECRET"),
                    timeout: Duration::from_secs(timeout_seconds),
                })
            }
            None => None,
        };

        Ok(Self {
            database_url,
            redis_url,
            cache_ttl_seconds,
            cache_key_prefix,
            sweep_interval_seconds,
            expiring_soon_days,
            employee_api,
        })
    }
}

fn parse_or<T>(name: &str, value: Option<String>, default: T) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(value) => value.parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}
