use serde::Deserialize;
use std::{env, path::PathBuf, str::FromStr};
use thiserror::Error;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub media: MediaConfig,
    pub pagination: PaginationConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Настройки Redis. Без REDIS_URL кеш отключён
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub seats_ttl_seconds: u64,
    pub shows_ttl_seconds: u64,
}

// Хранилище картинок шоу
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    pub root: PathBuf,
    pub url_prefix: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    pub reservation_page_size: u32,
    pub max_page_size: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Собирает конфигурацию из произвольного источника переменных.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        Ok(Config {
            app: AppConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "PORT", 8000)?,
                environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
                rust_log: lookup("RUST_LOG")
                    .unwrap_or_else(|| "planetarium=debug,tower_http=debug".to_string()),
                log_format,
            },
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
                pool_size: parse_or(&lookup, "DB_POOL_SIZE", 20)?,
            },
            redis: RedisConfig {
                url: lookup("REDIS_URL").filter(|url| !url.is_empty()),
                seats_ttl_seconds: parse_or(&lookup, "SEATS_CACHE_TTL_SECONDS", 30)?,
                shows_ttl_seconds: parse_or(&lookup, "SHOWS_CACHE_TTL_SECONDS", 60)?,
            },
            media: MediaConfig {
                root: lookup("MEDIA_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./media")),
                url_prefix: lookup("MEDIA_URL").unwrap_or_else(|| "/media".to_string()),
                max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 5 * 1024 * 1024)?,
            },
            pagination: PaginationConfig {
                reservation_page_size: parse_or(&lookup, "RESERVATION_PAGE_SIZE", 5)?,
                max_page_size: parse_or(&lookup, "MAX_PAGE_SIZE", 100)?,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://localhost/planetarium")]))
            .unwrap();

        assert_eq!(config.app.port, 8000);
        assert_eq!(config.app.log_format, LogFormat::Pretty);
        assert_eq!(config.database.pool_size, 20);
        assert!(config.redis.url.is_none());
        assert_eq!(config.media.url_prefix, "/media");
        assert_eq!(config.pagination.reservation_page_size, 5);
        assert_eq!(config.pagination.max_page_size, 100);
    }

    #[test]
    fn database_url_is_required() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn bad_numbers_are_reported_with_their_key() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/planetarium"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();

        assert_eq!(
            err,
            ConfigError::Invalid { key: "PORT", value: "eighty".to_string() }
        );
    }

    #[test]
    fn empty_redis_url_disables_cache_and_json_logs_are_selectable() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/planetarium"),
            ("REDIS_URL", ""),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert!(config.redis.url.is_none());
        assert_eq!(config.app.log_format, LogFormat::Json);
    }
}
