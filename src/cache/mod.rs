use crate::{config::RedisConfig, redis_client::RedisClient};
use tracing::info;

pub mod auth;
pub mod seats;
pub mod shows;

/// Кеш поверх Redis. Без Redis все методы работают как промах,
/// ошибки Redis только логируются.
#[derive(Clone)]
pub struct CacheService {
    redis: Option<RedisClient>,
    seats_ttl_seconds: u64,
    shows_ttl_seconds: u64,
}

impl CacheService {
    pub fn new(redis: Option<RedisClient>, config: &RedisConfig) -> Self {
        Self {
            redis,
            seats_ttl_seconds: config.seats_ttl_seconds,
            shows_ttl_seconds: config.shows_ttl_seconds,
        }
    }

    pub fn disabled() -> Self {
        Self { redis: None, seats_ttl_seconds: 0, shows_ttl_seconds: 0 }
    }

    pub fn is_enabled(&self) -> bool {
        self.redis.is_some()
    }

    pub async fn connect(config: &RedisConfig) -> redis::RedisResult<Self> {
        let redis = match config.url.as_deref() {
            Some(url) => Some(RedisClient::new(url).await?),
            None => {
                info!("REDIS_URL not set, cache disabled");
                None
            }
        };
        Ok(Self::new(redis, config))
    }

    // Соединение для одной операции
    fn conn(&self) -> Option<redis::aio::ConnectionManager> {
        self.redis.as_ref().map(|r| r.conn.clone())
    }
}
