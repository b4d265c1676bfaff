use crate::cache::CacheService;
use crate::models::Seat;
use redis::AsyncCommands;
use tracing::{debug, warn};

fn seats_key(session_id: i64) -> String {
    format!("seats:{}", session_id)
}

fn seats_version_key(session_id: i64) -> String {
    format!("seats:{}:version", session_id)
}

// Версия сеанса растёт при каждой инвалидации
const VERSION_TTL_SECONDS: i64 = 24 * 60 * 60;

// Пишем список, только если версия не сменилась с момента чтения из БД
const SET_IF_VERSION: &str = r#"
local current = redis.call('GET', KEYS[2]) or '0'
if current == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
    return 1
end
return 0
"#;

/// Версия кеша мест, прочитанная до похода в БД.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatsVersion(String);

impl CacheService {
    /// Свободные места сеанса из кеша.
    pub async fn get_available_seats(&self, session_id: i64) -> Option<Vec<Seat>> {
        let mut conn = self.conn()?;
        let data: Option<String> = match conn.get(seats_key(session_id)).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to read seats cache for session {}: {:?}", session_id, e);
                return None;
            }
        };
        data.and_then(|json| serde_json::from_str(&json).ok())
    }

    /// Текущая версия кеша мест. Читать до расчёта свободных мест.
    pub async fn seats_version(&self, session_id: i64) -> Option<SeatsVersion> {
        let mut conn = self.conn()?;
        match conn.get::<_, Option<String>>(seats_version_key(session_id)).await {
            Ok(version) => Some(SeatsVersion(version.unwrap_or_else(|| "0".to_string()))),
            Err(e) => {
                warn!("Failed to read seats cache version for session {}: {:?}", session_id, e);
                None
            }
        }
    }

    /// Кладёт список в кеш, если с момента `version` не было инвалидации.
    pub async fn cache_available_seats(&self, session_id: i64, version: &SeatsVersion, seats: &[Seat]) {
        let Some(mut conn) = self.conn() else { return };
        let Ok(data) = serde_json::to_string(seats) else { return };
        let result: Result<i32, _> = redis::Script::new(SET_IF_VERSION)
            .key(seats_key(session_id))
            .key(seats_version_key(session_id))
            .arg(&version.0)
            .arg(data)
            .arg(self.seats_ttl_seconds)
            .invoke_async(&mut conn)
            .await;
        match result {
            Ok(0) => debug!("Seats of session {} changed while loading, not cached", session_id),
            Ok(_) => {}
            Err(e) => warn!("Failed to cache seats for session {}: {:?}", session_id, e),
        }
    }

    // Инвалидировать кеш мест
    pub async fn invalidate_seats(&self, session_id: i64) {
        let Some(mut conn) = self.conn() else { return };
        let result: Result<(), _> = redis::pipe()
            .atomic()
            .incr(seats_version_key(session_id), 1)
            .ignore()
            .expire(seats_version_key(session_id), VERSION_TTL_SECONDS)
            .ignore()
            .del(seats_key(session_id))
            .ignore()
            .query_async(&mut conn)
            .await;
        match result {
            Ok(()) => debug!("Invalidated seats cache for session {}", session_id),
            Err(e) => warn!("Failed to invalidate seats cache for session {}: {:?}", session_id, e),
        }
    }
}
