use crate::cache::CacheService;
use redis::AsyncCommands;
use tracing::{info, warn};

const SHOWS_PREFIX: &str = "shows:";

impl CacheService {
    /// Ключ кеша списка шоу для конкретного набора фильтров.
    pub fn show_list_key(title: Option<&str>, show_themes: Option<&str>) -> String {
        let query = serde_urlencoded::to_string([
            ("title", title.unwrap_or_default()),
            ("themes", show_themes.unwrap_or_default()),
        ])
        .unwrap_or_default();
        format!("{}{}", SHOWS_PREFIX, query)
    }

    /// Получает закешированный список шоу по ключу.
    pub async fn get_cached_show_list(&self, key: &str) -> Option<String> {
        let mut conn = self.conn()?;
        match conn.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to read show list cache: {:?}", e);
                None
            }
        }
    }

    pub async fn cache_show_list(&self, key: &str, value: &str) {
        let Some(mut conn) = self.conn() else { return };
        let result: Result<(), _> = conn.set_ex(key, value, self.shows_ttl_seconds).await;
        if let Err(e) = result {
            warn!("Failed to cache show list: {:?}", e);
        }
    }

    /// Сбрасывает все закешированные списки шоу (после создания или смены картинки).
    pub async fn invalidate_show_lists(&self) {
        let Some(mut conn) = self.conn() else { return };

        let keys: Vec<String> = match redis::cmd("KEYS")
            .arg(format!("{}*", SHOWS_PREFIX))
            .query_async(&mut conn)
            .await
        {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to list show cache keys: {:?}", e);
                return;
            }
        };

        if keys.is_empty() {
            return;
        }

        let count = keys.len();
        let result: Result<(), _> = conn.del(keys).await;
        match result {
            Ok(()) => info!("Invalidated {} show list cache entries", count),
            Err(e) => warn!("Failed to invalidate show list cache: {:?}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_depends_on_both_filters() {
        let plain = CacheService::show_list_key(None, None);
        let titled = CacheService::show_list_key(Some("Stars"), None);
        let themed = CacheService::show_list_key(None, Some("Stars"));

        assert!(plain.starts_with("shows:"));
        assert_ne!(plain, titled);
        assert_ne!(titled, themed);
    }

    #[test]
    fn separators_inside_filters_do_not_collide() {
        let smuggled = CacheService::show_list_key(Some("x&themes=y"), None);
        let split = CacheService::show_list_key(Some("x"), Some("y&themes="));

        assert_ne!(smuggled, split);
        assert_eq!(
            CacheService::show_list_key(Some("Stars & Planets"), None),
            "shows:title=Stars+%26+Planets&themes="
        );
    }
}
