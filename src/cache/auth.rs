use crate::cache::CacheService;

impl CacheService {
    /// Обновлять last_logged_in не чаще раза в 15 минут на пользователя.
    /// Без Redis обновляем всегда.
    pub async fn should_update_last_login(&self, user_id: i64) -> bool {
        let Some(mut conn) = self.conn() else { return true };
        let key = format!("last_login_update:{}", user_id);
        let result: Result<Option<String>, _> = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(900)
            .query_async(&mut conn)
            .await;
        // SET NX отвечает nil, если ключ уже есть
        matches!(result, Ok(Some(_)) | Err(_))
    }
}
