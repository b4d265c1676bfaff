use serde::Serialize;
use sqlx::FromRow;
use chrono::NaiveDateTime;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub user_id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub registered_at: NaiveDateTime,
    pub last_logged_in: Option<NaiveDateTime>,
}

impl User {
    // Найти активного пользователя по email
    pub async fn find_active_by_email(email: &str, db: &crate::database::Database) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT user_id, email, password_hash, first_name, last_name, is_active, is_staff,
                    registered_at, last_logged_in
             FROM users
             WHERE email = $1 AND is_active = true"
        )
        .bind(email)
        .fetch_optional(&db.pool)
        .await
    }

    // Проверить пароль по bcrypt-хешу
    pub fn verify_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }

    pub async fn touch_last_login(&self, db: &crate::database::Database) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_logged_in = NOW() WHERE user_id = $1")
            .bind(self.user_id)
            .execute(&db.pool)
            .await?;
        Ok(())
    }
}
