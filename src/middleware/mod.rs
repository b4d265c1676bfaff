use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
};
use base64::{Engine as _, engine::general_purpose};
use std::sync::Arc;

use crate::models::User;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
    pub is_staff: bool,
}

/// Авторизованный сотрудник: каталог меняют только они.
#[derive(Debug, Clone)]
pub struct StaffUser(pub AuthUser);

/// Разбирает заголовок `Authorization: Basic base64(email:password)`.
pub fn parse_basic_credentials(header_value: &str) -> Option<(String, String)> {
    let encoded = header_value.strip_prefix("Basic ")?;
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    // Разделяем email:password
    let (email, password) = credentials.split_once(':')?;
    if email.is_empty() {
        return None;
    }
    Some((email.to_string(), password.to_string()))
}

// Basic Auth extractor
impl FromRequestParts<Arc<crate::AppState>> for AuthUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>
    ) -> Result<Self, Self::Rejection> {
        let (email, password) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_basic_credentials)
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let user = User::find_active_by_email(&email, &state.db)
            .await
            .map_err(|e| {
                tracing::error!("auth lookup failed for {}: {:?}", email, e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .ok_or(StatusCode::UNAUTHORIZED)?;

        // bcrypt тяжёлый, проверяем вне async-потоков
        let (user, verified) = tokio::task::spawn_blocking(move || {
            let verified = user.verify_password(&password);
            (user, verified)
        })
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        if !verified {
            return Err(StatusCode::UNAUTHORIZED);
        }

        if state.cache.should_update_last_login(user.user_id).await {
            if let Err(e) = user.touch_last_login(&state.db).await {
                tracing::warn!("failed to update last login for {}: {:?}", user.user_id, e);
            }
        }

        Ok(AuthUser {
            user_id: user.user_id,
            email: user.email,
            is_staff: user.is_staff,
        })
    }
}

impl FromRequestParts<Arc<crate::AppState>> for StaffUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_staff {
            return Err(StatusCode::FORBIDDEN);
        }
        Ok(StaffUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(raw: &str) -> String {
        format!("Basic {}", general_purpose::STANDARD.encode(raw))
    }

    #[test]
    fn parses_email_and_password() {
        let parsed = parse_basic_credentials(&basic("admin@example.com:difficult:password"));
        assert_eq!(
            parsed,
            Some(("admin@example.com".to_string(), "difficult:password".to_string()))
        );
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert_eq!(parse_basic_credentials("Bearer abc"), None);
        assert_eq!(parse_basic_credentials("Basic !!!"), None);
        assert_eq!(parse_basic_credentials(&basic("no-colon")), None);
        assert_eq!(parse_basic_credentials(&basic(":password")), None);
    }
}
