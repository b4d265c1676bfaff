use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::sync::Arc;
use validator::Validate;

use super::{internal_error, is_foreign_key_violation, is_unique_violation, validation_error, ApiError};
use crate::cache::CacheService;
use crate::middleware::{AuthUser, StaffUser};
use crate::models::{AstronomyShow, ShowTheme};
use crate::services::media::{MediaError, MediaStorage};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/astronomy_shows", get(list_shows).post(create_show))
        .route("/astronomy_shows/{id}", get(get_show))
        .route("/astronomy_shows/{id}/upload-image", post(upload_image))
}

/* ---------- helpers ---------- */

/// "Stars, Planets" -> ["Stars", "Planets"]
pub(crate) fn parse_theme_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ShowDetail {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub show_themes: Vec<ShowTheme>,
    pub image: Option<String>,
}

pub(crate) async fn load_show_detail(
    pool: &sqlx::PgPool,
    media: &MediaStorage,
    show_id: i64,
) -> sqlx::Result<Option<ShowDetail>> {
    let Some(show) = sqlx::query_as::<_, AstronomyShow>(
        "SELECT id, title, description, image FROM astronomy_shows WHERE id = $1"
    )
    .bind(show_id)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let themes = sqlx::query_as::<_, ShowTheme>(
        r#"
        SELECT t.id, t.name
        FROM show_themes t
        JOIN astronomy_show_themes ast ON ast.show_theme_id = t.id
        WHERE ast.astronomy_show_id = $1
        ORDER BY t.id
        "#
    )
    .bind(show_id)
    .fetch_all(pool)
    .await?;

    Ok(Some(ShowDetail {
        id: show.id,
        title: show.title,
        description: show.description,
        show_themes: themes,
        image: show.image.as_deref().map(|path| media.url_for(path)),
    }))
}

/* ---------- LIST ---------- */

#[derive(Debug, Deserialize)]
struct ShowsQuery {
    title: Option<String>,
    show_themes: Option<String>,
}

#[derive(Debug, FromRow)]
struct ShowListRow {
    id: i64,
    title: String,
    description: String,
    image: Option<String>,
    show_themes: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ShowListItem {
    id: i64,
    title: String,
    description: String,
    show_themes: Vec<String>,
    image: Option<String>,
}

// GET /api/astronomy_shows?title=&show_themes=
async fn list_shows(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(params): Query<ShowsQuery>,
) -> Result<Response, ApiError> {
    let title = params.title.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let themes = params
        .show_themes
        .as_deref()
        .map(parse_theme_names)
        .filter(|names| !names.is_empty());

    // 1. Пробуем кеш
    let cache_key = CacheService::show_list_key(title, params.show_themes.as_deref());
    if let Some(cached) = state.cache.get_cached_show_list(&cache_key).await {
        return Ok(json_with_cache_header(cached, "HIT"));
    }

    // 2. Cache miss: идём в БД
    let rows = sqlx::query_as::<_, ShowListRow>(
        r#"
        SELECT s.id, s.title, s.description, s.image,
               COALESCE(
                   ARRAY_AGG(t.name::text ORDER BY t.id) FILTER (WHERE t.id IS NOT NULL),
                   '{}'::text[]
               ) AS show_themes
        FROM astronomy_shows s
        LEFT JOIN astronomy_show_themes ast ON ast.astronomy_show_id = s.id
        LEFT JOIN show_themes t ON t.id = ast.show_theme_id
        WHERE ($1::text IS NULL OR STRPOS(LOWER(s.title), LOWER($1)) > 0)
          AND ($2::text[] IS NULL OR EXISTS (
                SELECT 1
                FROM astronomy_show_themes x
                JOIN show_themes y ON y.id = x.show_theme_id
                WHERE x.astronomy_show_id = s.id AND y.name = ANY($2)
          ))
        GROUP BY s.id
        ORDER BY s.id
        "#
    )
    .bind(title)
    .bind(themes)
    .fetch_all(&state.db.pool)
    .await
    .map_err(|e| internal_error("list_shows", e))?;

    let payload: Vec<ShowListItem> = rows
        .into_iter()
        .map(|r| ShowListItem {
            id: r.id,
            title: r.title,
            description: r.description,
            show_themes: r.show_themes,
            image: r.image.as_deref().map(|path| state.media.url_for(path)),
        })
        .collect();

    // 3. Сериализуем и кладём в кеш
    let body = serde_json::to_string(&payload).map_err(|e| internal_error("list_shows serialize", e))?;
    state.cache.cache_show_list(&cache_key, &body).await;

    Ok(json_with_cache_header(body, "MISS"))
}

fn json_with_cache_header(body: String, status: &'static str) -> Response {
    ([("content-type", "application/json"), ("x-cache", status)], body).into_response()
}

/* ---------- DETAIL ---------- */

// GET /api/astronomy_shows/{id}
async fn get_show(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let show = load_show_detail(&state.db.pool, &state.media, id)
        .await
        .map_err(|e| internal_error("get_show", e))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Astronomy show {} not found", id)))?;

    Ok(Json(show))
}

/* ---------- CREATE ---------- */

#[derive(Debug, Deserialize, Validate)]
struct CreateShowRequest {
    #[validate(length(min = 1, max = 255))]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    show_themes: Vec<i64>,
}

// POST /api/astronomy_shows. Картинка при создании игнорируется, для неё есть upload-image
async fn create_show(
    State(state): State<Arc<AppState>>,
    StaffUser(staff): StaffUser,
    Json(req): Json<CreateShowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(validation_error)?;

    let mut tx = state.db.pool.begin().await
        .map_err(|e| internal_error("create_show begin", e))?;

    let inserted = sqlx::query_scalar::<_, i64>(
        "INSERT INTO astronomy_shows (title, description) VALUES ($1, $2) RETURNING id"
    )
    .bind(req.title.trim())
    .bind(&req.description)
    .fetch_one(&mut *tx)
    .await;

    let show_id = match inserted {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => {
            return Err((StatusCode::CONFLICT, format!("Astronomy show \"{}\" already exists", req.title.trim())));
        }
        Err(e) => return Err(internal_error("create_show", e)),
    };

    if !req.show_themes.is_empty() {
        let linked = sqlx::query(
            r#"
            INSERT INTO astronomy_show_themes (astronomy_show_id, show_theme_id)
            SELECT $1, theme_id FROM UNNEST($2::int8[]) AS theme_id
            ON CONFLICT DO NOTHING
            "#
        )
        .bind(show_id)
        .bind(&req.show_themes)
        .execute(&mut *tx)
        .await;

        match linked {
            Ok(_) => {}
            Err(e) if is_foreign_key_violation(&e) => {
                return Err((StatusCode::BAD_REQUEST, "Unknown show theme".to_string()));
            }
            Err(e) => return Err(internal_error("create_show themes", e)),
        }
    }

    tx.commit().await.map_err(|e| internal_error("create_show commit", e))?;
    state.cache.invalidate_show_lists().await;

    tracing::info!("Astronomy show {} created by {}", show_id, staff.email);

    let show = load_show_detail(&state.db.pool, &state.media, show_id)
        .await
        .map_err(|e| internal_error("create_show reload", e))?
        .ok_or_else(|| internal_error("create_show reload", "show vanished"))?;

    Ok((StatusCode::CREATED, Json(show)))
}

/* ---------- IMAGE ---------- */

#[derive(Debug, Serialize)]
struct ImageResponse {
    id: i64,
    image: String,
}

// POST /api/astronomy_shows/{id}/upload-image
async fn upload_image(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let show = sqlx::query_as::<_, AstronomyShow>(
        "SELECT id, title, description, image FROM astronomy_shows WHERE id = $1"
    )
    .bind(id)
    .fetch_optional(&state.db.pool)
    .await
    .map_err(|e| internal_error("upload_image lookup", e))?
    .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Astronomy show {} not found", id)))?;

    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?
    {
        if field.name() == Some("image") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?;
            image = Some(bytes);
            break;
        }
    }
    let bytes = image.ok_or_else(|| (StatusCode::BAD_REQUEST, "Field \"image\" is required".to_string()))?;

    let relative = match state.media.save_show_image(&show.title, &bytes).await {
        Ok(path) => path,
        Err(MediaError::NotAnImage) => {
            return Err((StatusCode::BAD_REQUEST, MediaError::NotAnImage.to_string()));
        }
        Err(e) => return Err(internal_error("upload_image store", e)),
    };

    if let Err(e) = sqlx::query("UPDATE astronomy_shows SET image = $1 WHERE id = $2")
        .bind(&relative)
        .bind(id)
        .execute(&state.db.pool)
        .await
    {
        // файл без записи в БД не нужен
        let _ = state.media.remove(&relative).await;
        return Err(internal_error("upload_image update", e));
    }

    if let Some(old) = show.image.as_deref() {
        if let Err(e) = state.media.remove(old).await {
            tracing::warn!("failed to remove old image {}: {:?}", old, e);
        }
    }
    state.cache.invalidate_show_lists().await;

    Ok((StatusCode::OK, Json(ImageResponse { id, image: state.media.url_for(&relative) })))
}
