//! Per-user data: saved/liked videos, settings, profile.
//!
//! GET returns everything the client needs to hydrate a session in one round
//! trip. POST dispatches on a closed `action` set; every write is an upsert
//! keyed on the caller's `X-User-Id`.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;

use crate::errors::AppError;
use crate::routes::{timeout_query, user_id_from_headers};
use crate::InnerState;

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct UserVideo {
    pub user_id: String,
    pub video_id: i64,
    pub is_saved: bool,
    pub is_liked: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct UserSettings {
    pub user_id: String,
    pub dark_mode: bool,
    pub language: String,
    pub notifications_enabled: bool,
    pub auto_sound: bool,
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Profile {
    pub profile_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserDataRequest {
    pub action: Option<String>,
    pub video_id: Option<i64>,
    #[serde(default)]
    pub is_saved: bool,
    #[serde(default)]
    pub is_liked: bool,
    #[serde(default)]
    pub settings: SettingsPatch,
    pub profile_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SettingsPatch {
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub auto_sound: bool,
}

fn default_language() -> String {
    "ru".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SettingsPatch {
    fn default() -> Self {
        Self {
            dark_mode: false,
            language: default_language(),
            notifications_enabled: true,
            auto_sound: false,
        }
    }
}

#[tracing::instrument(name = "Get user data", skip(headers, inner))]
pub async fn get_user_data(
    headers: HeaderMap,
    State(inner): State<InnerState>,
) -> Result<Json<Value>, AppError> {
    let InnerState { db, .. } = inner;

    let user_id = user_id_from_headers(&headers);

    let videos = timeout_query(
        sqlx::query_as::<_, UserVideo>(
            r#"
            SELECT user_id, video_id, is_saved, is_liked, updated_at
            FROM user_videos WHERE user_id = $1
            "#,
        )
        .bind(&user_id)
        .fetch_all(&db),
    )
    .await?;

    let settings = timeout_query(
        sqlx::query_as::<_, UserSettings>(
            r#"
            SELECT user_id, dark_mode, language, notifications_enabled, auto_sound
            FROM user_settings WHERE user_id = $1
            "#,
        )
        .bind(&user_id)
        .fetch_optional(&db),
    )
    .await?;

    let profile = timeout_query(
        sqlx::query_as::<_, Profile>(
            r#"SELECT profile_name, avatar_url FROM users WHERE user_id = $1"#,
        )
        .bind(&user_id)
        .fetch_optional(&db),
    )
    .await?;

    Ok(Json(json!({
        "videos": videos,
        "settings": settings,
        "profile": profile,
    })))
}

#[tracing::instrument(name = "Update user data", skip(headers, inner, request))]
pub async fn update_user_data(
    headers: HeaderMap,
    State(inner): State<InnerState>,
    Json(request): Json<UserDataRequest>,
) -> Result<Json<Value>, AppError> {
    let InnerState { db, .. } = inner;

    let user_id = user_id_from_headers(&headers);

    let action = request
        .action
        .as_deref()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| AppError::Validation("action is required".to_string()))?;

    match action {
        "save_video" => {
            let video_id = request
                .video_id
                .ok_or_else(|| AppError::Validation("video_id is required".to_string()))?;

            timeout_query(
                sqlx::query(
                    r#"
                    INSERT INTO user_videos (user_id, video_id, is_saved)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (user_id, video_id)
                    DO UPDATE SET is_saved = EXCLUDED.is_saved, updated_at = NOW()
                    "#,
                )
                .bind(&user_id)
                .bind(video_id)
                .bind(request.is_saved)
                .execute(&db),
            )
            .await?;
        }
        "like_video" => {
            let video_id = request
                .video_id
                .ok_or_else(|| AppError::Validation("video_id is required".to_string()))?;

            timeout_query(
                sqlx::query(
                    r#"
                    INSERT INTO user_videos (user_id, video_id, is_liked)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (user_id, video_id)
                    DO UPDATE SET is_liked = EXCLUDED.is_liked, updated_at = NOW()
                    "#,
                )
                .bind(&user_id)
                .bind(video_id)
                .bind(request.is_liked)
                .execute(&db),
            )
            .await?;
        }
        "update_settings" => {
            let settings = &request.settings;

            timeout_query(
                sqlx::query(
                    r#"
                    INSERT INTO user_settings
                        (user_id, dark_mode, language, notifications_enabled, auto_sound)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (user_id)
                    DO UPDATE SET
                        dark_mode = EXCLUDED.dark_mode,
                        language = EXCLUDED.language,
                        notifications_enabled = EXCLUDED.notifications_enabled,
                        auto_sound = EXCLUDED.auto_sound,
                        updated_at = NOW()
                    "#,
                )
                .bind(&user_id)
                .bind(settings.dark_mode)
                .bind(&settings.language)
                .bind(settings.notifications_enabled)
                .bind(settings.auto_sound)
                .execute(&db),
            )
            .await?;
        }
        "update_profile" => {
            let profile_name = request
                .profile_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "@my_profile".to_string());

            timeout_query(
                sqlx::query(
                    r#"
                    INSERT INTO users (user_id, profile_name, avatar_url)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (user_id)
                    DO UPDATE SET
                        profile_name = EXCLUDED.profile_name,
                        avatar_url = EXCLUDED.avatar_url,
                        updated_at = NOW()
                    "#,
                )
                .bind(&user_id)
                .bind(&profile_name)
                .bind(&request.avatar_url)
                .execute(&db),
            )
            .await?;
        }
        other => {
            return Err(AppError::Validation(format!("Unknown action: {other}")));
        }
    }

    Ok(Json(json!({ "success": true, "message": "Data saved" })))
}
