//! TikTok video import and moderation.
//!
//! One resource, four methods. GET dispatches on the `action` query selector
//! (approved listing by default, `pending` and `categories` for the review
//! UI), POST imports a video by share URL, PUT applies a moderation
//! transition, DELETE soft-deletes. Videos are keyed by their share URL:
//! re-importing refreshes metadata and category but never touches the
//! moderation fields.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, Postgres, QueryBuilder};

use crate::errors::AppError;
use crate::routes::{timeout_query, user_id_from_headers};
use crate::tiktok;
use crate::InnerState;

const PUBLIC_LISTING_LIMIT: i64 = 50;
const DEFAULT_CATEGORY: &str = "general";

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Video {
    pub id: i64,
    pub tiktok_url: String,
    pub video_url: String,
    pub author: String,
    pub author_avatar: Option<String>,
    pub description: String,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub views: i64,
    pub hashtags: Vec<String>,
    pub category: String,
    pub moderation_status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Category {
    pub name: String,
    pub display_name: String,
}

/// Closed set of moderation transitions. Anything else in the `action` field
/// is a validation error, never a silent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationAction {
    Approve,
    Reject,
    UpdateCategory,
}

impl ModerationAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "update_category" => Some(Self::UpdateCategory),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub action: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    #[serde(default)]
    pub tiktok_url: String,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModerationRequest {
    pub video_id: Option<i64>,
    pub action: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub id: Option<i64>,
}

const VIDEO_COLUMNS: &str = "id, tiktok_url, video_url, author, author_avatar, description, \
     likes, comments, shares, views, hashtags, category, moderation_status, created_at";

#[tracing::instrument(name = "List videos", skip(inner))]
pub async fn list_videos(
    State(inner): State<InnerState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, AppError> {
    let InnerState { db, .. } = inner;

    match params.action.as_deref() {
        Some("categories") => {
            let categories = timeout_query(
                sqlx::query_as::<_, Category>(
                    r#"SELECT name, display_name FROM video_categories ORDER BY name"#,
                )
                .fetch_all(&db),
            )
            .await?;

            Ok(Json(json!({ "categories": categories })))
        }
        Some("pending") => {
            let videos = timeout_query(
                sqlx::query_as::<_, Video>(&format!(
                    "SELECT {VIDEO_COLUMNS} FROM tiktok_videos \
                     WHERE is_active = TRUE AND moderation_status = 'pending' \
                     ORDER BY created_at DESC"
                ))
                .fetch_all(&db),
            )
            .await?;

            Ok(Json(json!({ "videos": videos })))
        }
        _ => {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "SELECT {VIDEO_COLUMNS} FROM tiktok_videos \
                 WHERE is_active = TRUE AND moderation_status = 'approved'"
            ));

            if let Some(category) = params.category.as_deref().filter(|c| !c.trim().is_empty()) {
                builder.push(" AND category = ");
                builder.push_bind(category.to_string());
            }

            builder.push(" ORDER BY created_at DESC LIMIT ");
            builder.push_bind(PUBLIC_LISTING_LIMIT);

            let query = builder.build_query_as::<Video>();
            let videos = timeout_query(query.fetch_all(&db)).await?;

            Ok(Json(json!({ "videos": videos })))
        }
    }
}

#[tracing::instrument(name = "Import video", skip(headers, inner, request))]
pub async fn import_video(
    headers: HeaderMap,
    State(inner): State<InnerState>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<Value>, AppError> {
    let InnerState { db, http } = inner;

    let user_id = user_id_from_headers(&headers);
    let tiktok_url = request.tiktok_url.trim();

    if tiktok_url.is_empty() {
        return Err(AppError::Validation("TikTok URL is required".to_string()));
    }

    let Some(metadata) = tiktok::fetch_metadata(&http, tiktok_url).await else {
        return Err(AppError::Validation(
            "Invalid TikTok URL or unable to fetch video".to_string(),
        ));
    };

    let category = request
        .category
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    // New rows start pending via the column default; conflicts refresh
    // metadata and category only, leaving moderation state and the active
    // flag untouched.
    let video_id: i64 = timeout_query(
        sqlx::query_scalar(
            r#"
            INSERT INTO tiktok_videos
                (tiktok_url, video_url, author, author_avatar, description,
                 likes, comments, shares, views, hashtags, category, added_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (tiktok_url)
            DO UPDATE SET
                video_url = EXCLUDED.video_url,
                author = EXCLUDED.author,
                author_avatar = EXCLUDED.author_avatar,
                description = EXCLUDED.description,
                likes = EXCLUDED.likes,
                comments = EXCLUDED.comments,
                shares = EXCLUDED.shares,
                views = EXCLUDED.views,
                hashtags = EXCLUDED.hashtags,
                category = EXCLUDED.category,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(tiktok_url)
        .bind(&metadata.video_url)
        .bind(&metadata.author)
        .bind(&metadata.author_avatar)
        .bind(&metadata.description)
        .bind(metadata.likes)
        .bind(metadata.comments)
        .bind(metadata.shares)
        .bind(metadata.views)
        .bind(&metadata.hashtags)
        .bind(&category)
        .bind(&user_id)
        .fetch_one(&db),
    )
    .await?;

    tracing::info!(video_id, author = %metadata.author, %user_id, "Video imported");

    Ok(Json(json!({
        "success": true,
        "message": "Video imported successfully",
        "video_id": video_id,
        "video_data": metadata,
    })))
}

#[tracing::instrument(name = "Moderate video", skip(headers, inner, request))]
pub async fn moderate_video(
    headers: HeaderMap,
    State(inner): State<InnerState>,
    Json(request): Json<ModerationRequest>,
) -> Result<Json<Value>, AppError> {
    let InnerState { db, .. } = inner;

    let user_id = user_id_from_headers(&headers);

    let video_id = request.video_id.ok_or_else(|| {
        AppError::Validation("video_id and action are required".to_string())
    })?;
    let action = request
        .action
        .as_deref()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| AppError::Validation("video_id and action are required".to_string()))?;
    let action = ModerationAction::parse(action)
        .ok_or_else(|| AppError::Validation(format!("Unknown moderation action: {action}")))?;

    let message = match action {
        ModerationAction::Approve => {
            timeout_query(
                sqlx::query(
                    r#"
                    UPDATE tiktok_videos
                    SET moderation_status = 'approved',
                        moderated_by = $2,
                        moderated_at = NOW(),
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(video_id)
                .bind(&user_id)
                .execute(&db),
            )
            .await?;

            "Video approved"
        }
        ModerationAction::Reject => {
            // Rejection is terminal: the video also drops out of every
            // listing via the active flag.
            timeout_query(
                sqlx::query(
                    r#"
                    UPDATE tiktok_videos
                    SET moderation_status = 'rejected',
                        is_active = FALSE,
                        moderated_by = $2,
                        moderated_at = NOW(),
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(video_id)
                .bind(&user_id)
                .execute(&db),
            )
            .await?;

            "Video rejected"
        }
        ModerationAction::UpdateCategory => {
            let category = request
                .category
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or(DEFAULT_CATEGORY);

            timeout_query(
                sqlx::query(
                    r#"UPDATE tiktok_videos SET category = $2, updated_at = NOW() WHERE id = $1"#,
                )
                .bind(video_id)
                .bind(category)
                .execute(&db),
            )
            .await?;

            "Category updated"
        }
    };

    tracing::info!(video_id, ?action, %user_id, "Moderation action applied");

    Ok(Json(json!({ "success": true, "message": message })))
}

#[tracing::instrument(name = "Delete video", skip(inner))]
pub async fn delete_video(
    State(inner): State<InnerState>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<Value>, AppError> {
    let InnerState { db, .. } = inner;

    let video_id = params
        .id
        .ok_or_else(|| AppError::Validation("Video ID is required".to_string()))?;

    timeout_query(
        sqlx::query(
            r#"UPDATE tiktok_videos SET is_active = FALSE, updated_at = NOW() WHERE id = $1"#,
        )
        .bind(video_id)
        .execute(&db),
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Video deleted successfully",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moderation_actions_form_a_closed_set() {
        assert_eq!(
            ModerationAction::parse("approve"),
            Some(ModerationAction::Approve)
        );
        assert_eq!(
            ModerationAction::parse("reject"),
            Some(ModerationAction::Reject)
        );
        assert_eq!(
            ModerationAction::parse("update_category"),
            Some(ModerationAction::UpdateCategory)
        );
        assert_eq!(ModerationAction::parse("publish"), None);
        assert_eq!(ModerationAction::parse(""), None);
        assert_eq!(ModerationAction::parse("Approve"), None);
    }

    #[test]
    fn import_request_tolerates_missing_fields() {
        let request: ImportRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.tiktok_url, "");
        assert_eq!(request.category, None);
    }

    #[test]
    fn moderation_request_fields_are_optional() {
        let request: ModerationRequest =
            serde_json::from_str(r#"{"video_id": 7, "action": "approve"}"#).unwrap();
        assert_eq!(request.video_id, Some(7));
        assert_eq!(request.action.as_deref(), Some("approve"));
        assert_eq!(request.category, None);

        let empty: ModerationRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.video_id, None);
        assert_eq!(empty.action, None);
    }

    fn test_state(db: sqlx::PgPool) -> InnerState {
        InnerState {
            db,
            http: reqwest::Client::new(),
        }
    }

    async fn import(state: &InnerState, url: &str, category: Option<&str>) -> i64 {
        let response = import_video(
            HeaderMap::new(),
            State(state.clone()),
            Json(ImportRequest {
                tiktok_url: url.to_string(),
                category: category.map(String::from),
            }),
        )
        .await
        .unwrap();

        response.0["video_id"].as_i64().unwrap()
    }

    async fn moderate(state: &InnerState, video_id: i64, action: &str) {
        moderate_video(
            HeaderMap::new(),
            State(state.clone()),
            Json(ModerationRequest {
                video_id: Some(video_id),
                action: Some(action.to_string()),
                category: None,
            }),
        )
        .await
        .unwrap();
    }

    async fn listed_ids(state: &InnerState, action: Option<&str>) -> Vec<i64> {
        let response = list_videos(
            State(state.clone()),
            Query(ListParams {
                action: action.map(String::from),
                category: None,
            }),
        )
        .await
        .unwrap();

        response.0["videos"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["id"].as_i64().unwrap())
            .collect()
    }

    #[sqlx::test]
    async fn reimport_refreshes_category_but_keeps_moderation_status(pool: sqlx::PgPool) {
        let state = test_state(pool.clone());
        let url = "https://tiktok.com/@alice/video/123456#funny";

        let video_id = import(&state, url, None).await;
        moderate(&state, video_id, "approve").await;

        let second_id = import(&state, url, Some("music")).await;
        assert_eq!(second_id, video_id);

        let (status, category): (String, String) = sqlx::query_as(
            r#"SELECT moderation_status, category FROM tiktok_videos WHERE id = $1"#,
        )
        .bind(video_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(status, "approved");
        assert_eq!(category, "music");

        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM tiktok_videos"#)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test]
    async fn imported_video_stays_out_of_approved_listing_until_approved(pool: sqlx::PgPool) {
        let state = test_state(pool);

        let video_id = import(&state, "https://tiktok.com/@bob/video/111/", None).await;

        assert!(listed_ids(&state, None).await.is_empty());
        assert_eq!(listed_ids(&state, Some("pending")).await, vec![video_id]);

        moderate(&state, video_id, "approve").await;

        assert_eq!(listed_ids(&state, None).await, vec![video_id]);
        assert!(listed_ids(&state, Some("pending")).await.is_empty());
    }

    #[sqlx::test]
    async fn rejected_video_disappears_from_all_listings(pool: sqlx::PgPool) {
        let state = test_state(pool.clone());

        let video_id = import(&state, "https://tiktok.com/@carol/video/222/", None).await;
        moderate(&state, video_id, "reject").await;

        assert!(listed_ids(&state, None).await.is_empty());
        assert!(listed_ids(&state, Some("pending")).await.is_empty());

        let is_active: bool =
            sqlx::query_scalar(r#"SELECT is_active FROM tiktok_videos WHERE id = $1"#)
                .bind(video_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(!is_active);
    }

    #[sqlx::test]
    async fn soft_delete_hides_one_record_without_touching_others(pool: sqlx::PgPool) {
        let state = test_state(pool);

        let first = import(&state, "https://tiktok.com/@dave/video/333/", None).await;
        let second = import(&state, "https://tiktok.com/@dave/video/444/", None).await;
        moderate(&state, first, "approve").await;
        moderate(&state, second, "approve").await;

        delete_video(
            State(state.clone()),
            Query(DeleteParams { id: Some(first) }),
        )
        .await
        .unwrap();

        assert_eq!(listed_ids(&state, None).await, vec![second]);
    }

    #[sqlx::test]
    async fn unknown_moderation_action_is_rejected_without_writes(pool: sqlx::PgPool) {
        let state = test_state(pool.clone());

        let video_id = import(&state, "https://tiktok.com/@erin/video/555/", None).await;

        let result = moderate_video(
            HeaderMap::new(),
            State(state.clone()),
            Json(ModerationRequest {
                video_id: Some(video_id),
                action: Some("publish".to_string()),
                category: None,
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let status: String =
            sqlx::query_scalar(r#"SELECT moderation_status FROM tiktok_videos WHERE id = $1"#)
                .bind(video_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "pending");
    }
}
