pub(crate) mod chat;
pub(crate) mod health_check;
pub(crate) mod user_data;
pub(crate) mod videos;

pub use chat::*;
pub use health_check::*;
pub use user_data::*;
pub use videos::*;

use axum::http::HeaderMap;

use crate::errors::AppError;

/// Caller identity comes from the `X-User-Id` header (matched
/// case-insensitively by `HeaderMap`); absent or unreadable values map to the
/// literal `anonymous`.
pub fn user_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous")
        .to_string()
}

/// Fallback for unsupported HTTP methods on an otherwise valid path.
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

/// Bare OPTIONS (non-preflight requests bypass the CORS layer) still gets an
/// empty 200; the layer appends the capability headers.
pub async fn preflight() -> axum::http::StatusCode {
    axum::http::StatusCode::OK
}

const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Bounds every storage call so a stuck connection surfaces as a 500 instead
/// of hanging the request.
pub async fn timeout_query<T, F>(fut: F) -> Result<T, AppError>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(Ok(res)) => Ok(res),
        Ok(Err(e)) => Err(AppError::from(e)),
        Err(_) => Err(AppError::Database(anyhow::anyhow!(
            "Query timeout after {:?}",
            QUERY_TIMEOUT
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn user_id_header_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("X-User-Id", HeaderValue::from_static("user-42"));
        assert_eq!(user_id_from_headers(&headers), "user-42");
    }

    #[test]
    fn missing_or_empty_user_id_is_anonymous() {
        assert_eq!(user_id_from_headers(&HeaderMap::new()), "anonymous");

        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static(""));
        assert_eq!(user_id_from_headers(&headers), "anonymous");
    }
}
