use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Outcome of an upstream provider call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("no such title upstream")]
    NotFound,
    #[error("upstream rejected our credentials")]
    Unauthorized,
    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Upstream(err.to_string())
    }
}

/// Outcome of a local-store call. `Conflict` marks the expected race of two
/// importers hitting the same unique constraint; everything else is fatal.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("row already exists")]
    Conflict,
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

/// Client-facing error categories. Anything not explicitly NotFound,
/// Unauthorized or BadRequest collapses into Internal and is reported with a
/// trace id instead of its message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound => ApiError::NotFound,
            ProviderError::Unauthorized => ApiError::Unauthorized,
            ProviderError::Upstream(message) => ApiError::Internal(anyhow::anyhow!(message)),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let trace_id = uuid::Uuid::new_v4();

        let (status, code, message) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", message.clone())
            },
            ApiError::Internal(err) => {
                tracing::error!(trace_id = %trace_id, error = %err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "internal error".to_string())
            },
        };

        let body = json!({
            "code": code,
            "error": message,
            "traceId": trace_id,
        });

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;
    use http_body_util::BodyExt;

    use super::*;

    async fn into_parts(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn not_found_maps_to_404() {
        let (status, body) = into_parts(ApiError::NotFound).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn unauthorized_maps_to_401() {
        let (status, body) = into_parts(ApiError::Unauthorized).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn internal_error_is_sanitized_and_traced() {
        let err = ApiError::Internal(anyhow::anyhow!("connection string leaked"));
        let (status, body) = into_parts(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"], "internal error");
        assert!(body["traceId"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn provider_errors_keep_their_category() {
        assert!(matches!(ApiError::from(ProviderError::NotFound), ApiError::NotFound));
        assert!(matches!(ApiError::from(ProviderError::Unauthorized), ApiError::Unauthorized));
        assert!(matches!(
            ApiError::from(ProviderError::Upstream("boom".into())),
            ApiError::Internal(_)
        ));
    }
}
