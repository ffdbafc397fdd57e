use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use minerva_bot::provider::ProviderError;
use minerva_db::StoreError;
use minerva_types::api::ApiResponse;
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Route-level error, rendered as the standard `{success: false, ...}`
/// envelope. Internal details are logged, never sent to clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(msg) => Self::Validation(msg),
            StoreError::NotFound(msg) => Self::NotFound(msg),
            other => Self::Internal(other.into()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(anyhow::anyhow!("blocking task failed: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Provider(e) => {
                error!("provider error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Error al comunicarse con el servicio de IA".to_string(),
                )
            }
            ApiError::Internal(e) => {
                error!("internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error interno del servidor".to_string(),
                )
            }
        };

        let body = ApiResponse::<()>::failure(message, None);
        (status, Json(body)).into_response()
    }
}

/// Run a database closure off the async runtime.
pub async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> minerva_db::Result<T> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}
