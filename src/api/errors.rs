#[cfg(feature = "server")]
use crate::error::AppError;
#[cfg(feature = "server")]
use axum::http::StatusCode;
#[cfg(feature = "server")]
use axum::extract::rejection::JsonRejection;
#[cfg(feature = "server")]
use axum::extract::{FromRequest, OptionalFromRequest, Request};
#[cfg(feature = "server")]
use axum::response::{IntoResponse, Response};

/// JSON body extractor and response.
///
/// Malformed bodies, wrong content types and unknown enum values are
/// rejected as [`AppError::Validation`], so clients get the usual error body.
#[cfg(feature = "server")]
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

#[cfg(feature = "server")]
impl<T: serde::Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// A request without a content type yields `None`; a present but invalid
/// body is still rejected.
#[cfg(feature = "server")]
impl<T, S> OptionalFromRequest<S> for Json<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
        let body = <axum::Json<T> as OptionalFromRequest<S>>::from_request(req, state).await?;
        Ok(body.map(|axum::Json(value)| Json(value)))
    }
}

#[cfg(feature = "server")]
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// API-specific error wrapper that converts AppError into HTTP responses.
#[cfg(feature = "server")]
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TransitionInvalid(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvariantViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("{self}");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}
