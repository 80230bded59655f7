//! Authentication extractors for axum.

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::authorize::{ADMINISTRATORS, authorize};
use super::messages::MALFORMED_HEADER;
use super::service::AuthService;
use super::token::AuthContext;
use super::AuthError;

/// Extractor for authenticated requests.
///
/// Use this in handler parameters to require a valid token of any role.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthContext);

/// Extractor for administrator-only requests.
///
/// Authentication failures are still reported as 401; only a valid token
/// with a non-administrator role gets 403.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub AuthContext);

/// Error response for auth failures.
#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(detail) => {
                tracing::error!(detail = %detail, "Internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = AuthErrorResponse {
            error: self.to_string(),
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);
        let header = match parts.headers.get(AUTHORIZATION) {
            Some(value) => Some(
                value
                    .to_str()
                    .map_err(|_| AuthError::Authentication(MALFORMED_HEADER))?,
            ),
            None => None,
        };

        let context = auth.authenticate(header).await?;
        parts.extensions.insert(context.clone());
        Ok(Self(context))
    }
}

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireAuth(context) = RequireAuth::from_request_parts(parts, state).await?;
        authorize(context.role, ADMINISTRATORS)?;
        Ok(Self(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use dishpatch_core::ValidationError;

    async fn render(err: AuthError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases = [
            (
                AuthError::Validation(ValidationError::InvalidIdentifier),
                StatusCode::BAD_REQUEST,
            ),
            (AuthError::Conflict("email already registered".into()), StatusCode::CONFLICT),
            (AuthError::Authentication("invalid or expired"), StatusCode::UNAUTHORIZED),
            (AuthError::Authorization("pending approval"), StatusCode::FORBIDDEN),
            (AuthError::NotFound("nope".into()), StatusCode::NOT_FOUND),
        ];

        for (err, expected) in cases {
            let message = err.to_string();
            let (status, body) = render(err).await;
            assert_eq!(status, expected);
            assert_eq!(body["error"], message);
        }
    }

    #[tokio::test]
    async fn test_internal_detail_never_rendered() {
        let (status, body) =
            render(AuthError::Internal("postgres://admin:pw@db:5432 refused".into())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            serde_json::json!({ "error": "internal server error", "code": "internal_error" })
        );
    }
}
