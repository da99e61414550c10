// security/src/middleware.rs
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use models::medical::Caller;

use crate::{AuthError, IdentityOracle};

/// The caller behind a request. A request without an `Authorization` header
/// is anonymous; a header that is present but unusable is rejected.
#[derive(Debug, Clone)]
pub struct SessionCaller(pub Caller);

#[async_trait]
impl<S> FromRequestParts<S> for SessionCaller
where
    Arc<dyn IdentityOracle>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(SessionCaller(Caller::anonymous()));
        };
        let token = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AuthError::InvalidToken("expected a Bearer token".to_string()))?;

        let oracle = Arc::<dyn IdentityOracle>::from_ref(state);
        oracle.verify(token).map(SessionCaller)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::AccountExists(_) => StatusCode::CONFLICT,
            AuthError::WeakPassword => StatusCode::BAD_REQUEST,
            AuthError::PortalMismatch(_) | AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::InvalidCredentials | AuthError::MissingToken | AuthError::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::PasswordHashError(_) | AuthError::StorageError(_) | AuthError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
