use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::{security, state::AppState};

/// Caller identity taken from a verified bearer token. Whether the caller may
/// touch a given exam is decided later, per exam.
#[derive(Debug, Clone)]
pub(crate) struct CurrentUser {
    pub(crate) id: String,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let claims = security::verify_token(token, app_state.settings())
            .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))?;

        Ok(CurrentUser { id: claims.sub })
    }
}

/// Per-caller throttle on marking edits. Redis errors let the request through.
pub(crate) async fn enforce_marking_rate_limit(
    state: &AppState,
    user: &CurrentUser,
) -> Result<(), ApiError> {
    let preview = state.settings().preview();
    let key = format!("rate:marking:{}", user.id);

    match state
        .redis()
        .rate_limit(&key, preview.marking_edit_rate_limit, preview.marking_edit_rate_window_seconds)
        .await
    {
        Ok(true) => Ok(()),
        Ok(false) => Err(ApiError::TooManyRequests("Too many marking edits, slow down")),
        Err(err) => {
            tracing::warn!(error = %err, caller_id = %user.id, "Rate limit check failed");
            Ok(())
        }
    }
}
