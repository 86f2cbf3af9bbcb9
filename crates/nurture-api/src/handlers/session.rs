//! Session issuance and token refresh shared by student and employee logins.

use axum::body::Bytes;
use axum::extract::State;
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{resolve_account, AccountRole, TokenKind, TokenPair, REFRESH_COOKIE};
use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

/// Email/password login body. Students historically send `studentEmail`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "studentEmail")]
    pub email: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    /// Both credentials, trimmed, or 400.
    pub fn credentials(&self) -> Result<(String, &str), ApiError> {
        let email = super::present(&self.email);
        let password = self.password.as_deref().filter(|p| !p.is_empty());
        match (email, password) {
            (Some(email), Some(password)) => {
                Ok((nurture_core::validate::normalize_email(email), password))
            }
            _ => Err(ApiError::BadRequest(
                "Email and password are required".to_string(),
            )),
        }
    }
}

/// Issue a token pair, remember the refresh token and set both cookies.
pub fn start_session(
    state: &AppState,
    jar: CookieJar,
    id: Uuid,
    role: AccountRole,
) -> Result<(CookieJar, TokenPair), ApiError> {
    let tokens = state.tokens.issue(id, role)?;
    store_refresh_token(state, id, role, Some(&tokens.refresh_token))?;
    let jar = state.tokens.set_session_cookies(jar, &tokens);
    Ok((jar, tokens))
}

/// Forget the stored refresh token and expire both cookies.
pub fn end_session(
    state: &AppState,
    jar: CookieJar,
    id: Uuid,
    role: AccountRole,
) -> Result<CookieJar, ApiError> {
    store_refresh_token(state, id, role, None)?;
    Ok(state.tokens.clear_session_cookies(jar))
}

fn store_refresh_token(
    state: &AppState,
    id: Uuid,
    role: AccountRole,
    token: Option<&str>,
) -> Result<(), ApiError> {
    if role == AccountRole::Student {
        state.students.set_refresh_token(id, token)?;
    } else {
        state.employees.set_refresh_token(id, token)?;
    }
    Ok(())
}

/// Compare-and-swap the stored refresh token. False means `old` was
/// already rotated out or cleared.
fn rotate_refresh_token(
    state: &AppState,
    id: Uuid,
    role: AccountRole,
    old: &str,
    new: &str,
) -> Result<bool, ApiError> {
    let rotated = if role == AccountRole::Student {
        state.students.rotate_refresh_token(id, old, new)?
    } else {
        state.employees.rotate_refresh_token(id, old, new)?
    };
    Ok(rotated)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: Option<String>,
}

/// POST /api/v1/auth/refresh
///
/// Accepts the refresh token from the `refreshToken` cookie or the JSON
/// body. The token must still be the one stored for the account; the swap
/// to the new token happens in a single statement, so of several requests
/// presenting the same token only one succeeds.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, ApiResponse<TokenPair>), ApiError> {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshRequest>(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?
            .refresh_token
    };
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .or(from_body)
        .ok_or_else(|| ApiError::Unauthorized("Unauthorized request".to_string()))?;

    let claims = state.tokens.verify(&token, TokenKind::Refresh)?;
    let account = resolve_account(&state, claims.sub, claims.role)?;

    let tokens = state.tokens.issue(account.id, account.role)?;
    if !rotate_refresh_token(&state, account.id, account.role, &token, &tokens.refresh_token)? {
        tracing::warn!(account = %account.id, "Refresh token reuse or mismatch");
        return Err(ApiError::Unauthorized(
            "Refresh token is expired or used".to_string(),
        ));
    }

    let jar = state.tokens.set_session_cookies(jar, &tokens);
    tracing::debug!(account = %account.id, "Session refreshed");
    Ok((jar, ApiResponse::ok(tokens, "Access token refreshed")))
}
