//! Session authentication: bcrypt password hashing, HS256 access/refresh
//! tokens, session cookies and the middleware guarding protected routes.
//!
//! Tokens are read from the `accessToken` cookie first, then from an
//! `Authorization: Bearer <token>` header.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nurture_core::config::AuthConfig;
use nurture_core::types::{EmployeeStatus, Role};

use crate::error::ApiError;
use crate::state::AppState;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Who a token was issued to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountRole {
    Student,
    Admin,
    Educator,
    Staff,
}

impl AccountRole {
    /// Any employee account.
    pub fn is_staff(&self) -> bool {
        !matches!(self, AccountRole::Student)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, AccountRole::Admin)
    }
}

impl From<Role> for AccountRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Admin => AccountRole::Admin,
            Role::Educator => AccountRole::Educator,
            Role::Staff => AccountRole::Staff,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims for both token kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: AccountRole,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
    /// Random id so two tokens issued in the same second differ.
    pub jti: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// The authenticated caller, inserted into request extensions by
/// [`require_auth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: AccountRole,
}

impl AuthUser {
    /// Allow the owner of a record or any staff member.
    pub fn ensure_self_or_staff(&self, owner: Uuid) -> Result<(), ApiError> {
        if self.id == owner || self.role.is_staff() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "You are not allowed to access this record".to_string(),
            ))
        }
    }

    pub fn ensure_student(&self) -> Result<(), ApiError> {
        if self.role == AccountRole::Student {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Only students can use this endpoint".to_string()))
        }
    }

    pub fn ensure_staff(&self) -> Result<(), ApiError> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Only staff can use this endpoint".to_string()))
        }
    }
}

/// Issues and verifies tokens and builds session cookies.
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    cookie_secure: bool,
    cookie_max_age: time::Duration,
    bcrypt_cost: u32,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            access_ttl: Duration::minutes(config.access_token_expiry_mins),
            refresh_ttl: Duration::days(config.refresh_token_expiry_days),
            cookie_secure: config.cookie_secure,
            cookie_max_age: time::Duration::days(config.cookie_max_age_days),
            bcrypt_cost: config.bcrypt_cost,
        }
    }

    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }

    /// Issue a fresh access/refresh pair.
    pub fn issue(&self, subject: Uuid, role: AccountRole) -> Result<TokenPair, ApiError> {
        Ok(TokenPair {
            access_token: self.sign(subject, role, TokenKind::Access)?,
            refresh_token: self.sign(subject, role, TokenKind::Refresh)?,
        })
    }

    fn sign(&self, subject: Uuid, role: AccountRole, kind: TokenKind) -> Result<String, ApiError> {
        let now = Utc::now();
        let (ttl, key) = match kind {
            TokenKind::Access => (self.access_ttl, &self.access_encoding),
            TokenKind::Refresh => (self.refresh_ttl, &self.refresh_encoding),
        };
        let claims = Claims {
            sub: subject,
            role,
            kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: token_id(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, key)
            .map_err(|e| ApiError::Internal(format!("Failed to generate tokens: {}", e)))
    }

    /// Decode and check a token of the expected kind.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, ApiError> {
        let key = match kind {
            TokenKind::Access => &self.access_decoding,
            TokenKind::Refresh => &self.refresh_decoding,
        };
        let data = decode::<Claims>(token, key, &Validation::new(Algorithm::HS256)).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            ApiError::Unauthorized(match kind {
                TokenKind::Access => "Invalid access token".to_string(),
                TokenKind::Refresh => "Invalid refresh token".to_string(),
            })
        })?;
        if data.claims.kind != kind {
            return Err(ApiError::Unauthorized("Wrong token type".to_string()));
        }
        Ok(data.claims)
    }

    fn cookie(&self, name: &'static str, value: String) -> Cookie<'static> {
        Cookie::build((name, value))
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(SameSite::None)
            .path("/")
            .max_age(self.cookie_max_age)
            .build()
    }

    /// Add both session cookies.
    pub fn set_session_cookies(&self, jar: CookieJar, tokens: &TokenPair) -> CookieJar {
        jar.add(self.cookie(ACCESS_COOKIE, tokens.access_token.clone()))
            .add(self.cookie(REFRESH_COOKIE, tokens.refresh_token.clone()))
    }

    /// Expire both session cookies.
    pub fn clear_session_cookies(&self, jar: CookieJar) -> CookieJar {
        jar.remove(self.cookie(ACCESS_COOKIE, String::new()))
            .remove(self.cookie(REFRESH_COOKIE, String::new()))
    }
}

/// Random 32-character hex token id.
fn token_id() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    hex::encode(bytes)
}

/// Hash a password with bcrypt on the blocking pool.
pub async fn hash_password(plain: &str, cost: u32) -> Result<String, ApiError> {
    let plain = plain.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(plain, cost))
        .await?
        .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))
}

/// Check a password against a bcrypt hash on the blocking pool. A malformed
/// stored hash counts as a mismatch.
pub async fn verify_password(plain: &str, hash: &str) -> Result<bool, ApiError> {
    let plain = plain.to_string();
    let hash = hash.to_string();
    let result = tokio::task::spawn_blocking(move || bcrypt::verify(plain, &hash)).await?;
    Ok(result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Stored password hash is unreadable");
        false
    }))
}

/// Token from the access cookie, else from a bearer header.
pub fn token_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(cookie_name) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Load the account behind a token and confirm it may still sign in.
pub fn resolve_account(state: &AppState, id: Uuid, role: AccountRole) -> Result<AuthUser, ApiError> {
    if role == AccountRole::Student {
        return match state.students.find_by_id(id)? {
            Some(student) => Ok(AuthUser {
                id: student.id,
                role: AccountRole::Student,
            }),
            None => Err(ApiError::Unauthorized("Invalid access token".to_string())),
        };
    }

    let employee = state
        .employees
        .find_by_id(id)?
        .ok_or_else(|| ApiError::Unauthorized("Invalid access token".to_string()))?;
    if employee.status == EmployeeStatus::Inactive {
        return Err(ApiError::Forbidden("Account is inactive".to_string()));
    }
    // The stored role wins over the one in the token.
    Ok(AuthUser {
        id: employee.id,
        role: employee.role.into(),
    })
}

/// Middleware that validates the access token and inserts [`AuthUser`].
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let token = match token_from_headers(req.headers(), ACCESS_COOKIE) {
        Some(token) => token,
        None => return ApiError::Unauthorized("Unauthorized request".to_string()).into_response(),
    };

    let user = match state
        .tokens
        .verify(&token, TokenKind::Access)
        .and_then(|claims| resolve_account(&state, claims.sub, claims.role))
    {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    req.extensions_mut().insert(user);
    next.run(req).await
}

/// Middleware allowing any employee. Must run after [`require_auth`].
pub async fn require_staff(req: Request, next: Next) -> Response {
    let role = req.extensions().get::<AuthUser>().map(|u| u.role);
    match role {
        Some(role) if role.is_staff() => next.run(req).await,
        Some(_) => ApiError::Forbidden("Staff access required".to_string()).into_response(),
        None => ApiError::Unauthorized("Unauthorized request".to_string()).into_response(),
    }
}

/// Middleware allowing administrators only. Must run after [`require_auth`].
pub async fn require_admin(req: Request, next: Next) -> Response {
    let role = req.extensions().get::<AuthUser>().map(|u| u.role);
    match role {
        Some(role) if role.is_admin() => next.run(req).await,
        Some(_) => ApiError::Forbidden("Admin access required".to_string()).into_response(),
        None => ApiError::Unauthorized("Unauthorized request".to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn service() -> TokenService {
        let config = AuthConfig {
            access_token_secret: "access-secret".to_string(),
            refresh_token_secret: "refresh-secret".to_string(),
            bcrypt_cost: 4,
            ..AuthConfig::default()
        };
        TokenService::new(&config)
    }

    #[test]
    fn test_issue_and_verify() {
        let svc = service();
        let id = Uuid::new_v4();
        let pair = svc.issue(id, AccountRole::Educator).unwrap();

        let access = svc.verify(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(access.sub, id);
        assert_eq!(access.role, AccountRole::Educator);
        assert!(access.exp > access.iat);

        let refresh = svc.verify(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert_eq!(refresh.kind, TokenKind::Refresh);
    }

    #[test]
    fn test_refresh_token_not_accepted_as_access() {
        let svc = service();
        let pair = svc.issue(Uuid::new_v4(), AccountRole::Student).unwrap();
        assert!(svc.verify(&pair.refresh_token, TokenKind::Access).is_err());
        assert!(svc.verify("not-a-jwt", TokenKind::Access).is_err());
    }

    #[test]
    fn test_kind_checked_even_with_shared_secret() {
        let svc = TokenService::new(&AuthConfig::default());
        let pair = svc.issue(Uuid::new_v4(), AccountRole::Student).unwrap();
        let err = svc.verify(&pair.refresh_token, TokenKind::Access).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let config = AuthConfig {
            access_token_expiry_mins: -10,
            ..AuthConfig::default()
        };
        let svc = TokenService::new(&config);
        let pair = svc.issue(Uuid::new_v4(), AccountRole::Staff).unwrap();
        assert!(svc.verify(&pair.access_token, TokenKind::Access).is_err());
    }

    #[test]
    fn test_consecutive_pairs_differ() {
        let svc = service();
        let id = Uuid::new_v4();
        let a = svc.issue(id, AccountRole::Student).unwrap();
        let b = svc.issue(id, AccountRole::Student).unwrap();
        assert_ne!(a.refresh_token, b.refresh_token);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let svc = service();
        let pair = svc.issue(Uuid::new_v4(), AccountRole::Student).unwrap();
        let jar = svc.set_session_cookies(CookieJar::new(), &pair);

        let cookie = jar.get(ACCESS_COOKIE).unwrap();
        assert_eq!(cookie.value(), pair.access_token);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::None));
        assert_eq!(cookie.max_age(), Some(time::Duration::days(7)));
    }

    #[test]
    fn test_token_from_cookie_then_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer from-header"));
        assert_eq!(
            token_from_headers(&headers, ACCESS_COOKIE).as_deref(),
            Some("from-header")
        );

        headers.insert("cookie", HeaderValue::from_static("accessToken=from-cookie; other=1"));
        assert_eq!(
            token_from_headers(&headers, ACCESS_COOKIE).as_deref(),
            Some("from-cookie")
        );

        assert_eq!(token_from_headers(&HeaderMap::new(), ACCESS_COOKIE), None);
    }

    #[tokio::test]
    async fn test_password_hash_round_trip() {
        let hash = hash_password("correct horse", 4).await.unwrap();
        assert_ne!(hash, "correct horse");
        assert!(verify_password("correct horse", &hash).await.unwrap());
        assert!(!verify_password("wrong horse", &hash).await.unwrap());
        assert!(!verify_password("anything", "not-a-hash").await.unwrap());
    }

    #[test]
    fn test_self_or_staff() {
        let owner = Uuid::new_v4();
        let student = AuthUser { id: owner, role: AccountRole::Student };
        assert!(student.ensure_self_or_staff(owner).is_ok());
        assert!(student.ensure_self_or_staff(Uuid::new_v4()).is_err());

        let educator = AuthUser { id: Uuid::new_v4(), role: AccountRole::Educator };
        assert!(educator.ensure_self_or_staff(owner).is_ok());
        assert!(educator.ensure_student().is_err());
    }
}
