use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use crate::{dto::auth::Claims, error::AppError, state::AppState};

pub const AUTH_COOKIE: &str = "token";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Authenticated caller with the admin role. Rejects before the request body is read.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

/// Present for guests as `MaybeAuthUser(None)`; a malformed token is still rejected.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

pub fn ensure_role(user: &AuthUser, role: &str) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, "admin")
}

/// Bearer header first, then the auth cookie.
pub fn extract_token(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let auth_str = value
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;
        let token = auth_str
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization scheme".into()))?;
        return Ok(Some(token.trim().to_string()));
    }

    let token = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == AUTH_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string());
    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> Result<AuthUser, AppError> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

    let user_id = Uuid::parse_str(&decoded.claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;

    Ok(AuthUser {
        user_id,
        role: decoded.claims.role,
    })
}

/// `Set-Cookie` value carrying a freshly issued token.
pub fn session_cookie(token: &str, ttl_hours: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{AUTH_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        ttl_hours * 3600
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn cleared_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)?
            .ok_or_else(|| AppError::Unauthorized("Missing credentials".into()))?;
        decode_token(&state.config.jwt_secret, &token)
    }
}

pub fn admin_from_headers(secret: &str, headers: &HeaderMap) -> Result<AuthUser, AppError> {
    let token = extract_token(headers)?
        .ok_or_else(|| AppError::Unauthorized("Missing credentials".into()))?;
    let user = decode_token(secret, &token)?;
    ensure_admin(&user)?;
    Ok(user)
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        admin_from_headers(&state.config.jwt_secret, &parts.headers).map(Self)
    }
}

impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match extract_token(&parts.headers)? {
            Some(token) => decode_token(&state.config.jwt_secret, &token).map(|u| Self(Some(u))),
            None => Ok(Self(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("token=cookie"));
        assert_eq!(extract_token(&headers).unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn token_read_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; token=xyz; other=1"),
        );
        assert_eq!(extract_token(&headers).unwrap().as_deref(), Some("xyz"));
    }

    #[test]
    fn no_credentials_is_none_and_bad_scheme_is_error() {
        assert_eq!(extract_token(&HeaderMap::new()).unwrap(), None);
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_token(&headers).is_err());
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(matches!(
            decode_token("secret", "not-a-jwt"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn session_cookie_is_http_only_and_expires() {
        let cookie = session_cookie("abc", 2, false);
        assert!(cookie.starts_with("token=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=7200"));
        assert!(!cookie.contains("Secure"));

        let cleared = cleared_cookie(true);
        assert!(cleared.starts_with("token=;"));
        assert!(cleared.contains("Max-Age=0"));
        assert!(cleared.ends_with("; Secure"));
    }

    #[test]
    fn admin_extraction_requires_admin_role() {
        use crate::services::auth_service::issue_token;

        let bearer = |token: String| {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
            );
            headers
        };

        let id = Uuid::new_v4();
        let admin = bearer(issue_token("secret", 1, id, "admin").unwrap());
        assert_eq!(admin_from_headers("secret", &admin).unwrap().user_id, id);

        let shopper = bearer(issue_token("secret", 1, id, "user").unwrap());
        assert!(matches!(
            admin_from_headers("secret", &shopper),
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            admin_from_headers("secret", &HeaderMap::new()),
            Err(AppError::Unauthorized(_))
        ));
    }
}
