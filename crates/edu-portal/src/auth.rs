//! Caller identity: access token → auth user → profile role.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::backend::{find_by_id, Database};
use crate::error::ApiError;
use crate::state::PortalState;
use crate::workflows::profiles::PROFILES_TABLE;

/// Cookie set by the sign-in page when the browser holds the session.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Student,
    Associate,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Associate => "associate",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Role::Student),
            "associate" => Some(Role::Associate),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

const ROLE_NAMES: &[&str] = &["student", "associate", "admin"];

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Role::parse(&raw).ok_or_else(|| de::Error::unknown_variant(&raw, ROLE_NAMES))
    }
}

/// Reads a stored `role` column the way session resolution does: null or
/// unrecognised values fall back to the student role.
pub fn stored_role<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Role, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(Role::parse).unwrap_or_default())
}

/// Authenticated principal for the current request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub email: Option<String>,
    pub role: Role,
    access_token: String,
}

impl Caller {
    pub fn new(
        user_id: impl Into<String>,
        email: Option<String>,
        role: Role,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email,
            role,
            access_token: access_token.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("admin access required"))
        }
    }

    /// Database handle carrying this caller's credentials.
    pub fn database(&self, state: &PortalState) -> Arc<dyn Database> {
        state.backend.database.for_caller(&self.access_token)
    }
}

/// Reads the bearer token, falling back to the session cookie.
pub fn access_token(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim_start().split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == ACCESS_TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Resolves a token to a caller. `Ok(None)` when the token is not a live
/// session. A missing profile row means the default student role.
pub async fn resolve_caller(
    state: &PortalState,
    access_token: &str,
) -> Result<Option<Caller>, ApiError> {
    let Some(user) = state.backend.auth.user_for_token(access_token).await? else {
        return Ok(None);
    };

    let profile = find_by_id(state.backend.database.as_ref(), PROFILES_TABLE, &user.id).await?;
    let role = profile
        .as_ref()
        .and_then(|row| row.get("role"))
        .and_then(Value::as_str)
        .and_then(Role::parse)
        .unwrap_or_default();

    Ok(Some(Caller::new(user.id, user.email, role, access_token)))
}

#[async_trait]
impl FromRequestParts<PortalState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &PortalState,
    ) -> Result<Self, Self::Rejection> {
        let token = access_token(parts).ok_or(ApiError::Unauthorized)?;
        resolve_caller(state, &token)
            .await?
            .ok_or(ApiError::Unauthorized)
    }
}

/// Like [`Caller`] but never rejects; used by pages that redirect instead.
#[derive(Debug, Clone)]
pub struct MaybeCaller(pub Option<Caller>);

#[async_trait]
impl FromRequestParts<PortalState> for MaybeCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &PortalState,
    ) -> Result<Self, Self::Rejection> {
        match access_token(parts) {
            Some(token) => Ok(MaybeCaller(resolve_caller(state, &token).await?)),
            None => Ok(MaybeCaller(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        let (parts, _) = builder.body(()).expect("request builds").into_parts();
        parts
    }

    #[test]
    fn bearer_token_wins_over_cookie() {
        let parts = parts(
            Request::get("/")
                .header(AUTHORIZATION, "Bearer header-token")
                .header(COOKIE, "access_token=cookie-token"),
        );
        assert_eq!(access_token(&parts).as_deref(), Some("header-token"));
    }

    #[test]
    fn cookie_token_is_found_among_others() {
        let parts = parts(
            Request::get("/").header(COOKIE, "theme=dark; access_token=cookie-token; lang=en"),
        );
        assert_eq!(access_token(&parts).as_deref(), Some("cookie-token"));
    }

    #[test]
    fn missing_or_empty_tokens_are_none() {
        assert!(access_token(&parts(Request::get("/"))).is_none());
        assert!(access_token(&parts(Request::get("/").header(AUTHORIZATION, "Bearer  "))).is_none());
        assert!(access_token(&parts(Request::get("/").header(COOKIE, "access_token="))).is_none());
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        for header in ["bearer lower-token", "BEARER lower-token", "Bearer   lower-token "] {
            let parts = parts(Request::get("/").header(AUTHORIZATION, header));
            assert_eq!(access_token(&parts).as_deref(), Some("lower-token"), "{header}");
        }
        let basic = parts(Request::get("/").header(AUTHORIZATION, "Basic dXNlcjpwdw=="));
        assert!(access_token(&basic).is_none());
    }

    #[test]
    fn role_columns_deserialize_like_session_resolution() {
        let role: Role = serde_json::from_value(serde_json::json!("Admin")).expect("role");
        assert_eq!(role, Role::Admin);
        assert!(serde_json::from_value::<Role>(serde_json::json!("owner")).is_err());
        assert_eq!(serde_json::to_value(Role::Admin).expect("json"), "admin");

        #[derive(Deserialize)]
        struct Stored {
            #[serde(default, deserialize_with = "stored_role")]
            role: Role,
        }
        for (raw, expected) in [
            (serde_json::json!({ "role": " ASSOCIATE " }), Role::Associate),
            (serde_json::json!({ "role": null }), Role::Student),
            (serde_json::json!({ "role": "owner" }), Role::Student),
            (serde_json::json!({}), Role::Student),
        ] {
            let stored: Stored = serde_json::from_value(raw).expect("row");
            assert_eq!(stored.role, expected);
        }
    }

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!(Role::parse("Admin"), Some(Role::Admin));
        assert_eq!(Role::parse(" associate "), Some(Role::Associate));
        assert_eq!(Role::parse("owner"), None);
        assert_eq!(Role::Student.label(), "student");
    }
}
