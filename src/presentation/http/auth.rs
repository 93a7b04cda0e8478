use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::application::session::SessionContext;
use crate::presentation::http::error::ApiError;

/// Optional Google Identity credential. Taken from `Authorization: Bearer`,
/// falling back to the `access_token` cookie.
pub struct Bearer(pub Option<String>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Bearer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Bearer(bearer_from_headers(&parts.headers)))
    }
}

pub fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(t) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
    {
        return Some(t.trim().to_string());
    }
    headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookie_hdr| get_cookie(cookie_hdr, "access_token"))
}

fn get_cookie(cookie_header: &str, name: &str) -> Option<String> {
    for part in cookie_header.split(';') {
        let kv = part.trim();
        if let Some((k, v)) = kv.split_once('=') {
            if k.trim() == name {
                return Some(v.trim().to_string());
            }
        }
    }
    None
}

/// First non-blank candidate wins; otherwise the configured default owner.
pub fn resolve_owner<'a>(
    candidates: impl IntoIterator<Item = Option<&'a str>>,
    default_owner: &'a str,
) -> &'a str {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(default_owner)
}

pub fn session_for(owner: &str, bearer: Bearer) -> Result<SessionContext, ApiError> {
    let session = SessionContext::new(owner)?;
    Ok(match bearer.0 {
        Some(token) => session.with_access_token(token),
        None => session,
    })
}
