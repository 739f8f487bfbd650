// Session cookie extractor
// Decision: Only the cookie is consulted; browsers never send the token as a header here

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use ubik_core::SESSION_COOKIE;

use crate::error::GatewayError;

/// Console session token read from the `ubik_token` cookie.
/// Rejects with 401 when the cookie is missing or empty.
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        jar.get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
            .map(SessionToken)
            .ok_or(GatewayError::Unauthorized)
    }
}
