use axum::extract::FromRequestParts;
use http::{request::Parts, StatusCode};

/// Bearer credential forwarded by the client. The check here is presence
/// only; whether it matches a call record is decided per operation.
pub struct Credential(pub String);

impl<S> FromRequestParts<S> for Credential
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        let token = raw
            .strip_prefix("Bearer ")
            .or_else(|| raw.strip_prefix("bearer "))
            .unwrap_or(raw)
            .trim();

        if token.is_empty() {
            return Err(StatusCode::FORBIDDEN);
        }
        Ok(Credential(token.to_string()))
    }
}
