use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::{AuthContext, CredentialResolver};
use crate::error::GatewayError;

use super::AppState;

/// Resolves the inbound credential into an [`AuthContext`] using the
/// extraction order and TTL cache from [`CredentialResolver`].
pub struct Authed(pub AuthContext);

impl FromRequestParts<AppState> for Authed {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credential = CredentialResolver::extract_credential(&parts.headers)
            .ok_or_else(|| GatewayError::Unauthorized("missing api key".into()))?;
        let ctx = state.auth.resolve(&credential).await?;
        Ok(Authed(ctx))
    }
}
