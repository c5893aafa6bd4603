//! Session-token verification for gateway admission.
//!
//! Tokens are minted by the identity service after login; the gateway only
//! verifies them. A connection is admitted iff its token validates, so the
//! signaling core never sees an unverified identity.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a gateway session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Verified user name — the identity bound to the connection.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Verify a session token and return the identity it vouches for.
pub fn verify_session_token(secret: &str, token: &str) -> Result<String, &'static str> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| "Invalid or expired session token")?;

    if data.claims.sub.is_empty() {
        return Err("Token missing subject");
    }
    Ok(data.claims.sub)
}
