//! HMAC bearer-token authentication for the HTTP front door.
//!
//! Token format: `<client_id>:<base64 HMAC-SHA256(client_id, secret)>`.
//! Client secrets are loaded from `CORTEXD_API_KEYS`, a comma-separated
//! `client_id:base64_secret` list, so new clients can be provisioned
//! without a code change.

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::env;

use super::types::AuthenticatedClient;

type HmacSha256 = Hmac<Sha256>;

/// Known client secrets, keyed by client id.
#[derive(Clone, Default)]
pub struct ApiKeys {
    secrets: HashMap<String, Vec<u8>>,
}

impl ApiKeys {
    /// Parse `CORTEXD_API_KEYS` (`id:base64secret,id:base64secret,...`).
    #[must_use]
    pub fn from_env() -> Self {
        let mut secrets = HashMap::new();
        if let Ok(raw) = env::var("CORTEXD_API_KEYS") {
            for entry in raw.split(',') {
                let entry = entry.trim();
                if entry.is_empty() {
                    continue;
                }
                if let Some((id, secret)) = entry.split_once(':') {
                    if let Ok(decoded) = BASE64.decode(secret) {
                        secrets.insert(id.to_string(), decoded);
                    }
                }
            }
        }
        Self { secrets }
    }

    /// Validate a bearer token and return the authenticated client id.
    #[must_use]
    pub fn validate(&self, token: &str) -> Option<AuthenticatedClient> {
        let (client_id, sig_b64) = token.split_once(':')?;
        let provided_sig = BASE64.decode(sig_b64).ok()?;
        let secret = self.secrets.get(client_id)?;

        let mut mac = HmacSha256::new_from_slice(secret).ok()?;
        mac.update(client_id.as_bytes());
        mac.verify_slice(&provided_sig).ok()?;

        Some(AuthenticatedClient {
            client_id: client_id.to_string(),
        })
    }
}

/// Extract the bearer token from the `Authorization` header.
#[must_use]
pub fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Auth middleware for protected endpoints.
///
/// # Errors
/// Returns `StatusCode::UNAUTHORIZED` if no token is present or it fails
/// to validate against a known client secret.
pub async fn require_auth(req: Request, next: Next) -> Result<Response, StatusCode> {
    let keys = ApiKeys::from_env();
    let token = extract_bearer_token(&req).ok_or(StatusCode::UNAUTHORIZED)?;
    let client = keys.validate(token).ok_or(StatusCode::UNAUTHORIZED)?;

    let mut req = req;
    req.extensions_mut().insert(client);
    Ok(next.run(req).await)
}

/// Generate a signed token for a client id (provisioning utility).
#[must_use]
pub fn generate_token(client_id: &str, secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key size");
    mac.update(client_id.as_bytes());
    let sig = mac.finalize().into_bytes();
    format!("{client_id}:{}", BASE64.encode(sig))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys_with(client_id: &str, secret: &[u8]) -> ApiKeys {
        let mut secrets = HashMap::new();
        secrets.insert(client_id.to_string(), secret.to_vec());
        ApiKeys { secrets }
    }

    #[test]
    fn token_generation_and_validation_round_trip() {
        let secret = b"test_secret_key_32_bytes_long!!!";
        let token = generate_token("web", secret);
        let keys = keys_with("web", secret);
        let client = keys.validate(&token);
        assert_eq!(client.unwrap().client_id, "web");
    }

    #[test]
    fn invalid_signature_is_rejected() {
        let keys = keys_with("web", b"real_secret");
        assert!(keys.validate("web:not_a_real_signature").is_none());
    }

    #[test]
    fn unknown_client_id_is_rejected() {
        let keys = keys_with("web", b"real_secret");
        let token = generate_token("web", b"real_secret");
        let swapped = token.replacen("web", "other", 1);
        assert!(keys.validate(&swapped).is_none());
    }
}
