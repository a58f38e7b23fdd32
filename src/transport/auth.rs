//! Identity adapter
//!
//! Turns the signed token presented by a connection into the
//! `(participant id, role)` pair the rest of the crate trusts. Tokens are
//! HS256 JWTs signed with the configured server secret.

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use super::message::Claims;
use crate::model::Role;
use crate::utils::{DispatchError, Result};

#[derive(Clone)]
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenAuthority {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// Sign a token for `participant_id` valid for `ttl`.
    pub fn issue(&self, participant_id: &str, role: Role, ttl: chrono::Duration) -> Result<String> {
        let claims = Claims {
            sub: participant_id.to_string(),
            role,
            exp: (Utc::now() + ttl).timestamp().max(0) as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| DispatchError::invalid_input(format!("cannot sign token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| DispatchError::invalid_input(format!("authentication failed: {e}")))?;
        if data.claims.sub.trim().is_empty() {
            return Err(DispatchError::invalid_input("authentication failed: empty subject"));
        }
        Ok(data.claims)
    }
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority").finish_non_exhaustive()
    }
}
