//! Token Signer (C2).
//!
//! Mints and verifies HMAC-signed access and refresh tokens bound to a
//! session. The claim set on an access token is authoritative for the
//! lifetime of its TTL — the gate does not re-resolve roles per request.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;

/// Accept up to 30s of clock skew on the not-before check; none on expiry
/// (spec §4.2 "Clock policy").
const NBF_LEEWAY_SECONDS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: user id.
    pub sub: Uuid,
    /// Session this token is bound to.
    pub sid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub token_type: TokenType,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyFailure {
    #[error("token expired")]
    Expired,
    #[error("bad signature")]
    BadSignature,
    #[error("malformed token")]
    Malformed,
    #[error("wrong token type")]
    WrongType,
}

impl From<VerifyFailure> for crate::error::Error {
    fn from(_: VerifyFailure) -> Self {
        // All verification failures collapse to the generic Authentication
        // category above this layer — never leak which reason to callers
        // on authentication paths (spec §7).
        crate::error::Error::Authentication
    }
}

pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenSigner {
    pub fn new(config: &Config) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.signing_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.signing_secret.as_bytes()),
            access_ttl_secs: config.access_ttl.as_secs() as i64,
            refresh_ttl_secs: config.refresh_ttl.as_secs() as i64,
        }
    }

    pub fn mint_access(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        tenant_id: Option<Uuid>,
        roles: Vec<String>,
        permissions: Vec<String>,
    ) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            sid: session_id,
            tenant_id,
            roles,
            permissions,
            iat: now,
            nbf: now,
            exp: now + self.access_ttl_secs,
            token_type: TokenType::Access,
        };
        self.encode(&claims)
    }

    pub fn mint_refresh(&self, user_id: Uuid, session_id: Uuid) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            sid: session_id,
            tenant_id: None,
            roles: Vec::new(),
            permissions: Vec::new(),
            iat: now,
            nbf: now,
            exp: now + self.refresh_ttl_secs,
            token_type: TokenType::Refresh,
        };
        self.encode(&claims)
    }

    fn encode(&self, claims: &Claims) -> String {
        // HMAC signing never fails for a well-formed key, which boot-time
        // validation of SIGNING_SECRET already guarantees.
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .expect("token encoding failed despite valid signing key")
    }

    /// Parses and verifies `token`, requiring its `token_type` to equal
    /// `expected`. Expired tokens are never silently accepted; wrong-type
    /// tokens are rejected even if otherwise valid.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, VerifyFailure> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry and not-before are checked by hand below so the two can
        // have different clock-skew tolerances; the library's own exp/nbf
        // checks are disabled to avoid checking twice with conflicting
        // leeway.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::InvalidSignature => VerifyFailure::BadSignature,
                _ => VerifyFailure::Malformed,
            }
        })?;

        let claims = data.claims;
        let now = Utc::now().timestamp();

        if now >= claims.exp {
            return Err(VerifyFailure::Expired);
        }
        if now < claims.nbf - NBF_LEEWAY_SECONDS {
            return Err(VerifyFailure::Malformed);
        }
        if claims.token_type != expected {
            return Err(VerifyFailure::WrongType);
        }

        Ok(claims)
    }

    /// Extracts claims from a token whose signature is valid even if the
    /// token itself has expired — used by logout, which must be able to
    /// revoke a session from an already-expired access token (spec §4.6
    /// "Logout" step 1).
    pub fn extract_ignoring_expiry(&self, token: &str) -> Result<Claims, VerifyFailure> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear();

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|d| d.claims)
            .map_err(|e| {
                use jsonwebtoken::errors::ErrorKind;
                match e.kind() {
                    ErrorKind::InvalidSignature => VerifyFailure::BadSignature,
                    _ => VerifyFailure::Malformed,
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new(&crate::config_test_support::test_config())
    }

    #[test]
    fn mint_then_verify_round_trips_claims() {
        let signer = signer();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();

        let token = signer.mint_access(user_id, session_id, None, vec!["USER".into()], vec!["read:profile".into()]);
        let claims = signer.verify(&token, TokenType::Access).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.sid, session_id);
        assert_eq!(claims.roles, vec!["USER".to_string()]);
    }

    #[test]
    fn refresh_token_rejected_as_access() {
        let signer = signer();
        let token = signer.mint_refresh(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(signer.verify(&token, TokenType::Access).unwrap_err(), VerifyFailure::WrongType);
    }

    #[test]
    fn tampered_signature_rejected() {
        let signer = signer();
        let mut token = signer.mint_access(Uuid::new_v4(), Uuid::new_v4(), None, vec![], vec![]);
        token.push('x');
        assert!(signer.verify(&token, TokenType::Access).is_err());
    }

    #[test]
    fn expired_token_rejected() {
        let mut config = crate::config_test_support::test_config();
        config.access_ttl = std::time::Duration::from_secs(0);
        let signer = TokenSigner::new(&config);
        let token = signer.mint_access(Uuid::new_v4(), Uuid::new_v4(), None, vec![], vec![]);

        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert_eq!(signer.verify(&token, TokenType::Access).unwrap_err(), VerifyFailure::Expired);
    }
}
