use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ApiCredential;
use crate::error::{Error, Result};
use crate::serde_utils::{self, timestamp_millis};

pub const TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureLinkClaims {
    pub video_id: String,
    /// Playback deadline, milliseconds since the Unix epoch.
    #[serde(with = "timestamp_millis")]
    pub expiry: SystemTime,
    /// Issued at, seconds since the Unix epoch.
    pub iat: u64,
    /// Token lifetime bound, seconds since the Unix epoch.
    pub exp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    pub video_id: String,
    pub issued_at: SystemTime,
    pub expiry: SystemTime,
    token: String,
}

impl SignedToken {
    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn into_string(self) -> String {
        self.token
    }
}

impl fmt::Display for SignedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

#[derive(Clone, Debug)]
pub struct TokenSigner {
    credential: Arc<ApiCredential>,
}

impl TokenSigner {
    pub fn new(credential: Arc<ApiCredential>) -> Self {
        Self { credential }
    }

    pub fn sign(&self, video_id: &str, duration_minutes: u32) -> Result<SignedToken> {
        self.sign_at(video_id, duration_minutes, SystemTime::now())
    }

    /// Sign a token as if issued at `now`.
    pub fn sign_at(&self, video_id: &str, duration_minutes: u32, now: SystemTime) -> Result<SignedToken> {
        if duration_minutes == 0 {
            return Err(Error::Configuration(
                "token lifetime must be at least one minute".to_string(),
            ));
        }
        let secret = self.credential.api_key();
        if secret.is_empty() {
            return Err(Error::Configuration("signing secret is empty".to_string()));
        }

        let lifetime = Duration::from_secs(u64::from(duration_minutes) * 60);
        let expiry = now + lifetime;
        let iat = serde_utils::to_secs(now);
        let claims = SecureLinkClaims {
            video_id: video_id.to_string(),
            expiry,
            iat,
            exp: iat + lifetime.as_secs(),
        };

        let token = encode(
            &Header::new(TOKEN_ALGORITHM),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| Error::Configuration(format!("failed to sign token: {e}")))?;

        debug!(video_id, duration_minutes, "Signed playback token");
        Ok(SignedToken {
            video_id: claims.video_id,
            issued_at: now,
            expiry,
            token,
        })
    }

    pub fn verify(&self, token: &str) -> Result<SecureLinkClaims> {
        verify_token(token, self.credential.api_key())
    }
}

/// Check a token's signature under `secret` and reject it once `exp` has
/// passed.
pub fn verify_token(token: &str, secret: &str) -> Result<SecureLinkClaims> {
    let mut validation = Validation::new(TOKEN_ALGORITHM);
    validation.leeway = 0;
    decode::<SecureLinkClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| Error::Configuration(format!("token rejected: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn signer(key: &str) -> TokenSigner {
        TokenSigner::new(Arc::new(ApiCredential::new(key).unwrap()))
    }

    #[test]
    fn test_expiry_arithmetic() {
        let now = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        let token = signer("key").sign_at("vid", 5, now).unwrap();

        assert_eq!(
            serde_utils::to_millis(token.expiry),
            1_700_000_000_123 + 5 * 60_000
        );
        assert_eq!(token.issued_at, now);
    }

    #[test]
    fn test_token_has_three_parts() {
        let token = signer("key").sign("vid", 1).unwrap();
        assert_eq!(token.as_str().split('.').count(), 3);
        let header = jsonwebtoken::decode_header(token.as_str()).unwrap();
        assert_eq!(header.alg, TOKEN_ALGORITHM);
    }

    #[test]
    fn test_claims_round_trip_through_verify() {
        let signer = signer("key");
        let token = signer.sign("vid", 10).unwrap();
        let claims = signer.verify(token.as_str()).unwrap();

        assert_eq!(claims.video_id, "vid");
        assert_eq!(
            serde_utils::to_millis(claims.expiry),
            serde_utils::to_millis(token.issued_at) + 10 * 60_000
        );
        assert_eq!(claims.exp, claims.iat + 600);
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let token = signer("key").sign("vid", 10).unwrap();
        assert!(signer("other-key").verify(token.as_str()).is_err());
    }

    #[test]
    fn test_expired_token_fails_verification() {
        let issued = SystemTime::now() - Duration::from_secs(3600);
        let signer = signer("key");
        let token = signer.sign_at("vid", 1, issued).unwrap();
        assert!(signer.verify(token.as_str()).is_err());
    }

    #[test]
    fn test_zero_duration_is_configuration_error() {
        assert!(matches!(
            signer("key").sign("vid", 0),
            Err(Error::Configuration(_))
        ));
    }
}
