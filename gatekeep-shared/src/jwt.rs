use std::path::Path;

use anyhow::Context;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::types::auth::{Claims, UserRole};

/// Signs and verifies bearer tokens with an RSA key pair loaded once at startup.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl TokenSigner {
    pub fn from_rsa_pem(private_pem: &[u8], public_pem: &[u8], ttl_secs: i64) -> anyhow::Result<Self> {
        let encoding = EncodingKey::from_rsa_pem(private_pem).context("invalid RSA private key")?;
        let decoding = DecodingKey::from_rsa_pem(public_pem).context("invalid RSA public key")?;
        Ok(Self {
            encoding,
            decoding,
            ttl_secs,
        })
    }

    pub fn load(private_path: impl AsRef<Path>, public_path: impl AsRef<Path>, ttl_secs: i64) -> anyhow::Result<Self> {
        let private_path = private_path.as_ref();
        let public_path = public_path.as_ref();
        let private_pem = std::fs::read(private_path)
            .with_context(|| format!("reading {}", private_path.display()))?;
        let public_pem = std::fs::read(public_path)
            .with_context(|| format!("reading {}", public_path.display()))?;

        let signer = Self::from_rsa_pem(&private_pem, &public_pem, ttl_secs)?;
        tracing::info!(key = %private_path.display(), ttl_secs, "token signer loaded");
        Ok(signer)
    }

    /// Lifetime of issued bearers, in seconds.
    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    pub fn sign(&self, user_id: Uuid, device_id: Uuid, role: UserRole, session_id: Uuid) -> AppResult<String> {
        let claims = Claims::new(user_id, device_id, role, session_id, self.ttl_secs);
        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT encoding failed: {e}")))
    }

    /// Any failure (foreign algorithm, bad signature, expiry, garbage) is the
    /// same Unauthorized.
    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let header = decode_header(token).map_err(|_| AppError::unauthorized())?;
        if !matches!(header.alg, Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512) {
            return Err(AppError::unauthorized());
        }

        let mut validation = Validation::new(header.alg);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::unauthorized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE_PEM: &[u8] = include_bytes!("../../testdata/jwt_private.pem");
    const PUBLIC_PEM: &[u8] = include_bytes!("../../testdata/jwt_public.pem");

    fn signer(ttl: i64) -> TokenSigner {
        TokenSigner::from_rsa_pem(PRIVATE_PEM, PUBLIC_PEM, ttl).unwrap()
    }

    #[test]
    fn roundtrip_token() {
        let s = signer(3600);
        let (user, device, session) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let token = s.sign(user, device, UserRole::Admin, session).unwrap();

        let claims = s.verify(&token).unwrap();
        assert_eq!(claims.user_id, user);
        assert_eq!(claims.device_id, device);
        assert_eq!(claims.session_id, session);
        assert_eq!(claims.role, UserRole::Admin);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn expired_token_rejected() {
        let s = signer(-30);
        let token = s.sign(Uuid::new_v4(), Uuid::new_v4(), UserRole::User, Uuid::new_v4()).unwrap();
        assert!(s.verify(&token).unwrap_err().is_unauthorized());
    }

    #[test]
    fn symmetric_algorithm_rejected() {
        let s = signer(3600);
        let claims = Claims::new(Uuid::new_v4(), Uuid::new_v4(), UserRole::Admin, Uuid::new_v4(), 3600);
        let forged = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(PUBLIC_PEM),
        )
        .unwrap();
        assert!(s.verify(&forged).unwrap_err().is_unauthorized());
    }

    #[test]
    fn tampered_and_garbage_tokens_rejected() {
        let s = signer(3600);
        let user = s.sign(Uuid::new_v4(), Uuid::new_v4(), UserRole::User, Uuid::new_v4()).unwrap();
        let admin = s.sign(Uuid::new_v4(), Uuid::new_v4(), UserRole::Admin, Uuid::new_v4()).unwrap();

        // admin payload under the user token's signature
        let user_sig = user.rsplit('.').next().unwrap();
        let admin_body = admin.rsplitn(2, '.').nth(1).unwrap();
        let spliced = format!("{admin_body}.{user_sig}");

        assert!(s.verify(&spliced).is_err());
        assert!(s.verify("not-a-token").is_err());
        assert!(s.verify("").is_err());
    }
}
