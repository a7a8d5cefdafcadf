use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64,
    pub iat: i64,
    pub kind: TokenKind,
    /// Present on refresh tokens only; the same value is stored on
    /// `User.refresh_token` so a second use of an already-rotated refresh
    /// credential is rejected (spec.md §4.8, §8 "refresh is single-use").
    pub jti: Option<String>,
}

pub fn create_access_token(user_id: Uuid, secret: &str, lifetime_minutes: i64) -> Result<String> {
    encode_claims(user_id, secret, Duration::minutes(lifetime_minutes), TokenKind::Access, None)
}

/// Returns `(token, jti)` — the caller persists `jti` on the User row.
pub fn create_refresh_token(user_id: Uuid, secret: &str, lifetime_days: i64) -> Result<(String, String)> {
    let jti = generate_token();
    let token = encode_claims(user_id, secret, Duration::days(lifetime_days), TokenKind::Refresh, Some(jti.clone()))?;
    Ok((token, jti))
}

fn encode_claims(
    user_id: Uuid,
    secret: &str,
    lifetime: Duration,
    kind: TokenKind,
    jti: Option<String>,
) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        exp: (now + lifetime).timestamp(),
        iat: now.timestamp(),
        kind,
        jti,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| Error::Transient(format!("failed to sign token: {e}")))
}

pub fn verify_token(token: &str, secret: &str, expected_kind: TokenKind) -> Result<Claims> {
    let claims = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|_| Error::Unauthenticated)?;

    if claims.kind != expected_kind {
        return Err(Error::Unauthenticated);
    }

    Ok(claims)
}

pub fn hash_password(password: &str) -> Result<String> {
    use argon2::{
        password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
        Argon2,
    };

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Transient(format!("failed to hash password: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    use argon2::{
        password_hash::{PasswordHash, PasswordVerifier},
        Argon2,
    };

    let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::Transient(format!("invalid stored hash: {e}")))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed_hash).is_ok())
}

/// Random token used for confirmation/reset tokens and refresh `jti`s.
pub fn generate_token() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| {
            let idx = rng.gen_range(0..62);
            match idx {
                0..=9 => (b'0' + idx) as char,
                10..=35 => (b'a' + idx - 10) as char,
                _ => (b'A' + idx - 36) as char,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_roundtrip() {
        let user_id = Uuid::now_v7();
        let secret = "test_secret";
        let token = create_access_token(user_id, secret, 15).unwrap();
        let claims = verify_token(&token, secret, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn test_refresh_token_carries_jti() {
        let user_id = Uuid::now_v7();
        let secret = "test_secret";
        let (token, jti) = create_refresh_token(user_id, secret, 30).unwrap();
        let claims = verify_token(&token, secret, TokenKind::Refresh).unwrap();
        assert_eq!(claims.jti.as_deref(), Some(jti.as_str()));
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let user_id = Uuid::now_v7();
        let secret = "test_secret";
        let token = create_access_token(user_id, secret, 15).unwrap();
        assert!(verify_token(&token, secret, TokenKind::Refresh).is_err());
    }

    #[test]
    fn test_rotated_key_rejected() {
        let user_id = Uuid::now_v7();
        let token = create_access_token(user_id, "secret-a", 15).unwrap();
        assert!(verify_token(&token, "secret-b", TokenKind::Access).is_err());
    }

    #[test]
    fn test_password_roundtrip() {
        let password = "correct horse battery staple";
        let hash = hash_password(password).unwrap();
        assert!(verify_password(password, &hash).unwrap());
        assert!(!verify_password("wrong password", &hash).unwrap());
    }
}
