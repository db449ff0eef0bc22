use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    model::role::Role,
    models::{Claims, TokenType},
};
use jsonwebtoken::{
    DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error as JwtError,
};
use uuid::Uuid;

fn now() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as usize)
        .unwrap_or(0)
}

fn build_claims(
    employee_id: u64,
    email: String,
    role: Role,
    ttl: usize,
    token_type: TokenType,
) -> Claims {
    Claims {
        employee_id,
        sub: email,
        role,
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
    }
}

pub fn generate_access_token(
    employee_id: u64,
    email: String,
    role: Role,
    secret: &str,
    ttl: usize,
) -> Result<String, JwtError> {
    let claims = build_claims(employee_id, email, role, ttl, TokenType::Access);

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Refresh tokens are returned with their claims so the `jti` can be persisted.
pub fn generate_refresh_token(
    employee_id: u64,
    email: String,
    role: Role,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), JwtError> {
    let claims = build_claims(employee_id, email, role, ttl, TokenType::Refresh);

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok((token, claims))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_carries_identity() {
        let token =
            generate_access_token(42, "a@b.c".into(), Role::Chef, "secret", 60).unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.employee_id, 42);
        assert_eq!(claims.sub, "a@b.c");
        assert_eq!(claims.role, Role::Chef);
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn refresh_token_claims_match_the_encoded_token() {
        let (token, claims) =
            generate_refresh_token(7, "x@y.z".into(), Role::Employee, "secret", 60).unwrap();
        let decoded = verify_token(&token, "secret").unwrap();
        assert_eq!(decoded.jti, claims.jti);
        assert_eq!(decoded.token_type, TokenType::Refresh);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_access_token(1, "a@b.c".into(), Role::Admin, "one", 60).unwrap();
        assert!(verify_token(&token, "two").is_err());
    }
}
