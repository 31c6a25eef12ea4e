use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use murmur_types::api::Claims;

/// Decode and validate a bearer token issued by the auth collaborator.
pub fn verify_token(secret: &str, token: &str) -> jsonwebtoken::errors::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// Mint a token for `user_id`. The real issuer is the auth collaborator;
/// this exists for local development and tests.
pub fn issue_token(
    secret: &str,
    user_id: &str,
    ttl: chrono::Duration,
) -> jsonwebtoken::errors::Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
