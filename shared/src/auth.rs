use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use aws_sdk_dynamodb::Client as DynamoClient;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lambda_http::{http::StatusCode, Body, Error, Request, Response};
use serde::{Deserialize, Serialize};
use std::env;

use crate::error::ApiError;
use crate::types::{LoginRequest, RegisterRequest};
use crate::users;

/// Resolved request identity attached after token verification
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
}

/// Token claims. Tokens expire 30 days after issuance.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

const TOKEN_LIFETIME_DAYS: i64 = 30;

pub fn hash_password(plain: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::internal(format!("Password hashing failed: {}", e)))
}

pub fn verify_password(plain: &str, hash: &str) -> Result<bool, ApiError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| ApiError::internal(format!("Stored hash is malformed: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

pub fn issue_token(user_id: &str, secret: &str) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::days(TOKEN_LIFETIME_DAYS)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::internal(format!("Token signing failed: {}", e)))
}

pub fn verify_token(token: &str, secret: &str) -> Result<String, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims.sub)
    .map_err(|_| ApiError::unauthenticated("Not authorized, token failed"))
}

fn signing_secret() -> Result<String, ApiError> {
    env::var("SECRET_KEY").map_err(|_| ApiError::internal("SECRET_KEY must be set"))
}

fn body_str(body: &Body) -> &str {
    match body {
        Body::Text(text) => text,
        Body::Binary(bytes) => std::str::from_utf8(bytes).unwrap_or(""),
        Body::Empty => "",
    }
}

/// Resolve the Bearer token on a request to a full user identity
pub async fn authenticate(
    event: &Request,
    client: &DynamoClient,
    table_name: &str,
) -> Result<AuthUser, ApiError> {
    let token = event
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthenticated("Not authorized, no token"))?;

    let user_id = verify_token(token, &signing_secret()?)?;

    let user = users::find_user(client, table_name, &user_id)
        .await?
        .ok_or_else(|| ApiError::unauthenticated("Not authorized, token failed"))?;

    Ok(AuthUser {
        id: user.user_id,
        name: user.name,
        email: user.email,
        is_admin: user.is_admin,
    })
}

/// Handle user registration
pub async fn register(
    client: &DynamoClient,
    table_name: &str,
    body: &Body,
) -> Result<Response<Body>, Error> {
    tracing::info!("Register request received");

    let req: RegisterRequest = match serde_json::from_str(body_str(body)) {
        Ok(req) => req,
        Err(e) => return ApiError::from(e).response(),
    };

    let (Some(name), Some(email), Some(phone_number), Some(password)) =
        (req.name, req.email, req.phone_number, req.password)
    else {
        return ApiError::validation("please provide name, email, password and phone_number")
            .response();
    };

    let password_hash = match hash_password(&password) {
        Ok(hash) => hash,
        Err(e) => return e.response(),
    };

    match users::create_user(client, table_name, &name, &email, &phone_number, &password_hash)
        .await
    {
        Ok(user) => Ok(Response::builder()
            .status(StatusCode::CREATED)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(
                serde_json::json!({"success": true, "data": user})
                    .to_string()
                    .into(),
            )
            .map_err(Box::new)?),
        Err(e) => e.response(),
    }
}

/// Handle user login, returning a signed token on success
pub async fn login(
    client: &DynamoClient,
    table_name: &str,
    body: &Body,
) -> Result<Response<Body>, Error> {
    tracing::info!("Login request received");

    let req: LoginRequest = match serde_json::from_str(body_str(body)) {
        Ok(req) => req,
        Err(e) => return ApiError::from(e).response(),
    };

    let (Some(email), Some(password)) = (req.email, req.password) else {
        return ApiError::validation("please provide email and password").response();
    };

    let user = match users::find_user_by_email(client, table_name, &email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return ApiError::not_found("User with that email is not registered").response()
        }
        Err(e) => return e.response(),
    };

    match verify_password(&password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return ApiError::unauthenticated("invalid password").response(),
        Err(e) => return e.response(),
    }

    let secret = match signing_secret() {
        Ok(secret) => secret,
        Err(e) => return e.response(),
    };
    let token = match issue_token(&user.user_id, &secret) {
        Ok(token) => token,
        Err(e) => return e.response(),
    };

    tracing::info!("User {} logged in", user.user_id);

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(
            serde_json::json!({"success": true, "data": token})
                .to_string()
                .into(),
        )
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let token = issue_token("user-123", "test-secret").unwrap();
        let sub = verify_token(&token, "test-secret").unwrap();
        assert_eq!(sub, "user-123");
    }

    #[test]
    fn token_rejects_wrong_secret() {
        let token = issue_token("user-123", "test-secret").unwrap();
        assert!(verify_token(&token, "other-secret").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = Utc::now();
        let claims = Claims {
            sub: "user-123".to_string(),
            iat: (now - Duration::days(31)).timestamp(),
            exp: (now - Duration::days(1)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(verify_token(&token, "test-secret").is_err());
    }

    #[test]
    fn password_hash_and_verify() {
        let hash = hash_password("hunter2hunter2").unwrap();
        assert_ne!(hash, "hunter2hunter2");
        assert!(verify_password("hunter2hunter2", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }
}
