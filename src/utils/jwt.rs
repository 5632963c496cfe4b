// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError};

/// Platform roles carried in the `role` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

/// Roles allowed to manage the question bank.
pub const STAFF: &[Role] = &[Role::Admin, Role::Instructor];

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    pub role: Role,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    /// Numeric user id from the `sub` claim.
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Session utilisateur non trouvée".to_string()))
    }
}

/// Signs a token for `user_id`.
///
/// Tokens are normally minted by the identity provider sharing `JWT_SECRET`;
/// this is the same encoding, used by tooling and tests.
pub fn sign_jwt(
    user_id: i64,
    role: Role,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
///
/// Returns the `Claims` if valid, otherwise returns an `AppError`.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Non autorisé".to_string()))?;

    Ok(token_data.claims)
}

/// Axum Middleware: Authentication.
///
/// Intercepts requests, validates the 'Authorization: Bearer <token>' header.
/// If valid, injects `Claims` into the request extensions for handlers to use.
/// If invalid, returns 401 Unauthorized.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthError("Non autorisé".to_string()))?;

    let claims = verify_jwt(token, &config.jwt_secret)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Checks the injected `Claims` against a set of allowed roles.
fn ensure_role(req: &Request<Body>, allowed: &[Role]) -> Result<(), AppError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::AuthError("Non autorisé".to_string()))?;

    if !allowed.contains(&claims.role) {
        return Err(AppError::Forbidden("Accès refusé".to_string()));
    }
    Ok(())
}

/// Axum Middleware: student-only routes. Must run after `auth_middleware`.
pub async fn student_middleware(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    ensure_role(&req, &[Role::Student])?;
    Ok(next.run(req).await)
}

/// Axum Middleware: question bank management (admins and instructors).
/// Must run after `auth_middleware`.
pub async fn staff_middleware(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    ensure_role(&req, STAFF)?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit_test_secret";

    #[test]
    fn sign_then_verify_keeps_claims() {
        let token = sign_jwt(42, Role::Student, SECRET, 600).unwrap();
        let claims = verify_jwt(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.role, Role::Student);
        assert_eq!(claims.user_id().unwrap(), 42);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = sign_jwt(1, Role::Admin, SECRET, 600).unwrap();
        assert!(matches!(verify_jwt(&token, "other"), Err(AppError::AuthError(_))));
    }

    #[test]
    fn role_claim_uses_upper_case_names() {
        let json = serde_json::to_string(&Role::Instructor).unwrap();
        assert_eq!(json, "\"INSTRUCTOR\"");
    }

    #[test]
    fn ensure_role_checks_membership() {
        let mut req = Request::new(Body::empty());
        assert!(matches!(ensure_role(&req, STAFF), Err(AppError::AuthError(_))));

        req.extensions_mut().insert(Claims {
            sub: "7".into(),
            role: Role::Student,
            exp: usize::MAX,
        });
        assert!(matches!(ensure_role(&req, STAFF), Err(AppError::Forbidden(_))));
        assert!(ensure_role(&req, &[Role::Student]).is_ok());
    }

    #[test]
    fn non_numeric_subject_is_an_auth_error() {
        let claims = Claims { sub: "abc".into(), role: Role::Student, exp: 0 };
        assert!(matches!(claims.user_id(), Err(AppError::AuthError(_))));
    }
}
