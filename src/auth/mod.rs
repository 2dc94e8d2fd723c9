/*!
 * # Authentication and Authorization Module
 *
 * Bearer-token authentication for the storefront API. Tokens are HS256 JWTs
 * carrying the user id and role list; admin-only routes additionally require
 * the `admin` role. Login and registration live outside this service, so the
 * module only issues tokens for tests and tooling and validates them on
 * incoming requests.
 */

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{errors::ServiceError, AppState};

pub const ADMIN_ROLE: &str = "admin";

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,        // Subject (user ID)
    pub roles: Vec<String>, // User's roles
    pub iat: i64,           // Issued at time
    pub exp: i64,           // Expiration time
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub roles: Vec<String>,
}

impl AuthUser {
    /// Check if the user has a specific role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Check if the user is an admin
    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }
}

/// Authentication service that handles token issuance and validation
#[derive(Clone)]
pub struct AuthService {
    jwt_secret: String,
    jwt_expiration: i64,
}

impl AuthService {
    pub fn new(jwt_secret: impl Into<String>, jwt_expiration: i64) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            jwt_expiration,
        }
    }

    /// Generate a signed token for a user
    pub fn issue_token(&self, user_id: Uuid, roles: Vec<String>) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            roles,
            iat: now,
            exp: now + self.jwt_expiration,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::InternalError(format!("Failed to sign token: {}", e)))
    }

    /// Validate a token and extract the calling identity
    pub fn validate_token(&self, token: &str) -> Result<AuthUser, ServiceError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                ServiceError::AuthError("Token expired".to_string())
            }
            _ => ServiceError::AuthError("Invalid token".to_string()),
        })?;

        let user_id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| ServiceError::AuthError("Invalid token subject".to_string()))?;

        Ok(AuthUser {
            user_id,
            roles: data.claims.roles,
        })
    }
}

/// Authentication middleware that extracts and validates bearer tokens.
/// The authenticated user lands in request extensions for handlers.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let user = authenticate(&state, request.headers())?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Like `auth_middleware` but also requires the `admin` role.
pub async fn admin_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let user = authenticate(&state, request.headers())?;
    if !user.is_admin() {
        return Err(ServiceError::Forbidden("Admin role required".to_string()));
    }
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, ServiceError> {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::AuthError("Missing authorization header".to_string()))?;

    let token = header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or_else(|| ServiceError::AuthError("Expected a bearer token".to_string()))?;

    state.services.auth.validate_token(token)
}
