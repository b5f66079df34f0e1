use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    config::AppConfig,
    errors::AppError,
    models::{User, UserProfile},
    permissions::{self, Capability, PermissionMap, Role},
    repository::RepositoryState,
};

/// Claims
///
/// Session token payload. Only the user id travels in the token; role and permissions are
/// re-read from the store on every request so admin edits take effect immediately.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the `usuarios.id` of the agent, as a string.
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

// --- Credentials ---

pub fn hash_password(password: &str) -> Result<String, AppError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| {
        tracing::error!("password hashing failed: {}", e);
        AppError::Internal
    })
}

/// Hash prefixes written by the previous portal (werkzeug). They cannot be verified here;
/// affected accounts need an admin password reset.
const FOREIGN_HASH_PREFIXES: [&str; 2] = ["scrypt:", "pbkdf2:"];

pub fn is_foreign_hash(password_hash: &str) -> bool {
    FOREIGN_HASH_PREFIXES
        .iter()
        .any(|prefix| password_hash.starts_with(prefix))
}

/// verify_password
///
/// Checks a plaintext candidate against a stored bcrypt hash. A malformed stored hash
/// counts as a mismatch.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    if is_foreign_hash(password_hash) {
        tracing::warn!("account still holds an imported password hash; an admin must reset it");
        return false;
    }
    match bcrypt::verify(password, password_hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!("stored password hash could not be verified: {}", e);
            false
        }
    }
}

/// issue_token
///
/// Signs an HS256 session token for `user_id`, valid for the configured session lifetime.
pub fn issue_token(user_id: i32, config: &AppConfig) -> Result<String, AppError> {
    let now = Utc::now();
    let exp = Duration::try_hours(config.session_ttl_hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| {
            tracing::error!(ttl_hours = config.session_ttl_hours, "session lifetime out of range");
            AppError::Internal
        })?;
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp() as usize,
        exp: exp.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!("token signing failed: {}", e);
        AppError::Internal
    })
}

/// Validates signature and expiry, returning the user id carried in `sub`.
pub fn decode_token(token: &str, config: &AppConfig) -> Result<i32, AppError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!("rejected session token: {}", e);
        AppError::Unauthenticated
    })?;

    data.claims.sub.parse().map_err(|_| AppError::Unauthenticated)
}

/// AuthUser
///
/// The request-scoped identity of an authenticated agent. Built fresh for every request by
/// the extractor below and passed explicitly into handlers.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i32,
    pub username: String,
    pub role: Role,
    pub permissions: PermissionMap,
}

impl AuthUser {
    pub fn can(&self, capability: Capability) -> bool {
        permissions::can(self.role, &self.permissions, capability)
    }

    /// Gate for a handler: `Forbidden` unless the capability is held.
    pub fn require(&self, capability: Capability) -> Result<(), AppError> {
        if self.can(capability) {
            Ok(())
        } else {
            tracing::info!(
                user_id = self.id,
                capability = capability.key(),
                "capability check denied"
            );
            Err(AppError::Forbidden)
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            role: self.role,
            capabilities: permissions::effective_capabilities(self.role, &self.permissions),
        }
    }
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        AuthUser {
            id: user.id,
            username: user.username,
            role: user.role,
            permissions: user.permissions,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Token Extraction: `Authorization: Bearer <token>`.
/// 2. Token Validation: signature and expiry.
/// 3. DB Lookup: the user must still exist; role and permissions come from the row.
///
/// Rejection: `AppError::Unauthenticated` (401) on any authentication failure,
/// `AppError::StoreUnavailable` when the lookup itself fails.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthenticated)?;

        let user_id = decode_token(token, &config)?;

        // A deleted user's outstanding tokens stop working here.
        let user = repo
            .get_user(user_id)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        Ok(user.into())
    }
}
