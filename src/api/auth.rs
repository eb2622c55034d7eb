//! Authentication for the single admin account.
//!
//! Provides bcrypt password hashing, HS256 JWT issuance/validation, and the
//! [`Authenticator`] that ties them to the configured admin credentials.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::{MnemoError, Result};

/// bcrypt cost used for new admin hashes.
pub const DEFAULT_BCRYPT_COST: u32 = 12;

const INVALID_CREDENTIALS: &str = "Could not validate credentials";
const INCORRECT_LOGIN: &str = "Incorrect username or password";

// ============================================================================
// Password hashing (bcrypt)
// ============================================================================

/// Hashes `password` with bcrypt at [`DEFAULT_BCRYPT_COST`].
///
/// # Errors
///
/// Returns [`MnemoError::Config`] if bcrypt fails internally.
pub fn hash_password(password: &str) -> Result<String> {
    hash_password_with_cost(password, DEFAULT_BCRYPT_COST)
}

pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).map_err(|e| MnemoError::Config(format!("bcrypt hash: {e}")))
}

/// Verifies `password` against a bcrypt `hash`.
///
/// # Errors
///
/// Returns [`MnemoError::Config`] if the hash string is malformed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).map_err(|e| MnemoError::Config(format!("bcrypt verify: {e}")))
}

// ============================================================================
// JWT (HS256)
// ============================================================================

/// Claims embedded in an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the admin username.
    pub sub: String,
    /// Expiry, Unix seconds.
    pub exp: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Issues an HS256-signed JWT for `username` expiring `expires_in_secs` from
/// now. A negative delta yields a token that is already expired.
pub fn generate_jwt(username: &str, secret: &str, expires_in_secs: i64) -> Result<String> {
    let exp = now_secs().saturating_add_signed(expires_in_secs);
    let claims = Claims {
        sub: username.to_string(),
        exp,
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(signing_error)
}

/// Encode failures surface as configuration errors (HTTP 500).
fn signing_error(e: jsonwebtoken::errors::Error) -> MnemoError {
    MnemoError::Config(format!("JWT signing failed: {e}"))
}

/// Validates an HS256 JWT and returns its [`Claims`].
///
/// Checks signature and `exp` with zero leeway.
pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims> {
    let mut validation = Validation::default();
    validation.leeway = 0;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| MnemoError::Unauthorized(format!("JWT validation: {e}")))?;

    Ok(token_data.claims)
}

// ============================================================================
// Authenticator
// ============================================================================

/// The resolved caller of a protected endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub username: String,
    pub is_active: bool,
    pub is_admin: bool,
}

/// Body returned by login and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds.
    pub expires_in: i64,
}

/// Admin credential check and token issuance.
pub struct Authenticator {
    username: String,
    password_hash: String,
    secret: String,
    ttl_secs: i64,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("username", &self.username)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            username: config.admin_username.clone(),
            password_hash: config.admin_password_hash.clone(),
            secret: config.secret_key.clone(),
            ttl_secs: config.token_ttl_secs(),
        }
    }

    /// Exchange admin credentials for a token.
    ///
    /// Wrong username or password yields `Unauthorized("Incorrect username
    /// or password")`; a malformed stored hash yields `Config`.
    pub fn login(&self, username: &str, password: &str) -> Result<TokenResponse> {
        // Verify even on a username mismatch so both paths cost one bcrypt round.
        let password_ok = verify_password(password, &self.password_hash)?;
        if username != self.username || !password_ok {
            return Err(MnemoError::Unauthorized(INCORRECT_LOGIN.to_string()));
        }
        self.issue(&self.username)
    }

    /// Issue a fresh token for `username`.
    pub fn issue(&self, username: &str) -> Result<TokenResponse> {
        Ok(TokenResponse {
            access_token: generate_jwt(username, &self.secret, self.ttl_secs)?,
            token_type: "bearer".to_string(),
            expires_in: self.ttl_secs,
        })
    }

    /// Resolve a bearer token to the admin user.
    pub fn resolve(&self, token: &str) -> Result<CurrentUser> {
        let claims = validate_jwt(token, &self.secret)
            .map_err(|_| MnemoError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;
        if claims.sub != self.username {
            return Err(MnemoError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }
        Ok(CurrentUser {
            username: claims.sub,
            is_active: true,
            is_admin: true,
        })
    }
}
