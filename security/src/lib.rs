// security/src/lib.rs
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use models::medical::{normalize_email, Caller, IdentityAccount, Role};
use models::PortalError;

pub mod accounts;
pub mod middleware;
pub mod roles;

pub use accounts::{AccountStore, InMemoryAccountStore, SledAccountStore, StoredAccount};
pub use middleware::SessionCaller;
pub use roles::{Permission, RolesConfig};

/// Account creation data transfer object (DTO).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountRegistration {
    pub email: String,
    pub password: String,
    pub role: Role,
    pub name: String,
}

/// User login data transfer object (DTO).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserLogin {
    pub email: String,
    pub password: String,
}

/// Claims for JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user id)
    pub email: String,
    pub role: Role,
    pub name: String,
    pub exp: u64, // Expiration time
    pub iat: u64, // Issued at
}

/// A signed-in session as returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub name: String,
}

/// Which login screen a credential was presented to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Portal {
    Doctor,
    Patient,
}

impl Portal {
    /// Staff accounts sign in through the doctor portal.
    pub fn admits(&self, role: Role) -> bool {
        match self {
            Portal::Doctor => matches!(role, Role::Doctor | Role::Admin),
            Portal::Patient => role == Role::Patient,
        }
    }

    fn denial(&self) -> &'static str {
        match self {
            Portal::Doctor => "Access denied. This portal is for doctors only.",
            Portal::Patient => "Access denied. This portal is for patients only.",
        }
    }
}

/// Custom authentication errors.
#[derive(Debug)]
pub enum AuthError {
    AccountExists(String),
    InvalidCredentials,
    MissingToken,
    InvalidToken(String),
    PortalMismatch(&'static str),
    Forbidden(String),
    WeakPassword,
    PasswordHashError(String),
    StorageError(String),
    InternalError(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthError::AccountExists(email) => write!(f, "An account with email {} already exists", email),
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::MissingToken => write!(f, "Sign in required"),
            AuthError::InvalidToken(msg) => write!(f, "Invalid session: {}", msg),
            AuthError::PortalMismatch(msg) => write!(f, "{}", msg),
            AuthError::Forbidden(msg) => write!(f, "{}", msg),
            AuthError::WeakPassword => write!(f, "Password must be at least 6 characters long"),
            AuthError::PasswordHashError(msg) => write!(f, "Password hashing error: {}", msg),
            AuthError::StorageError(msg) => write!(f, "Account storage error: {}", msg),
            AuthError::InternalError(msg) => write!(f, "Internal server error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<AuthError> for PortalError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AccountExists(email) => PortalError::AccountExists(email),
            AuthError::WeakPassword => PortalError::Validation(models::ValidationError::WeakCredential),
            AuthError::InvalidCredentials | AuthError::MissingToken | AuthError::InvalidToken(_) => {
                PortalError::Unauthenticated(err.to_string())
            }
            AuthError::PortalMismatch(_) | AuthError::Forbidden(_) => PortalError::Authorization(err.to_string()),
            AuthError::StorageError(msg) => PortalError::Storage(msg),
            AuthError::PasswordHashError(msg) | AuthError::InternalError(msg) => PortalError::Internal(msg),
        }
    }
}

impl From<PortalError> for AuthError {
    fn from(err: PortalError) -> Self {
        AuthError::StorageError(err.to_string())
    }
}

/// Hashes a password using Argon2.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::PasswordHashError(format!("Failed to hash password with Argon2: {}", e)))
}

/// Verifies a password against an Argon2 hash.
pub fn verify_password(password: &str, hashed_password: &str) -> Result<bool, AuthError> {
    let password_hash = PasswordHash::new(hashed_password)
        .map_err(|e| AuthError::InternalError(format!("Failed to parse Argon2 password hash: {}", e)))?;
    match Argon2::default().verify_password(password.as_bytes(), &password_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::InternalError(format!("Failed to verify Argon2 password: {}", e))),
    }
}

/// Signing material and lifetime for session tokens.
#[derive(Clone)]
pub struct JwtConfig {
    secret: Vec<u8>,
    pub session_ttl_secs: u64,
}

impl JwtConfig {
    pub fn new(secret: impl AsRef<[u8]>, session_ttl_secs: u64) -> Self {
        JwtConfig {
            secret: secret.as_ref().to_vec(),
            session_ttl_secs,
        }
    }
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("session_ttl_secs", &self.session_ttl_secs)
            .finish()
    }
}

fn now_secs() -> Result<u64, AuthError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| AuthError::InternalError(format!("System time error: {}", e)))
}

/// Generates a JWT token.
pub fn generate_jwt_token(account: &IdentityAccount, jwt: &JwtConfig) -> Result<String, AuthError> {
    let now = now_secs()?;
    let claims = Claims {
        sub: account.user_id.to_string(),
        email: account.email.clone(),
        role: account.role,
        name: account.name.clone(),
        exp: now + jwt.session_ttl_secs,
        iat: now,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(&jwt.secret))
        .map_err(|e| AuthError::InternalError(format!("Failed to encode JWT: {}", e)))
}

/// Decodes and validates a JWT token.
pub fn validate_jwt_token(token: &str, jwt: &JwtConfig) -> Result<Claims, AuthError> {
    decode::<Claims>(token, &DecodingKey::from_secret(&jwt.secret), &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))
}

/// The identity provider as seen by the portal core: it creates accounts,
/// checks credentials and turns session tokens back into a [`Caller`].
#[async_trait]
pub trait IdentityOracle: Send + Sync {
    /// Creates an account. Fails with [`AuthError::AccountExists`] when the
    /// email is already registered; existing accounts are never reused.
    async fn create_account(&self, registration: AccountRegistration) -> Result<IdentityAccount, AuthError>;
    async fn sign_in(&self, login: UserLogin) -> Result<Session, AuthError>;
    async fn find_account(&self, email: &str) -> Result<Option<IdentityAccount>, AuthError>;
    fn verify(&self, token: &str) -> Result<Caller, AuthError>;
}

/// Identity oracle backed by an [`AccountStore`] and HS256 session tokens.
pub struct LocalIdentityOracle {
    accounts: Arc<dyn AccountStore>,
    jwt: JwtConfig,
}

impl LocalIdentityOracle {
    pub fn new(accounts: Arc<dyn AccountStore>, jwt: JwtConfig) -> Self {
        LocalIdentityOracle { accounts, jwt }
    }
}

#[async_trait]
impl IdentityOracle for LocalIdentityOracle {
    async fn create_account(&self, registration: AccountRegistration) -> Result<IdentityAccount, AuthError> {
        if registration.password.chars().count() < models::medical::MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        let account = IdentityAccount {
            user_id: Uuid::new_v4(),
            email: normalize_email(&registration.email),
            role: registration.role,
            name: registration.name.trim().to_string(),
            created_at: Utc::now(),
        };
        let stored = StoredAccount {
            account: account.clone(),
            password_hash: hash_password(&registration.password)?,
        };
        self.accounts.insert_new(stored).await?;
        info!("Created {} account {} for {}", account.role, account.user_id, account.email);
        Ok(account)
    }

    async fn sign_in(&self, login: UserLogin) -> Result<Session, AuthError> {
        let stored = self
            .accounts
            .get_by_email(&normalize_email(&login.email))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(&login.password, &stored.password_hash)? {
            warn!("Rejected sign-in for {}", stored.account.email);
            return Err(AuthError::InvalidCredentials);
        }
        let token = generate_jwt_token(&stored.account, &self.jwt)?;
        let account = stored.account;
        Ok(Session {
            token,
            user_id: account.user_id,
            email: account.email,
            role: account.role,
            name: account.name,
        })
    }

    async fn find_account(&self, email: &str) -> Result<Option<IdentityAccount>, AuthError> {
        Ok(self
            .accounts
            .get_by_email(&normalize_email(email))
            .await?
            .map(|stored| stored.account))
    }

    fn verify(&self, token: &str) -> Result<Caller, AuthError> {
        let claims = validate_jwt_token(token, &self.jwt)?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|e| AuthError::InvalidToken(format!("bad subject: {}", e)))?;
        Ok(Caller {
            user_id: Some(user_id),
            email: normalize_email(&claims.email),
            role: Some(claims.role),
            display_name: Some(claims.name).filter(|n| !n.trim().is_empty()),
        })
    }
}

/// Signs in through a role-specific portal. A valid credential for the wrong
/// role is refused and no token is handed out.
pub async fn login_for_portal(
    oracle: &dyn IdentityOracle,
    login: UserLogin,
    portal: Portal,
) -> Result<Session, AuthError> {
    let session = oracle.sign_in(login).await?;
    if !portal.admits(session.role) {
        warn!("{} account {} refused at {:?} portal", session.role, session.email, portal);
        return Err(AuthError::PortalMismatch(portal.denial()));
    }
    Ok(session)
}
