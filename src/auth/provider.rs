//! Identity provider: turns credentials into sessions and bearer tokens into callers.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

use crate::db::AccountRepository;
use crate::errors::AppError;
use crate::models::{now_timestamp, Identity, LoginRequest, Session, SignupRequest, ADMIN_ROLE};

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 6;

const TOKEN_LEN: usize = 48;

/// Source of caller identities.
///
/// Content handlers only ever call [`IdentityProvider::resolve`]; the other
/// operations back the `/auth` endpoints.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an auto-confirmed admin account.
    async fn sign_up(&self, request: SignupRequest) -> Result<Identity, AppError>;

    /// Exchange email and password for a session.
    async fn sign_in(&self, request: LoginRequest) -> Result<Session, AppError>;

    /// Resolve a bearer token to the caller, or fail with `Unauthorized`.
    async fn resolve(&self, token: &str) -> Result<Identity, AppError>;

    /// Invalidate a session token. Unknown tokens are ignored.
    async fn sign_out(&self, token: &str) -> Result<(), AppError>;
}

/// Identity provider backed by the local accounts and sessions tables.
pub struct LocalIdentityProvider {
    accounts: AccountRepository,
    session_ttl: Duration,
}

impl LocalIdentityProvider {
    pub fn new(accounts: AccountRepository, session_ttl: Duration) -> Self {
        Self {
            accounts,
            session_ttl,
        }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_up(&self, request: SignupRequest) -> Result<Identity, AppError> {
        let email = normalize_email(&request.email);
        let name = request.name.trim().to_string();

        if email.is_empty() || request.password.is_empty() || name.is_empty() {
            return Err(AppError::Validation(
                "Email, password, and name are required".to_string(),
            ));
        }
        if !email.contains('@') {
            return Err(AppError::Validation(
                "Unable to validate email address: invalid format".to_string(),
            ));
        }
        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password should be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let password = request.password;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))??;

        let now = now_timestamp();
        let identity = Identity {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            name,
            role: ADMIN_ROLE.to_string(),
            email_confirmed_at: Some(now.clone()),
            created_at: now,
        };

        self.accounts.create(&identity, &password_hash).await?;
        tracing::info!("Admin account created: {} ({})", identity.email, identity.id);

        Ok(identity)
    }

    async fn sign_in(&self, request: LoginRequest) -> Result<Session, AppError> {
        let email = normalize_email(&request.email);
        let invalid = || AppError::Unauthorized("Invalid login credentials".to_string());

        let account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or_else(invalid)?;

        let password = request.password;
        let hash = account.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password check task failed: {}", e)))?;
        if !verified {
            tracing::warn!("Failed login for {}", email);
            return Err(invalid());
        }

        let now = Utc::now();
        let expires_at = (now + self.session_ttl).timestamp();
        let token = generate_token();

        let purged = self.accounts.purge_expired_sessions(now.timestamp()).await?;
        if purged > 0 {
            tracing::debug!("Purged {} expired sessions", purged);
        }

        self.accounts
            .create_session(&token, &account.identity.id, now.timestamp(), expires_at)
            .await?;
        tracing::info!("Session issued for {}", account.identity.email);

        Ok(Session {
            access_token: token,
            token_type: "bearer".to_string(),
            expires_at,
            user: account.identity,
        })
    }

    async fn resolve(&self, token: &str) -> Result<Identity, AppError> {
        if token.is_empty() {
            return Err(AppError::Unauthorized(
                "No authorization token provided".to_string(),
            ));
        }

        self.accounts
            .find_by_session(token, Utc::now().timestamp())
            .await?
            .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))
    }

    async fn sign_out(&self, token: &str) -> Result<(), AppError> {
        self.accounts.delete_session(token).await
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn generate_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    async fn provider(ttl: Duration) -> (LocalIdentityProvider, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("auth.sqlite"))
            .await
            .unwrap();
        (
            LocalIdentityProvider::new(AccountRepository::new(pool), ttl),
            temp_dir,
        )
    }

    fn signup(email: &str, password: &str, name: &str) -> SignupRequest {
        SignupRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
        }
    }

    fn login(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_generated_tokens_are_long_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-hash"));
    }

    #[tokio::test]
    async fn test_signup_login_resolve_logout() {
        let (provider, _dir) = provider(Duration::hours(1)).await;

        let identity = provider
            .sign_up(signup(" Pastor@Example.com ", "amazing-grace", "Pastor John"))
            .await
            .unwrap();
        assert_eq!(identity.email, "pastor@example.com");
        assert_eq!(identity.role, ADMIN_ROLE);
        assert!(identity.email_confirmed_at.is_some());

        let session = provider
            .sign_in(login("pastor@example.com", "amazing-grace"))
            .await
            .unwrap();
        assert_eq!(session.user.id, identity.id);

        let resolved = provider.resolve(&session.access_token).await.unwrap();
        assert_eq!(resolved, identity);

        provider.sign_out(&session.access_token).await.unwrap();
        assert!(matches!(
            provider.resolve(&session.access_token).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_signup_validation() {
        let (provider, _dir) = provider(Duration::hours(1)).await;

        for request in [
            signup("", "secret1", "Name"),
            signup("a@b.c", "", "Name"),
            signup("a@b.c", "secret1", "  "),
            signup("not-an-email", "secret1", "Name"),
            signup("a@b.c", "short", "Name"),
        ] {
            assert!(matches!(
                provider.sign_up(request).await,
                Err(AppError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_duplicate_signup_rejected() {
        let (provider, _dir) = provider(Duration::hours(1)).await;
        provider
            .sign_up(signup("deacon@example.com", "secret1", "Deacon"))
            .await
            .unwrap();

        let err = provider
            .sign_up(signup("DEACON@example.com", "secret2", "Other"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user() {
        let (provider, _dir) = provider(Duration::hours(1)).await;
        provider
            .sign_up(signup("usher@example.com", "secret1", "Usher"))
            .await
            .unwrap();

        assert!(matches!(
            provider.sign_in(login("usher@example.com", "wrong")).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            provider.sign_in(login("nobody@example.com", "secret1")).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_session_is_unauthorized() {
        let (provider, _dir) = provider(Duration::seconds(-1)).await;
        provider
            .sign_up(signup("choir@example.com", "secret1", "Choir"))
            .await
            .unwrap();
        let session = provider
            .sign_in(login("choir@example.com", "secret1"))
            .await
            .unwrap();

        assert!(matches!(
            provider.resolve(&session.access_token).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_empty_and_unknown_tokens() {
        let (provider, _dir) = provider(Duration::hours(1)).await;
        assert!(matches!(
            provider.resolve("").await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            provider.resolve("made-up-token").await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
