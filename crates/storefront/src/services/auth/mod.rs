//! Authentication service.
//!
//! Email + password accounts with Argon2id hashes.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::instrument;

use mercato_core::Email;

use crate::db::{RepositoryError, UserStore};
use crate::models::User;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Authentication service.
///
/// Handles user registration and login.
pub struct AuthService<'a> {
    users: &'a dyn UserStore,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(users: &'a dyn UserStore) -> Self {
        Self { users }
    }

    /// Register a new user with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, password))]
    pub async fn signup(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::UserAlreadyExists);
        }

        let password_hash = hash_password(password)?;

        // The unique index still catches a concurrent signup for the same email
        let user = self
            .users
            .create(&email, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, "User created");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if no account has this email.
    /// Returns `AuthError::InvalidPassword` if the password is wrong.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email)?;

        let (user, password_hash) = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        verify_password(password, &password_hash)?;

        Ok(user)
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::PasswordHash)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidPassword)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::InMemoryUserStore;

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("battery staple", &hash),
            Err(AuthError::InvalidPassword)
        ));
    }

    #[test]
    fn test_validate_password_length() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("longenough").is_ok());
    }

    #[tokio::test]
    async fn test_signup_then_login() {
        let users = InMemoryUserStore::default();
        let auth = AuthService::new(&users);

        let created = auth.signup("Shopper@Example.com", "hunter2hunter2").await.unwrap();
        let logged_in = auth.login("shopper@example.com", "hunter2hunter2").await.unwrap();

        assert_eq!(created.id, logged_in.id);
        assert_eq!(logged_in.email.as_str(), "shopper@example.com");
    }

    #[tokio::test]
    async fn test_duplicate_signup_creates_no_second_user() {
        let users = InMemoryUserStore::default();
        let auth = AuthService::new(&users);

        auth.signup("dup@example.com", "password-one").await.unwrap();
        let second = auth.signup("dup@example.com", "password-two").await;

        assert!(matches!(second, Err(AuthError::UserAlreadyExists)));
        assert_eq!(users.len().await, 1);
    }

    #[tokio::test]
    async fn test_login_failures() {
        let users = InMemoryUserStore::default();
        let auth = AuthService::new(&users);
        auth.signup("known@example.com", "password-one").await.unwrap();

        assert!(matches!(
            auth.login("unknown@example.com", "password-one").await,
            Err(AuthError::UserNotFound)
        ));
        assert!(matches!(
            auth.login("known@example.com", "password-two").await,
            Err(AuthError::InvalidPassword)
        ));
        assert!(matches!(
            auth.login("not-an-email", "password-one").await,
            Err(AuthError::InvalidEmail(_))
        ));
    }
}
