//! Authentication manager implementation.

use super::{
    errors::{AuthError, AuthResult},
    models::{
        AccessTokenClaims, Actor, LoginRequest, NewUser, RegisterRequest, SessionTokens, User,
        UserId, UserRole,
    },
};
use crate::db::UserRepository;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use std::sync::Arc;
use uuid::Uuid;

/// Points credited to every new account.
pub const DEFAULT_REGISTER_REWARD: i64 = 100;

/// Authentication manager
#[derive(Clone)]
pub struct AuthManager {
    users: Arc<dyn UserRepository>,
    pepper: String,
    jwt_secret: String,
    access_token_duration: Duration,
    register_reward: i64,
}

impl AuthManager {
    /// Create a new authentication manager
    ///
    /// # Arguments
    ///
    /// * `users` - User repository
    /// * `pepper` - Server-side pepper for password hashing
    /// * `jwt_secret` - Secret key for JWT signing
    pub fn new(users: Arc<dyn UserRepository>, pepper: String, jwt_secret: String) -> Self {
        Self {
            users,
            pepper,
            jwt_secret,
            access_token_duration: Duration::hours(24),
            register_reward: DEFAULT_REGISTER_REWARD,
        }
    }

    /// Override the registration reward (0 disables it)
    pub fn with_register_reward(mut self, points: i64) -> Self {
        self.register_reward = points.max(0);
        self
    }

    /// Override the access token lifetime
    pub fn with_token_duration(mut self, duration: Duration) -> Self {
        self.access_token_duration = duration;
        self
    }

    /// Register a new user
    ///
    /// The user row and the REGISTER reward transaction are written as one
    /// atomic unit, so the balance invariant holds from the first moment.
    ///
    /// # Errors
    ///
    /// * `AuthError::UsernameTaken` - Username already exists
    /// * `AuthError::EmailTaken` - Email already exists
    /// * `AuthError::InvalidUsername` - Username format invalid
    /// * `AuthError::WeakPassword` - Password too weak
    pub async fn register(&self, request: RegisterRequest) -> AuthResult<User> {
        self.validate_username(&request.username)?;
        self.validate_password(&request.password)?;

        let password_hash = self.hash_password(&request.password)?;
        let display_name = if request.display_name.trim().is_empty() {
            request.username.clone()
        } else {
            request.display_name.trim().to_string()
        };

        let user = self
            .users
            .create_user(
                NewUser {
                    username: request.username,
                    password_hash,
                    display_name,
                    email: request.email.filter(|e| !e.trim().is_empty()),
                    role: UserRole::User,
                },
                self.register_reward,
            )
            .await?;

        log::info!(
            "Registered user {} ({}) with {} reward points",
            user.id,
            user.username,
            self.register_reward
        );

        Ok(user)
    }

    /// Login a user
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidCredentials` - Unknown user or wrong password
    /// * `AuthError::AccountDisabled` - Account deactivated
    pub async fn login(&self, request: LoginRequest) -> AuthResult<(User, SessionTokens)> {
        let (user, password_hash) = self
            .users
            .find_credentials(&request.username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        self.verify_password(&request.password, &password_hash)?;

        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        self.users.update_last_login(user.id).await?;
        let tokens = self.issue_tokens(&user)?;

        Ok((user, tokens))
    }

    /// Get a user by ID
    pub async fn get_user(&self, user_id: UserId) -> AuthResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Change a user's role (admin only)
    pub async fn set_role(&self, actor: &Actor, user_id: UserId, role: UserRole) -> AuthResult<User> {
        if !actor.is_admin() {
            return Err(AuthError::Forbidden);
        }
        let user = self.users.set_role(user_id, role).await?;
        log::info!("User {} role set to {} by {}", user_id, role, actor.user_id);
        Ok(user)
    }

    /// Bootstrap an administrator account, creating it when missing.
    ///
    /// Used on server startup; an existing account is promoted, never
    /// re-created, so its ledger is left untouched.
    pub async fn ensure_admin(&self, username: &str, password: &str) -> AuthResult<User> {
        if let Some((user, _)) = self.users.find_credentials(username).await? {
            if user.is_admin() {
                return Ok(user);
            }
            return self.users.set_role(user.id, UserRole::Admin).await;
        }

        let user = self
            .register(RegisterRequest {
                username: username.to_string(),
                password: password.to_string(),
                display_name: username.to_string(),
                email: None,
            })
            .await?;
        self.users.set_role(user.id, UserRole::Admin).await
    }

    /// Verify an access token
    pub fn verify_access_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        let token_data = decode::<AccessTokenClaims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }

    fn issue_tokens(&self, user: &User) -> AuthResult<SessionTokens> {
        let now = Utc::now();
        let expires_at = now + self.access_token_duration;
        let claims = AccessTokenClaims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role,
            jti: Uuid::new_v4().to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        Ok(SessionTokens {
            access_token,
            token_type: "bearer".to_string(),
            expires_at,
        })
    }

    /// Hash password with Argon2id + pepper
    fn hash_password(&self, password: &str) -> AuthResult<String> {
        let peppered = format!("{}{}", password, self.pepper);
        let salt = SaltString::generate(&mut OsRng);

        Ok(Argon2::default()
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|_| AuthError::HashingFailed)?
            .to_string())
    }

    /// Verify password against hash
    fn verify_password(&self, password: &str, hash: &str) -> AuthResult<()> {
        let peppered = format!("{}{}", password, self.pepper);
        let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;

        Argon2::default()
            .verify_password(peppered.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)
    }

    /// Validate username format
    fn validate_username(&self, username: &str) -> AuthResult<()> {
        let len = username.len();
        if !(3..=32).contains(&len) {
            return Err(AuthError::InvalidUsername(
                "Username must be 3-32 characters".to_string(),
            ));
        }

        if !username.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(AuthError::InvalidUsername(
                "Username can only contain letters, numbers, and underscores".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate password strength
    fn validate_password(&self, password: &str) -> AuthResult<()> {
        if password.len() < 8 {
            return Err(AuthError::WeakPassword(
                "Password must be at least 8 characters".to_string(),
            ));
        }

        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
        let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());

        if !has_digit || !has_uppercase || !has_lowercase {
            return Err(AuthError::WeakPassword(
                "Password must contain at least one number, one uppercase and one lowercase letter"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn manager() -> AuthManager {
        AuthManager::new(
            Arc::new(MemoryStore::new()),
            "pepper".to_string(),
            "test_jwt_secret".to_string(),
        )
    }

    fn request(username: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            password: "SecurePass123".to_string(),
            display_name: String::new(),
            email: None,
        }
    }

    #[tokio::test]
    async fn test_register_grants_reward() {
        let auth = manager().with_register_reward(250);
        let user = auth.register(request("reader")).await.unwrap();

        assert_eq!(user.points, 250);
        assert_eq!(user.role, UserRole::User);
        assert_eq!(user.display_name, "reader");
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_username() {
        let auth = manager();
        auth.register(request("reader")).await.unwrap();

        let err = auth.register(request("reader")).await.unwrap_err();
        assert!(matches!(err, AuthError::UsernameTaken));
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let auth = manager();
        assert!(matches!(
            auth.register(request("a!")).await,
            Err(AuthError::InvalidUsername(_))
        ));

        let mut weak = request("reader");
        weak.password = "password".to_string();
        assert!(matches!(
            auth.register(weak).await,
            Err(AuthError::WeakPassword(_))
        ));
    }

    #[tokio::test]
    async fn test_login_issues_verifiable_token() {
        let auth = manager();
        let user = auth.register(request("reader")).await.unwrap();

        let (logged_in, tokens) = auth
            .login(LoginRequest {
                username: "reader".to_string(),
                password: "SecurePass123".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);

        let claims = auth.verify_access_token(&tokens.access_token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let auth = manager();
        auth.register(request("reader")).await.unwrap();

        let err = auth
            .login(LoginRequest {
                username: "reader".to_string(),
                password: "WrongPass123".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_token_from_other_secret_is_rejected() {
        let auth = manager();
        let other = AuthManager::new(
            Arc::new(MemoryStore::new()),
            "pepper".to_string(),
            "another_secret".to_string(),
        );
        auth.register(request("reader")).await.unwrap();
        let (_, tokens) = auth
            .login(LoginRequest {
                username: "reader".to_string(),
                password: "SecurePass123".to_string(),
            })
            .await
            .unwrap();

        assert!(other.verify_access_token(&tokens.access_token).is_err());
    }

    #[tokio::test]
    async fn test_ensure_admin_promotes_once() {
        let auth = manager();
        let admin = auth.ensure_admin("root_admin", "AdminPass123").await.unwrap();
        assert!(admin.is_admin());

        let again = auth.ensure_admin("root_admin", "AdminPass123").await.unwrap();
        assert_eq!(again.id, admin.id);
        assert_eq!(again.points, admin.points);
    }

    #[tokio::test]
    async fn test_set_role_requires_admin() {
        let auth = manager();
        let user = auth.register(request("reader")).await.unwrap();
        let actor = Actor::from(&user);

        let err = auth.set_role(&actor, user.id, UserRole::Vip).await.unwrap_err();
        assert!(matches!(err, AuthError::Forbidden));
    }
}
