//! Accounts: registration, login and per-request identity

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::{
    config::{AuthConfig, SeedConfig},
    error::{AppError, AppResult},
    models::user::{Caller, LoginResponse, RegisterUser, RoleName, User, UserClaims},
    repository::Repository,
    services::cache::{invalidate, Cache, CacheKey},
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
    cache: Arc<dyn Cache>,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig, cache: Arc<dyn Cache>) -> Self {
        Self {
            repository,
            config,
            cache,
        }
    }

    /// Register a reader account holding the `user` role
    pub async fn register(&self, data: RegisterUser) -> AppResult<User> {
        if self
            .repository
            .users
            .username_or_email_exists(&data.username, &data.email)
            .await?
        {
            return Err(AppError::Conflict(
                "Username or email already exists".to_string(),
            ));
        }

        let hash = hash_password(&data.password)?;
        let user = self
            .repository
            .users
            .create(&data.username, &data.email, &hash, RoleName::User)
            .await?;

        invalidate(self.cache.as_ref(), &[CacheKey::DashboardStats]).await?;

        tracing::info!(user_id = user.id, "User registered successfully: {}", user.username);
        Ok(user)
    }

    /// Reader login. Any account may log in here; the returned role tells the
    /// client which interface to show.
    pub async fn login(&self, username: &str, password: &str) -> AppResult<LoginResponse> {
        tracing::info!("Login attempt for user: {}", username);

        let user = match self.check_credentials(username, password).await? {
            Some(user) => user,
            None => {
                tracing::warn!("Login failed for user: {}", username);
                return Err(AppError::Authentication(
                    "Invalid username or password".to_string(),
                ));
            }
        };

        let roles = self.repository.users.roles_for(user.id).await?;
        let role = if roles.contains(&RoleName::Librarian) {
            RoleName::Librarian
        } else {
            RoleName::User
        };

        tracing::info!("User logged in successfully: {}", username);
        Ok(LoginResponse {
            access_token: self.create_token(&user)?,
            role,
        })
    }

    /// Librarian login: valid credentials without the librarian role are refused
    pub async fn librarian_login(&self, username: &str, password: &str) -> AppResult<LoginResponse> {
        let user = self
            .check_credentials(username, password)
            .await?
            .ok_or_else(|| AppError::BadRequest("Invalid username or password".to_string()))?;

        let roles = self.repository.users.roles_for(user.id).await?;
        if !roles.contains(&RoleName::Librarian) {
            tracing::warn!("Librarian login refused for {}: role missing", username);
            return Err(AppError::Authentication(
                "Invalid librarian credentials".to_string(),
            ));
        }

        Ok(LoginResponse {
            access_token: self.create_token(&user)?,
            role: RoleName::Librarian,
        })
    }

    /// Resolve a bearer token into the caller and its roles
    pub async fn authenticate(&self, token: &str) -> AppResult<Caller> {
        let claims = UserClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|_| AppError::Authentication("Invalid or expired token".to_string()))?;

        let user = match self.repository.users.get_by_id(claims.user_id).await {
            Ok(user) => user,
            Err(AppError::NotFound(_)) => {
                return Err(AppError::Authentication("Unknown user".to_string()))
            }
            Err(e) => return Err(e),
        };
        if !user.active {
            return Err(AppError::Authentication("Account is disabled".to_string()));
        }

        let roles = self.repository.users.roles_for(user.id).await?;
        Ok(Caller {
            user_id: user.id,
            username: user.username,
            roles,
        })
    }

    /// Contact address of a user
    pub async fn email_of(&self, user_id: i32) -> AppResult<String> {
        Ok(self.repository.users.get_by_id(user_id).await?.email)
    }

    /// Make sure the configured librarian account exists and holds the role
    pub async fn ensure_librarian(&self, seed: &SeedConfig) -> AppResult<()> {
        match self
            .repository
            .users
            .get_by_username(&seed.librarian_username)
            .await?
        {
            Some(user) => {
                self.repository
                    .users
                    .grant_role(user.id, RoleName::Librarian)
                    .await?;
            }
            None => {
                let hash = hash_password(&seed.librarian_password)?;
                let user = self
                    .repository
                    .users
                    .create(
                        &seed.librarian_username,
                        &seed.librarian_email,
                        &hash,
                        RoleName::Librarian,
                    )
                    .await?;
                tracing::info!("Created librarian account {}", user.username);
            }
        }
        Ok(())
    }

    async fn check_credentials(&self, username: &str, password: &str) -> AppResult<Option<User>> {
        let user = match self.repository.users.get_by_username(username).await? {
            Some(user) if user.active => user,
            _ => return Ok(None),
        };

        if verify_password(&user.password_hash, password)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    fn create_token(&self, user: &User) -> AppResult<String> {
        UserClaims::new(user, self.config.jwt_expiration_hours)
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string
pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
