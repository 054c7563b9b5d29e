//! User model, roles and token claims

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::AppError;

/// Default number of outstanding pending requests per user
pub const DEFAULT_MAX_BOOKS: i32 = 5;

/// Capability tags attached to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoleName {
    Librarian,
    User,
}

impl RoleName {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::Librarian => "librarian",
            RoleName::User => "user",
        }
    }
}

impl std::fmt::Display for RoleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RoleName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "librarian" => Ok(RoleName::Librarian),
            "user" => Ok(RoleName::User),
            _ => Err(format!("Invalid role name: {}", s)),
        }
    }
}

/// User row
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string
    pub password_hash: String,
    pub active: bool,
    pub max_books: i32,
    pub created_at: DateTime<Utc>,
}

/// Registration request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterUser {
    #[validate(length(min = 1, max = 255, message = "Username is required"))]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 4, message = "Password must be at least 4 characters"))]
    pub password: String,
}

/// Credential exchange request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Successful login
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    /// `librarian` when the account holds that role, `user` otherwise
    pub role: RoleName,
}

/// JWT Claims for authenticated users
///
/// Roles are not carried in the token; they are loaded per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub username: String,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    pub fn new(user: &User, expiration_hours: u64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user.id.to_string(),
            user_id: user.id,
            username: user.username.clone(),
            exp: now + (expiration_hours as i64 * 3600),
            iat: now,
        }
    }

    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }
}

/// The authenticated caller with its role set, resolved once per request
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: i32,
    pub username: String,
    pub roles: Vec<RoleName>,
}

impl Caller {
    pub fn has_role(&self, role: RoleName) -> bool {
        self.roles.contains(&role)
    }

    pub fn require_role(&self, role: RoleName) -> Result<(), AppError> {
        if self.has_role(role) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = self.user_id,
                required = %role,
                "caller does not hold required role"
            );
            Err(AppError::Authorization("Forbidden".to_string()))
        }
    }

    pub fn is_librarian(&self) -> bool {
        self.has_role(RoleName::Librarian)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 7,
            username: "alice".to_string(),
            email: "alice@example.org".to_string(),
            password_hash: String::new(),
            active: true,
            max_books: DEFAULT_MAX_BOOKS,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_role_name_parsing() {
        assert_eq!("librarian".parse::<RoleName>(), Ok(RoleName::Librarian));
        assert_eq!("USER".parse::<RoleName>(), Ok(RoleName::User));
        assert!("admin".parse::<RoleName>().is_err());
        assert_eq!(RoleName::Librarian.to_string(), "librarian");
    }

    #[test]
    fn test_token_round_trip() {
        let claims = UserClaims::new(&user(), 1);
        let token = claims.create_token("secret").unwrap();
        let parsed = UserClaims::from_token(&token, "secret").unwrap();
        assert_eq!(parsed.user_id, 7);
        assert_eq!(parsed.sub, "7");
        assert_eq!(parsed.username, "alice");
    }

    #[test]
    fn test_token_rejected_with_wrong_secret() {
        let token = UserClaims::new(&user(), 1).create_token("secret").unwrap();
        assert!(UserClaims::from_token(&token, "other").is_err());
    }

    #[test]
    fn test_caller_roles() {
        let caller = Caller {
            user_id: 1,
            username: "bob".to_string(),
            roles: vec![RoleName::User],
        };
        assert!(caller.has_role(RoleName::User));
        assert!(!caller.is_librarian());
        assert!(matches!(
            caller.require_role(RoleName::Librarian),
            Err(AppError::Authorization(_))
        ));

        let librarian = Caller {
            roles: vec![RoleName::Librarian],
            ..caller
        };
        assert!(librarian.require_role(RoleName::Librarian).is_ok());
    }

    #[test]
    fn test_register_validation() {
        let bad = RegisterUser {
            username: String::new(),
            email: "not-an-email".to_string(),
            password: "123".to_string(),
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }
}
