//! Authentication module for ResumeLens

pub mod jwt;
pub mod middleware;
pub mod password;

pub use jwt::{Claims, JwtManager, TokenType};
pub use middleware::{require_auth, AuthState, AuthUser};
pub use password::{hash_password, validate_password_strength, verify_password};
