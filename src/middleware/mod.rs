pub mod auth;

pub use auth::{jwt_auth_middleware, require_admin, require_password_current, AuthUser};
