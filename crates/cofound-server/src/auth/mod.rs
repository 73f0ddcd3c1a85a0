mod identity;
mod jwt;
mod middleware;
mod password;
mod tokens;

pub use identity::{normalize_email, IdentityProvider, StoreIdentityProvider};
pub use jwt::{create_access_token, verify_access_token, Claims, TokenSubject};
pub use middleware::{admin_middleware, auth_middleware, Session};
pub use password::{hash_password, verify_password};
pub use tokens::{consume_refresh_token, issue_tokens, IssuedTokens};
