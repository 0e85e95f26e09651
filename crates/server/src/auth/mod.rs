mod jwt;
mod middleware;

pub use jwt::{JwtError, JwtService, SESSION_AUDIENCE, SessionClaims, SessionIdentity};
pub use middleware::{RequestContext, require_session};
