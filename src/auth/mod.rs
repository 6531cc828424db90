/// Authentication module
///
/// Password hashing, JWT access/refresh tokens, refresh-session storage and
/// rotation, and the gates protected routes pass through.

mod claims;
mod clock;
mod gate;
mod issuer;
mod jwt;
mod password;
mod refresh;
mod service;
mod session;

pub use claims::{AccessClaims, Identity, RefreshClaims, Role, SignedClaims, UserId};
pub use clock::{Clock, FixedClock, SystemClock};
pub use gate::{AuthGate, GateOutcome, RejectKind};
pub use issuer::{TokenIssuer, TokenPair};
pub use jwt::{IssuedToken, TokenCodec};
pub use password::{validate_password_strength, CredentialHasher, MAX_HASH_COST, MIN_HASH_COST};
pub use refresh::{RefreshCoordinator, RefreshStage, RotatedSession};
pub use service::AuthService;
pub use session::{
    hash_token, InMemorySessionStore, NewSession, PgSessionStore, SessionRecord, SessionStore,
};
