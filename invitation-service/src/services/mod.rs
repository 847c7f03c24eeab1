pub mod authorization;
pub mod database;
pub mod email;
pub mod jwt;
pub mod lifecycle;
pub mod store;
pub mod token;

pub use authorization::{Actor, AuthorizationGate, INVITE_CAPABILITIES};
pub use database::MongoStore;
pub use email::{InvitationNotifier, MockNotifier, SmtpNotifier};
pub use jwt::{AccessTokenClaims, JwtService, TokenResponse};
pub use lifecycle::{AcceptedInvitation, InvitationService};
pub use store::{InMemoryStore, InvitationStore};
pub use token::generate_token;
