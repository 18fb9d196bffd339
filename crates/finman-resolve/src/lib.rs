//! Entry resolution: drives a noisy extraction through clarification and
//! verify/correct turns to exactly one persisted record.

mod dispatch;
mod error;
mod machine;
pub mod reply;
mod session;
mod state;
pub mod verify;

#[cfg(test)]
mod testing;

pub use dispatch::Dispatcher;
pub use error::ResolveError;
pub use machine::{Inbound, Resolver, ResolverConfig, TurnOutcome};
pub use reply::Reply;
pub use session::{ConversationId, IdentitySource, MemorySessionStore, SessionStore};
pub use state::{CorrectionTarget, PendingResolution, Stage};
