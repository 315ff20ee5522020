//! Session lifecycle: the store that caches the user and the coordinator
//! that turns token + cache + background refresh into one auth signal.

pub mod coordinator;
pub mod store;

pub use coordinator::{AuthCoordinator, AuthSnapshot, CachePolicy, SessionError};
pub use store::{SessionState, SessionStore};

pub use crate::routing::Redirect;
