//! medportal: session core for the telemedicine dashboards.
//!
//! ARCHITECTURE
//! ============
//! The route guard reads the auth coordinator, the coordinator reads the
//! session store plus the persisted token, and the store calls the remote
//! profile API. Everything is explicitly constructed and injected; there are
//! no module-level singletons, so each test builds its own session.

pub mod api;
pub mod cancel;
pub mod config;
pub mod loader;
pub mod role;
pub mod routing;
pub mod session;
pub mod storage;

pub use api::{ApiError, HttpProfileClient, ProfileApi, User};
pub use cancel::CancelToken;
pub use config::AppConfig;
pub use role::Role;
pub use session::{AuthCoordinator, AuthSnapshot, CachePolicy, Redirect, SessionStore};
pub use storage::{FileTokenStore, MemoryTokenStore, TokenStore};
