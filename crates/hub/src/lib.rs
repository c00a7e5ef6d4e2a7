//! Presence and conversation routing.
//!
//! [`Hub`] binds connections to display names, keeps group membership and
//! bounded per-conversation history, and decides which connections receive
//! each message, typing update and presence change. Delivery itself is left
//! to a [`Transport`].

pub mod config;
pub mod directory;
pub mod engine;
pub mod history;
pub mod identity;
pub mod persist;
pub mod presence;
pub mod registry;
pub mod transport;

pub use config::HubConfig;
pub use directory::{ConversationDirectory, GroupPolicy};
pub use engine::{Hub, SessionState};
pub use history::BoundedLog;
pub use identity::{IdentityProvider, SelfDeclared};
pub use persist::{spawn_persister, write_snapshot};
pub use registry::IdentityRegistry;
pub use transport::{ConnectionTable, Recipients, Transport};
