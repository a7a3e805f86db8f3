//! # hearth-core
//!
//! Authorization and state transitions for the Hearth social graph and
//! chats.  Decisions are pure functions over a [`store::Snapshot`]; the
//! [`Engine`] loads snapshots, commits the resulting writes with optimistic
//! concurrency and publishes change events.

pub mod chat;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod loader;
pub mod memory;
pub mod message;
pub mod plan;
pub mod policy;
pub mod profile;
pub mod store;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{CoreError, CoreResult};
pub use memory::MemoryStore;
pub use store::{IdentityResolver, PersistenceError, Store};
