//! # lyskom-client
//!
//! Async client library for LysKOM Protocol A.
//!
//! This crate provides:
//! - A request client correlating many in-flight requests on one connection
//! - Async message dispatch to handlers keyed by message kind
//! - Read-through caches invalidated by async messages
//! - Unread text resolution over paginated `local-to-global` calls
//! - A high-level [`Session`] tying these together

pub mod cache;
pub mod client;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod membership;
pub mod session;
pub mod unread;

pub use cache::{CacheStats, CachedEntity, Caches, EntityCache};
pub use client::Client;
pub use config::{Config, ConfigError};
pub use connection::{Connection, ConnectionConfig};
pub use coordinator::CacheCoordinator;
pub use dispatch::{AsyncHandler, HandlerTable};
pub use error::ClientError;
pub use membership::MembershipState;
pub use session::Session;
pub use unread::{read_gaps, resolve_unread};
