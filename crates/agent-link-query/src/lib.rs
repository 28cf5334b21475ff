//! Read queries against device agents that may still be starting.
//!
//! Provides:
//! - `QueryClient` - directory, process, service and patch queries with bounded retry
//! - `QueryTarget` / `QueryTicket` - supersession of in-flight queries
//! - `DirectoryBrowser` - navigation state published over a watch channel

pub mod browser;
pub mod client;
pub mod retry;
pub mod ticket;

pub use browser::{BrowseFailure, BrowseStatus, BrowserState, DirectoryBrowser};
pub use client::{QueryClient, QueryError};
pub use retry::{ConnectionAttempt, ErrorClass, classify};
pub use ticket::{QueryTarget, QueryTicket};
