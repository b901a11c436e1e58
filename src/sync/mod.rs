//! Live board data: polling and optimistic edits.
//!
//! This module keeps an in-memory copy of board resources in step with the
//! server:
//! - Polls each watched resource with ETag-conditional GETs, backing off while
//!   the user is idle and pausing while the terminal is not focused
//! - Applies user edits to the cache immediately and reconciles them with the
//!   server once the request settles (commit or exact rollback)
//! - Detects real changes by fingerprinting payloads, so a refetch with the
//!   same content never triggers a redraw
//!
//! Nothing here knows about notes or boards beyond [`ResourceKey`]; see
//! `crate::gumboard` for the resource layer built on top.

mod activity;
mod cache;
mod coordinator;
mod engine;
mod error;
mod fetch;
mod fingerprint;
mod key;
mod mutation;

#[cfg(test)]
pub(crate) mod testing;

pub use activity::VisibilityState;
pub use cache::CacheEvent;
pub use coordinator::SyncCoordinator;
pub use engine::{PollConfig, PollUpdate};
pub use error::{FetchError, MutationError};
pub use fetch::{HttpFetcher, ResourceFetcher};
pub use key::{ResourceKey, ResourceKind};
pub use mutation::Mutation;
