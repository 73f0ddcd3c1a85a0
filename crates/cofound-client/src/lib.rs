//! Client for the Cofound matching service: typed HTTP calls, on-disk token
//! storage and the chat poller.

pub mod auth;
pub mod client;
pub mod poller;

pub use auth::AuthTokens;
pub use client::{ApiClient, ApiError, UserView};
pub use poller::{watch_thread, ChatSnapshot, PollHandle, Poller, DEFAULT_INTERVAL};
