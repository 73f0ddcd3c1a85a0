mod admin;
mod auth;
mod connections;
mod messages;
mod profile;
mod search;

pub use admin::*;
pub use auth::*;
pub use connections::*;
pub use messages::*;
pub use profile::*;
pub use search::*;

use serde::{Deserialize, Serialize};

/// User-facing outcome of an action that has nothing else to return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub message: String,
}

impl Notice {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
