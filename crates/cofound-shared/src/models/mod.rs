mod connection;
mod message;
mod moderation;
mod user;

pub use connection::*;
pub use message::*;
pub use moderation::*;
pub use user::*;
