pub mod admin;
pub mod auth;
pub mod connections;
pub mod messages;
pub mod profiles;
pub mod search;
