//! Thin HTTP layer over the parts of the Spotify Web API the mirror needs.

pub mod auth;
pub mod client;
pub mod types;
