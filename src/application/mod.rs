//! Memory Wall client services: resource loading, writes and identity.

pub mod client;
pub mod error;
pub mod mutations;
pub mod provider;
pub mod resources;
