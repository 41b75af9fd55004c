//! Client-side rules that run before any request leaves the process.

pub mod error;
pub mod validation;
