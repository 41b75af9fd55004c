//! HTTP adapter for the Memory Wall API.

pub mod boundary;
pub mod client;

pub use boundary::{AuthBoundary, LANDING_ROUTE, Navigator, PUBLIC_ROUTES, TrackingNavigator};
pub use client::HttpProvider;
