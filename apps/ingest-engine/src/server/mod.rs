//! HTTP surface.

mod http;

pub use http::{AppState, create_router};
