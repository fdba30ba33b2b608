//! HTTP surface: match lifecycle, logs and verification

pub mod routes;

pub use routes::{build_router, ApiError};
