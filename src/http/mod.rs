//! HTTP surface: router, handlers and error mapping.

pub mod error;
pub mod handlers;
pub mod router;

pub use error::ApiError;
pub use router::{build_router, AppContext};
