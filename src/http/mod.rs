//! HTTP surface of the guard.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (router, connect info, graceful shutdown)
//!     → security pipeline (crate::security)
//!     → handlers.rs (health, key status) or proxy.rs (upstream)
//!     → response.rs (JSON rejections)
//! ```

pub mod handlers;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::Rejection;
pub use server::{AppState, GuardServer, ServerError};
