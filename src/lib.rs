// Library root. Exposes the loading layer to the binary, integration tests
// and embedding callers. The binary entry point is src/main.rs.

pub mod backend;
pub mod config;
pub mod error;
pub mod graph;
pub mod logger;
pub mod session;
pub mod timeline;
pub mod viewport;

pub use backend::{BackendError, GraphBackend};
pub use error::AppError;
pub use session::GraphSession;
