//! Server-side upload assembly
//!
//! A whole-file upload is one request whose body is staged and checked
//! against its MD5 before being installed. A chunked upload is a sequence
//! of requests for the same (user, path); each chunk must start exactly
//! where the previous one ended, and the final one triggers verification.
//!
//! Protocol Flow:
//! 1. Chunk at offset 0 opens (or restarts) the session
//! 2. Each further chunk must carry `offset == received`
//! 3. When `received == total_size` the staging file is verified and the
//!    caller installs it

pub mod session;
pub mod staging;
pub mod types;

pub use session::SessionManager;
pub use staging::StagingStore;
pub use types::*;
