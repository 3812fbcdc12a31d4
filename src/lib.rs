//! Filebox Library
//!
//! Core of a file synchronization service: the server side (path sandbox,
//! snapshot model, upload assembly, HTTP routes) and the client side
//! (transfer engine, command dispatcher). The server binary is in main.rs.
//!
//! # Modules
//!
//! - `sandbox`: confines user-supplied paths to a root directory
//! - `snapshot`: per-user path → (mtime, hash) state and its stores
//! - `upload`: whole-file and chunked upload assembly
//! - `routes`: axum routers for files, actions and users
//! - `client`: transfer engine and command dispatcher

pub mod accounts;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod hash;
pub mod protocol;
pub mod routes;
pub mod sandbox;
pub mod snapshot;
pub mod state;
pub mod storage;
pub mod upload;
