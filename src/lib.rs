//! Persona server library
//!
//! Multi-tenant API backend: users register and log in, upload a PDF that
//! becomes their persona text, and ask questions answered by an external
//! language model grounded in that persona. The binary in `main.rs` wires
//! these pieces together; integration tests drive the HTTP surface directly.

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod limit;
pub mod logging;
pub mod persona;
pub mod provider;
pub mod store;

pub use config::AppConfig;
pub use error::{Error, Result};
