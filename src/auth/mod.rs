//! Authentication building blocks
//!
//! Password hashing (one-way, salted) and signed session tokens. The HTTP
//! extractors that turn a bearer token into a user live in `http`.

pub mod password;
pub mod token;

pub use token::{Claims, TokenKeys};
