//! Temporary-credential upload client for the book catalog console

#![deny(clippy::all, clippy::pedantic, clippy::nursery, dead_code)]

/// Temporary credentials and the token endpoint
pub mod credentials;

/// Content-addressed cover image keys
pub mod covers;

/// Editing-session upload clients and their refresh lifecycle
pub mod session;

/// Object storage bound to a temporary credential
pub mod storage;

/// Environment configuration
pub mod types;
