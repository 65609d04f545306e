//! Identity/profile platform client

pub mod client;
pub mod errors;
pub mod types;

pub use client::IdentityClient;
pub use errors::BackendError;
pub use types::*;
