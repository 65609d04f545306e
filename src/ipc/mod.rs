//! Local gateway for the storefront's functions and offline cache

pub mod protocol;
pub mod server;

pub use protocol::{parse_command, serialize_response, Command, FetchedResponse, Response};
pub use server::{process_command, Gateway, IpcServer};
