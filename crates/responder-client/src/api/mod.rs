//! API endpoint access.

mod endpoint;

pub use endpoint::Endpoint;
