pub mod message;

pub use message::{BridgeError, UpstreamRequest, UpstreamResponse, simple_response};
