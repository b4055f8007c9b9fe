//! Lookup transport: the FSA ratings API over HTTP.

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{ClientConfig, ClientError, RatingsClient, parse_establishments};
