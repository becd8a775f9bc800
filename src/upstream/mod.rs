pub mod client;

pub use client::{ForwardedResponse, UpstreamClient, UpstreamError};
