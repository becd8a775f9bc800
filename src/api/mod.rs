pub mod admin;
pub mod error;
pub mod response;
pub mod route;
pub mod rpc;
pub mod usage;

pub use error::ApiError;
pub use response::{rpc_response, timestamped, CacheStatus};
pub use route::create_router;
