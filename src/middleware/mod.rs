pub mod access_guard;
pub mod cache_control;

pub use access_guard::{check_bearer, check_origin, mcp_access_middleware, require_post, AuthOutcome};
pub use cache_control::add_no_store_header;
