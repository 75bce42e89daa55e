//! Shared API types.

mod pagination;
mod response;

pub use pagination::{PaginatedResponse, PaginationParams};
pub use response::ApiResponse;
