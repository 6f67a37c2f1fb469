mod error;
pub mod health;
pub mod ingress;
pub mod listing;
pub mod purge;
pub mod tasks;

pub use error::{ApiError, ErrorDetail, ErrorResponse};
pub use listing::listing_routes;
pub use tasks::task_routes;
