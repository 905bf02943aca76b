pub mod clients;
pub mod errors;
pub mod jwt;
pub mod middleware;
pub mod types;

pub use errors::{AppError, AppResult, ErrorCode};
pub use jwt::TokenSigner;
pub use types::*;
