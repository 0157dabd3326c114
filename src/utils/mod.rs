pub mod errors;

pub use errors::AppError;
