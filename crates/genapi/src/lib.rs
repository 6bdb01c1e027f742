pub mod providers;
pub mod types;
pub mod utils;

pub use types::{ApiStatusError, ImageClient, ImageData, ImageProvider, ImageRequest};
