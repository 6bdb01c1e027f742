mod api;
pub mod models;

pub use api::{generate_images, list_models};
